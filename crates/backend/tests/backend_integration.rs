//! Integration tests for the backend composition root.

use std::sync::Arc;

use backend::cli::{Cli, Command};
use clap::Parser;
use backend::config::Config;
use backend::{Backend, BackendError, SharedStore};
use document_store::InMemoryDocumentStore;
use domain::{DomainError, IdType, KeyStrategy, Money, NewOrder, OrderItem, OrderStatus};

fn memory_config(key_strategy: KeyStrategy) -> Config {
    Config {
        key_strategy,
        ..Config::default()
    }
}

#[tokio::test]
async fn connect_in_memory_and_place_orders() {
    let backend = Backend::connect(&memory_config(KeyStrategy::Sequential))
        .await
        .unwrap();
    let repo = backend.repository();

    let order = repo
        .save_order(NewOrder::new(
            "USR-0001",
            vec![OrderItem::new("PRD-0001", "Kettle", 1, Money::from_cents(4500))],
        ))
        .await
        .unwrap();
    assert_eq!(order.id().as_str(), "ORD-0001");

    let confirmed = repo
        .update_order_status("ORD-0001", "CONFIRMED")
        .await
        .unwrap();
    assert_eq!(confirmed.status(), OrderStatus::Confirmed);

    assert_eq!(backend.ids().peek(IdType::Order).await.unwrap(), 1);
}

#[tokio::test]
async fn admin_commands_round_trip() {
    let backend = Backend::in_memory();

    let first = backend
        .execute(Command::Generate {
            id_type: IdType::Product,
        })
        .await
        .unwrap();
    let second = backend
        .execute(Command::Generate {
            id_type: IdType::Product,
        })
        .await
        .unwrap();
    assert_eq!(first, "PRD-0001");
    assert_eq!(second, "PRD-0002");

    let counters = backend.execute(Command::Counters).await.unwrap();
    assert_eq!(counters, "USER     0\nPRODUCT  2\nORDER    0");

    backend
        .execute(Command::Reset {
            id_type: IdType::Product,
        })
        .await
        .unwrap();
    assert_eq!(backend.ids().peek(IdType::Product).await.unwrap(), 0);
}

#[tokio::test]
async fn parsed_command_line_runs() {
    let backend = Backend::in_memory();
    let cli = Cli::try_parse_from(["backend", "generate", "user"]).unwrap();

    let output = backend.execute(cli.selected_command()).await.unwrap();

    assert_eq!(output, "USR-0001");
}

#[tokio::test]
async fn store_failures_surface_as_domain_errors() {
    let memory = Arc::new(InMemoryDocumentStore::new());
    let store: SharedStore = memory.clone();
    let backend = Backend::from_store(store, KeyStrategy::PushKey);
    memory.set_available(false);

    let err = backend
        .execute(Command::Generate {
            id_type: IdType::User,
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BackendError::Domain(DomainError::StoreUnavailable(_))
    ));
}

#[tokio::test]
async fn backends_share_one_store() {
    let store: SharedStore = Arc::new(InMemoryDocumentStore::new());
    let a = Backend::from_store(store.clone(), KeyStrategy::Sequential);
    let b = Backend::from_store(store, KeyStrategy::Sequential);

    assert_eq!(a.ids().generate(IdType::User).await.unwrap(), "USR-0001");
    assert_eq!(b.ids().generate(IdType::User).await.unwrap(), "USR-0002");
}
