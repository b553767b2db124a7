use common::DocumentKey;
use criterion::{Criterion, criterion_group, criterion_main};
use document_store::InMemoryDocumentStore;
use domain::{
    IdGenerator, IdType, KeyStrategy, Money, NewOrder, Order, OrderItem, OrderStatus, Repository,
    apply_transition, can_transition,
};

fn new_order() -> NewOrder {
    NewOrder::new(
        "USR-0001",
        vec![OrderItem::new("PRD-0001", "Benchmark Widget", 1, Money::from_cents(1000))],
    )
}

fn bench_can_transition(c: &mut Criterion) {
    c.bench_function("domain/can_transition_grid", |b| {
        b.iter(|| {
            let mut legal = 0;
            for from in OrderStatus::ALL {
                for to in OrderStatus::ALL {
                    if can_transition(std::hint::black_box(from), std::hint::black_box(to)) {
                        legal += 1;
                    }
                }
            }
            legal
        });
    });
}

fn bench_apply_transition(c: &mut Criterion) {
    let order = Order::place(DocumentKey::new("o1"), new_order()).unwrap();

    c.bench_function("domain/apply_transition", |b| {
        b.iter(|| apply_transition(order.clone(), " Confirmed ").unwrap());
    });
}

fn bench_generate_id(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let ids = IdGenerator::new(InMemoryDocumentStore::new());

    c.bench_function("domain/generate_id", |b| {
        b.iter(|| {
            rt.block_on(async {
                ids.generate(IdType::Order).await.unwrap();
            });
        });
    });
}

fn bench_place_and_confirm(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let repo = Repository::new(InMemoryDocumentStore::new())
        .with_key_strategy(KeyStrategy::Sequential);

    c.bench_function("domain/place_and_confirm_order", |b| {
        b.iter(|| {
            rt.block_on(async {
                let order = repo.save_order(new_order()).await.unwrap();
                repo.update_order_status(order.id().as_str(), "confirmed")
                    .await
                    .unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_can_transition,
    bench_apply_transition,
    bench_generate_id,
    bench_place_and_confirm
);
criterion_main!(benches);
