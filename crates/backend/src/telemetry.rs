//! Tracing and metrics initialisation.

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

use crate::config::{Config, LogFormat};

/// Installs the global tracing subscriber.
///
/// An unparseable `log_level` falls back to `info`.
pub fn init_tracing(config: &Config) -> Result<(), TryInitError> {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
    }
}

/// Installs the Prometheus recorder and describes the counters the domain emits.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    metrics::describe_counter!("ids_generated_total", "Sequential ids issued, by type");
    metrics::describe_counter!("orders_placed_total", "Orders stored");
    metrics::describe_counter!(
        "order_status_transitions_total",
        "Order status changes committed, by target status"
    );
    metrics::describe_counter!(
        "order_status_rejections_total",
        "Order status changes rejected as illegal"
    );
    metrics::describe_counter!(
        "document_store_transactions_committed_total",
        "Store transactions that committed"
    );
    metrics::describe_counter!(
        "document_store_transaction_conflicts_total",
        "Store transaction attempts that hit a concurrent write"
    );
    metrics::describe_counter!(
        "document_store_transactions_exhausted_total",
        "Store transactions that gave up after the retry budget"
    );

    Ok(handle)
}
