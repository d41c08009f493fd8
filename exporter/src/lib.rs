//! Exporter wires the per-kind generators to watch streams and serves the result over HTTP.

// Re-exports for everyone's easy use.
pub(crate) mod prelude {
    pub use std::sync::Arc;

    pub use futures::prelude::*;
    pub use kube::{Api, runtime::watcher};
    pub use metrics_store::{Collector, MetricsStore, MetricsWriter, Writer};
    pub use tokio_util::sync::CancellationToken;
    pub use tracing::{debug, info, instrument, warn};

    pub use super::Result;
}

pub mod builder;
pub mod config;
pub mod server;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("tracing_subscriber error: {0}")]
    TracingConfig(#[from] tracing_subscriber::filter::ParseError),
    #[error("tracing error: {0}")]
    Tracing(#[from] tracing::subscriber::SetGlobalDefaultError),
    #[error("kube error: {0}")]
    Kube(#[from] kube::Error),
    #[error("kubeconfig error: {0}")]
    KubeConfig(#[from] kube::config::InferConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tokio error: {0}")]
    Tokio(#[from] tokio::task::JoinError),
    #[error("parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("yaml error: {0}")]
    YAML(#[from] serde_yaml::Error),
    #[error("metric error: {0}")]
    Metric(#[from] metric::Error),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Result typedef for the exporter.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Counter of watch stream errors, by resource.
pub const WATCH_ERRORS: &str = "kube_state_exporter_watch_errors_total";

/// Registers help text for the exporter's own metrics.
///
/// The counters and gauges themselves are emitted by the store and the watch tasks.
pub fn describe_metrics() {
    use metrics::{describe_counter, describe_gauge};
    describe_counter!(
        "kube_state_exporter_generate_errors_total",
        "Objects whose metrics could not be generated."
    );
    describe_counter!(
        "kube_state_exporter_watch_events_total",
        "Watch events applied to the metrics stores."
    );
    describe_counter!(WATCH_ERRORS, "Errors returned by watch streams.");
    describe_gauge!(
        "kube_state_exporter_store_objects",
        "Objects held in a metrics store."
    );
}
