//! HTTP surface: the scrape endpoint plus health and index pages.

use std::net::SocketAddr;

use axum::{
    Router,
    extract::State,
    http::header,
    response::{Html, IntoResponse},
    routing::get,
};
use tokio::net::TcpListener;
use tower_http::{compression::CompressionLayer, trace::TraceLayer};

use crate::prelude::*;

/// Content type of the Prometheus text exposition format.
pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

const INDEX: &str = r#"<html>
<head><title>kube-state-exporter</title></head>
<body>
<h1>kube-state-exporter</h1>
<ul>
<li><a href="metrics">metrics</a></li>
<li><a href="healthz">healthz</a></li>
</ul>
</body>
</html>
"#;

/// Runs the HTTP server on `addr` until `token` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    collector: Arc<Collector>,
    gzip: bool,
    token: CancellationToken,
) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, gzip, "started metrics server");
    axum::serve(listener, router(collector, gzip))
        .with_graceful_shutdown(token.cancelled_owned())
        .await?;
    info!("metrics server stopped");
    Ok(())
}

/// With `gzip` set, `/metrics` is compressed for clients that accept it.
pub fn router(collector: Arc<Collector>, gzip: bool) -> Router {
    let mut scrape = get(metrics);
    if gzip {
        scrape = scrape.layer(CompressionLayer::new());
    }
    Router::new()
        .route("/", get(index))
        .route("/metrics", scrape)
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(collector)
}

async fn index() -> Html<&'static str> {
    Html(INDEX)
}

async fn metrics(State(collector): State<Arc<Collector>>) -> impl IntoResponse {
    ([(header::CONTENT_TYPE, CONTENT_TYPE)], collector.get_all())
}

async fn healthz() -> &'static str {
    "OK"
}
