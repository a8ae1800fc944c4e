//! Liveness endpoint

use crate::error::Result;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Router answering `OK` on every path; HEAD is served by the GET route
pub fn router() -> Router {
    Router::new().fallback(get(|| async { "OK" }))
}

/// Serve the health endpoint until `shutdown` is cancelled
pub async fn serve(addr: &str, shutdown: CancellationToken) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("Health endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, router())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Health endpoint stopped");
    Ok(())
}
