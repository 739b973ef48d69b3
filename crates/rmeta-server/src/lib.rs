mod convert;
mod http;
mod service;

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use rmeta_consensus::ReplicatedLog;
use rmeta_storage::StateMachineStore;

pub use convert::{ret_code, Reply, RET_FAIL, RET_OK};
pub use http::router;
pub use service::{DataSnapshot, MetaService, MetaServiceConfig};

/// Serve the JSON-over-HTTP API on `addr` until `shutdown` resolves.
pub async fn serve<L, S>(
    addr: SocketAddr,
    service: Arc<MetaService<L, S>>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()>
where
    L: ReplicatedLog,
    S: StateMachineStore,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, node_id = service.node_id(), "metadata HTTP server starting");
    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Into::into)
}
