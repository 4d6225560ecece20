use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use prioxy_common::Endpoint;
use prioxy_scheduler::QueueManager;

use crate::ingress::router;

/// Bind one listener per configured endpoint and serve until `shutdown`
/// fires. Every listener shares the same queue manager; the Host header
/// decides which queue a request lands on.
pub async fn serve(
    endpoints: &[Endpoint],
    manager: Arc<QueueManager>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut servers = Vec::with_capacity(endpoints.len());
    for endpoint in endpoints {
        let listener = TcpListener::bind(("0.0.0.0", endpoint.port))
            .await
            .with_context(|| format!("binding port {}", endpoint.port))?;
        info!(
            port = endpoint.port,
            priority = endpoint.priority,
            preemptive = endpoint.preemptive,
            "listening"
        );

        let app = router(manager.clone());
        let observer = shutdown.clone();
        servers.push(tokio::spawn(async move {
            if let Err(err) = axum::serve(listener, app)
                .with_graceful_shutdown(observer.cancelled_owned())
                .await
            {
                error!("server error: {err}");
            }
        }));
    }

    for server in servers {
        let _ = server.await;
    }
    Ok(())
}
