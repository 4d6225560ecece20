use async_trait::async_trait;
use bytes::Bytes;
use http::Method;
use tokio_util::sync::CancellationToken;

use prioxy_common::Result;

use crate::reply::ProxyResponse;

/// Seam for the upstream HTTP client.
///
/// Implementations must honor `cancel` and surface it as
/// [`ProxyError::Cancelled`](prioxy_common::ProxyError::Cancelled) so a
/// preempted attempt unblocks promptly.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        cancel: &CancellationToken,
        method: Method,
        path: &str,
        body: Bytes,
    ) -> Result<ProxyResponse>;
}
