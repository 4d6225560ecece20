use std::io;
use std::sync::Arc;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, StatusCode};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub const OVERLOADED_BODY: &str = r#"{"error":"Service overloaded, please try again later"}"#;

/// Terminal response handed back to the waiting ingress handler.
///
/// The body is a byte stream so upstream payloads are copied through
/// without ever being buffered whole in the proxy.
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl ProxyResponse {
    /// Single-chunk JSON response produced by the proxy itself.
    pub fn json(status: StatusCode, body: impl Into<String>) -> Self {
        let body = Bytes::from(body.into());
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body: stream::once(async move { Ok(body) }).boxed(),
        }
    }

    pub fn overloaded() -> Self {
        Self::json(StatusCode::SERVICE_UNAVAILABLE, OVERLOADED_BODY)
    }
}

impl std::fmt::Debug for ProxyResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Write-once response slot shared by every attempt of a logical request.
///
/// Delivering the response consumes the slot and fires the completion
/// token in the same call, so the client receives at most one response and
/// completion observers wake exactly once per logical request, no matter
/// how many retry envelopes share the slot.
#[derive(Clone)]
pub struct ResponseSlot {
    tx: Arc<Mutex<Option<oneshot::Sender<ProxyResponse>>>>,
    done: CancellationToken,
}

impl ResponseSlot {
    pub fn new() -> (Self, oneshot::Receiver<ProxyResponse>) {
        let (tx, rx) = oneshot::channel();
        let slot = Self {
            tx: Arc::new(Mutex::new(Some(tx))),
            done: CancellationToken::new(),
        };
        (slot, rx)
    }

    /// Deliver the terminal response. Returns false when another site
    /// already responded; the given response is dropped in that case.
    pub fn respond(&self, response: ProxyResponse) -> bool {
        let Some(tx) = self.tx.lock().take() else {
            return false;
        };
        if tx.send(response).is_err() {
            debug!("client went away before the response could be delivered");
        }
        self.done.cancel();
        true
    }

    /// Completion signal; cancelled once the terminal response is in.
    pub fn done(&self) -> CancellationToken {
        self.done.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.tx.lock().is_none()
    }
}

impl std::fmt::Debug for ResponseSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseSlot")
            .field("finished", &self.is_finished())
            .finish()
    }
}
