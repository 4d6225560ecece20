#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{Method, StatusCode};
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use prioxy_common::{ProxyError, Result};
use prioxy_scheduler::{Forwarder, ProxyResponse, QueuedRequest, ResponseSlot};
use prioxy_telemetry::{RequestRecord, TelemetrySink};

/// Upstream stand-in with a configurable delay; honors cancellation the
/// way the real client does.
pub struct MockUpstream {
    pub delay: Duration,
    pub status: StatusCode,
    pub body: &'static str,
    calls: AtomicUsize,
}

impl MockUpstream {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            status: StatusCode::OK,
            body: r#"{"id":"r1"}"#,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Forwarder for MockUpstream {
    async fn forward(
        &self,
        cancel: &CancellationToken,
        _method: Method,
        _path: &str,
        _body: Bytes,
    ) -> Result<ProxyResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::select! {
            _ = cancel.cancelled() => Err(ProxyError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {
                Ok(ProxyResponse::json(self.status, self.body))
            }
        }
    }
}

/// Upstream stand-in that always fails with a transport error.
pub struct FailingUpstream;

#[async_trait]
impl Forwarder for FailingUpstream {
    async fn forward(
        &self,
        _cancel: &CancellationToken,
        _method: Method,
        _path: &str,
        _body: Bytes,
    ) -> Result<ProxyResponse> {
        Err(ProxyError::Upstream("connection refused".to_string()))
    }
}

/// Sink capturing submitted records for assertions.
#[derive(Default)]
pub struct RecordingSink {
    records: Mutex<Vec<RequestRecord>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<RequestRecord> {
        self.records.lock().clone()
    }
}

impl TelemetrySink for RecordingSink {
    fn submit(&self, record: RequestRecord) {
        self.records.lock().push(record);
    }
}

pub fn chat_request(model: &str) -> (QueuedRequest, oneshot::Receiver<ProxyResponse>) {
    let (reply, rx) = ResponseSlot::new();
    let mut request = QueuedRequest::new(
        Method::POST,
        "/v1/chat/completions".to_string(),
        Bytes::from_static(br#"{"model":"gpt-4","messages":[{"role":"user","content":"Hello"}]}"#),
        reply,
    );
    request.model = model.to_string();
    request.input_tokens = 100;
    (request, rx)
}

pub async fn read_body(response: ProxyResponse) -> Bytes {
    use futures::StreamExt;
    let chunks: Vec<_> = response.body.collect().await;
    let mut out = Vec::new();
    for chunk in chunks {
        out.extend_from_slice(&chunk.expect("body chunk"));
    }
    Bytes::from(out)
}

/// Poll until the upstream has seen `count` calls, or give up.
pub async fn wait_for_calls(upstream: &MockUpstream, count: usize) {
    for _ in 0..200 {
        if upstream.call_count() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "upstream never reached {count} calls (saw {})",
        upstream.call_count()
    );
}
