use std::time::Instant;

use bytes::Bytes;
use http::Method;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::reply::ResponseSlot;

/// Bounded pending capacity per queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// One attempt of a proxied request.
///
/// Cloning is cheap (the body is reference-counted); a clone is how the
/// preemption monitor keeps enough state to rebuild the envelope for a
/// retry while the processor owns the in-flight attempt. Clones share the
/// response slot and the attempt's cancellation scope.
#[derive(Clone, Debug)]
pub struct QueuedRequest {
    /// Stable id of the logical request, kept across retries for log
    /// correlation.
    pub id: Uuid,
    pub method: Method,
    pub path: String,
    /// Fully buffered request body, re-sent verbatim on every retry.
    pub body: Bytes,
    pub reply: ResponseSlot,
    /// Cancellation scope for the current attempt only; a retry envelope
    /// gets a fresh one.
    pub cancel: CancellationToken,
    /// First-enqueue time, preserved across preemptions.
    pub queued_at: Instant,
    pub model: String,
    pub input_tokens: i64,
    pub tools: Vec<String>,
    /// Number of times this logical request has been preempted so far.
    pub retry_count: u32,
    pub preempted: bool,
}

impl QueuedRequest {
    pub fn new(method: Method, path: String, body: Bytes, reply: ResponseSlot) -> Self {
        Self {
            id: Uuid::new_v4(),
            method,
            path,
            body,
            reply,
            cancel: CancellationToken::new(),
            queued_at: Instant::now(),
            model: String::new(),
            input_tokens: 0,
            tools: Vec::new(),
            retry_count: 0,
            preempted: false,
        }
    }

    /// Envelope for the retry after a preemption: same response slot,
    /// enqueue time and classification, fresh cancellation scope.
    pub fn retry(&self) -> Self {
        let mut next = self.clone();
        next.cancel = CancellationToken::new();
        next.retry_count += 1;
        next.preempted = true;
        next
    }
}

/// FIFO channel of pending requests bound to one ingress port and one
/// priority rank.
pub struct PriorityQueue {
    pub port: u16,
    /// Lower is more urgent; 1 is the top class. Unique across queues.
    pub rank: u32,
    /// Whether pending work here may interrupt lower-ranked in-flight
    /// requests.
    pub preemptive: bool,
    tx: flume::Sender<QueuedRequest>,
    rx: flume::Receiver<QueuedRequest>,
}

impl PriorityQueue {
    pub fn new(port: u16, rank: u32, preemptive: bool, capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self {
            port,
            rank,
            preemptive,
            tx,
            rx,
        }
    }

    /// Non-blocking enqueue; a full queue hands the envelope back so the
    /// caller can answer the client itself.
    pub fn try_enqueue(&self, request: QueuedRequest) -> Result<(), QueuedRequest> {
        self.tx.try_send(request).map_err(|err| err.into_inner())
    }

    pub fn try_dequeue(&self) -> Option<QueuedRequest> {
        self.rx.try_recv().ok()
    }

    pub fn has_pending(&self) -> bool {
        !self.rx.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reply::ResponseSlot;

    fn request(path: &str) -> QueuedRequest {
        let (reply, _rx) = ResponseSlot::new();
        QueuedRequest::new(Method::POST, path.to_string(), Bytes::from_static(b"{}"), reply)
    }

    #[test]
    fn fifo_within_a_queue() {
        let queue = PriorityQueue::new(8080, 1, true, 10);
        queue.try_enqueue(request("/a")).unwrap();
        queue.try_enqueue(request("/b")).unwrap();
        queue.try_enqueue(request("/c")).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.try_dequeue().unwrap().path, "/a");
        assert_eq!(queue.try_dequeue().unwrap().path, "/b");
        assert_eq!(queue.try_dequeue().unwrap().path, "/c");
        assert!(queue.try_dequeue().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn full_queue_hands_the_envelope_back() {
        let queue = PriorityQueue::new(8080, 1, true, 1);
        queue.try_enqueue(request("/a")).unwrap();

        let rejected = queue.try_enqueue(request("/b")).unwrap_err();
        assert_eq!(rejected.path, "/b");
        // The rejected envelope is still usable for an error reply.
        assert!(!rejected.reply.is_finished());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn retry_preserves_identity_and_renews_the_attempt() {
        let original = request("/v1/chat/completions");
        let retry = original.retry();

        assert_eq!(retry.id, original.id);
        assert_eq!(retry.queued_at, original.queued_at);
        assert_eq!(retry.body, original.body);
        assert_eq!(retry.retry_count, 1);
        assert!(retry.preempted);
        assert!(!original.preempted);

        // Fresh cancellation scope: cancelling the old attempt must not
        // leak into the retry.
        original.cancel.cancel();
        assert!(!retry.cancel.is_cancelled());

        // The response slot is shared: answering the retry finishes the
        // logical request.
        let second = retry.retry();
        assert_eq!(second.retry_count, 2);
        retry
            .reply
            .respond(crate::reply::ProxyResponse::overloaded());
        assert!(original.reply.is_finished());
        assert!(second.reply.is_finished());
    }
}
