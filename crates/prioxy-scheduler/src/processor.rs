use std::sync::Arc;
use std::time::{Duration, Instant};

use http::StatusCode;
use tracing::{error, info, warn};

use prioxy_telemetry::{RequestRecord, TelemetrySink};

use crate::forwarder::Forwarder;
use crate::manager::QueueManager;
use crate::queue::{PriorityQueue, QueuedRequest};
use crate::reply::ProxyResponse;

/// Pause between preemption checks while an attempt is in flight.
const PREEMPT_CHECK_INTERVAL: Duration = Duration::from_millis(50);

/// Shared context for running dispatched requests against the upstream.
pub struct RequestProcessor {
    manager: Arc<QueueManager>,
    forwarder: Arc<dyn Forwarder>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl RequestProcessor {
    pub fn new(
        manager: Arc<QueueManager>,
        forwarder: Arc<dyn Forwarder>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            manager,
            forwarder,
            telemetry,
        }
    }

    /// Run one attempt of a dispatched request.
    ///
    /// The attempt's preemption monitor runs alongside; whichever side
    /// reaches a terminal decision first takes the response slot.
    pub async fn process(self: Arc<Self>, queue: Arc<PriorityQueue>, request: QueuedRequest) {
        if request.reply.is_finished() {
            // Stale retry of a request that was already answered.
            return;
        }

        tokio::spawn(Arc::clone(&self).monitor_preemption(queue.clone(), request.clone()));

        let started = Instant::now();
        let result = self
            .forwarder
            .forward(
                &request.cancel,
                request.method.clone(),
                &request.path,
                request.body.clone(),
            )
            .await;
        let processing_time = started.elapsed();

        if request.cancel.is_cancelled() {
            // Preempted: the monitor owns the requeue and the response slot
            // stays untouched for the retry.
            return;
        }

        match result {
            Err(err) => {
                warn!(request_id = %request.id, path = %request.path, "forwarding failed: {err}");
                let body = serde_json::json!({
                    "error": format!("Error forwarding request: {err}")
                })
                .to_string();
                request
                    .reply
                    .respond(ProxyResponse::json(StatusCode::BAD_GATEWAY, body));
            }
            Ok(response) => {
                let status = response.status;
                self.telemetry.submit(RequestRecord {
                    model: request.model.clone(),
                    input_tokens: request.input_tokens,
                    processing_time,
                    retry_count: request.retry_count,
                    tools: request.tools.clone(),
                    endpoint_path: request.path.clone(),
                    rank: queue.rank,
                    preempted: request.preempted,
                    status_code: status.as_u16(),
                });
                info!(
                    request_id = %request.id,
                    model = %request.model,
                    path = %request.path,
                    rank = queue.rank,
                    retries = request.retry_count,
                    elapsed_ms = processing_time.as_millis() as u64,
                    "request completed"
                );
                request.reply.respond(response);
            }
        }
    }

    /// Watch sibling queues while an attempt runs; cancel the attempt and
    /// requeue the request when a higher-ranked preemptive queue has work
    /// waiting. Stops as soon as the logical request completes.
    async fn monitor_preemption(
        self: Arc<Self>,
        queue: Arc<PriorityQueue>,
        request: QueuedRequest,
    ) {
        let done = request.reply.done();
        loop {
            tokio::select! {
                _ = done.cancelled() => return,
                _ = tokio::time::sleep(PREEMPT_CHECK_INTERVAL) => {}
            }
            if !self.manager.should_preempt(queue.rank) {
                continue;
            }

            request.cancel.cancel();

            // Rank 1 cannot be outranked; nothing to requeue if this guard
            // is ever reached.
            if queue.rank <= 1 {
                return;
            }
            if request.reply.is_finished() {
                // Completed on the same tick; the cancel hit nothing.
                return;
            }

            let retry = request.retry();
            let attempt = retry.retry_count + 1;
            match queue.try_enqueue(retry) {
                Ok(()) => {
                    info!(
                        request_id = %request.id,
                        model = %request.model,
                        rank = queue.rank,
                        attempt,
                        "request preempted, requeued for retry"
                    );
                }
                Err(_rejected) => {
                    error!(
                        request_id = %request.id,
                        rank = queue.rank,
                        "could not requeue preempted request, queue is full"
                    );
                    request.reply.respond(ProxyResponse::overloaded());
                }
            }
            return;
        }
    }
}
