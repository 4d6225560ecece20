use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::info;

use prioxy_telemetry::TelemetrySink;

use crate::forwarder::Forwarder;
use crate::manager::QueueManager;
use crate::processor::RequestProcessor;

/// Pause between scans when every queue is empty.
const SCAN_INTERVAL: Duration = Duration::from_millis(10);

/// Strict-priority dispatch loop over the manager's queues.
pub struct Scheduler {
    manager: Arc<QueueManager>,
    processor: Arc<RequestProcessor>,
}

impl Scheduler {
    pub fn new(
        manager: Arc<QueueManager>,
        forwarder: Arc<dyn Forwarder>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let processor = Arc::new(RequestProcessor::new(
            manager.clone(),
            forwarder,
            telemetry,
        ));
        Self { manager, processor }
    }

    /// Run until `shutdown` fires.
    ///
    /// Each pass scans the queues in ascending rank order and dispatches
    /// the head of the first non-empty queue onto its own task; an idle
    /// pass sleeps briefly before rescanning. On shutdown the manager's
    /// stopping flag is set and in-flight requests finish on their own.
    pub async fn run(&self, shutdown: CancellationToken) {
        self.manager.sort_by_rank();
        info!("scheduler started");
        loop {
            if shutdown.is_cancelled() {
                break;
            }
            if self.dispatch_next() {
                // Another head may already be waiting; rescan right away.
                tokio::task::yield_now().await;
                continue;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(SCAN_INTERVAL) => {}
            }
        }
        self.manager.begin_shutdown();
        info!("scheduler stopped, letting in-flight requests finish");
    }

    /// Dispatch the highest-priority pending request, if any.
    fn dispatch_next(&self) -> bool {
        for queue in self.manager.queues() {
            if let Some(request) = queue.try_dequeue() {
                let processor = self.processor.clone();
                tokio::spawn(processor.process(queue, request));
                return true;
            }
        }
        false
    }
}
