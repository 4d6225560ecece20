use std::sync::Arc;

use parking_lot::RwLock;

use prioxy_common::Endpoint;

use crate::queue::{PriorityQueue, DEFAULT_QUEUE_CAPACITY};

/// Owns the fixed set of priority queues and the shutdown flag.
///
/// The queue set is immutable after construction; the lock guards the
/// shutdown transition and keeps the read paths safe for a future dynamic
/// reconfiguration.
pub struct QueueManager {
    inner: RwLock<Inner>,
}

struct Inner {
    queues: Vec<Arc<PriorityQueue>>,
    stopping: bool,
}

impl QueueManager {
    pub fn new(endpoints: &[Endpoint]) -> Self {
        Self::with_capacity(endpoints, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(endpoints: &[Endpoint], capacity: usize) -> Self {
        let queues = endpoints
            .iter()
            .map(|ep| Arc::new(PriorityQueue::new(ep.port, ep.priority, ep.preemptive, capacity)))
            .collect();
        Self {
            inner: RwLock::new(Inner {
                queues,
                stopping: false,
            }),
        }
    }

    pub fn find_by_rank(&self, rank: u32) -> Option<Arc<PriorityQueue>> {
        self.inner
            .read()
            .queues
            .iter()
            .find(|q| q.rank == rank)
            .cloned()
    }

    pub fn find_by_port(&self, port: u16) -> Option<Arc<PriorityQueue>> {
        self.inner
            .read()
            .queues
            .iter()
            .find(|q| q.port == port)
            .cloned()
    }

    /// Arrange the internal order ascending by rank so iteration is a
    /// strict priority sweep.
    pub fn sort_by_rank(&self) {
        self.inner.write().queues.sort_by_key(|q| q.rank);
    }

    /// Snapshot of the queue list in its current order.
    pub(crate) fn queues(&self) -> Vec<Arc<PriorityQueue>> {
        self.inner.read().queues.clone()
    }

    /// True when some preemptive queue ranked above `current_rank` has work
    /// waiting and the manager is not shutting down.
    pub fn should_preempt(&self, current_rank: u32) -> bool {
        let inner = self.inner.read();
        if inner.stopping {
            return false;
        }
        inner
            .queues
            .iter()
            .any(|q| q.rank < current_rank && q.preemptive && q.has_pending())
    }

    /// Stop preemption checks and new dispatches; in-flight requests run to
    /// completion on their own.
    pub fn begin_shutdown(&self) {
        self.inner.write().stopping = true;
    }

    pub fn is_stopping(&self) -> bool {
        self.inner.read().stopping
    }
}
