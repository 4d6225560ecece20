pub mod forwarder;
pub mod manager;
pub mod processor;
pub mod queue;
pub mod reply;
pub mod scheduler;

pub use forwarder::Forwarder;
pub use manager::QueueManager;
pub use processor::RequestProcessor;
pub use queue::{PriorityQueue, QueuedRequest, DEFAULT_QUEUE_CAPACITY};
pub use reply::{ProxyResponse, ResponseSlot, OVERLOADED_BODY};
pub use scheduler::Scheduler;
