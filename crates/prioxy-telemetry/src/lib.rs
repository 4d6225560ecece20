mod influx;

pub use influx::InfluxSink;

use std::time::Duration;

/// Measurements taken for a single proxied request.
#[derive(Debug, Clone)]
pub struct RequestRecord {
    /// Model named in the request body, empty when classification failed.
    pub model: String,
    /// Estimated input tokens (text length / 4).
    pub input_tokens: i64,
    /// Wall-clock time of the successful attempt, not cumulative across
    /// retries.
    pub processing_time: Duration,
    /// Number of preemptions this request went through before completing.
    pub retry_count: u32,
    /// Tool types named in the request body.
    pub tools: Vec<String>,
    pub endpoint_path: String,
    /// Priority rank of the queue that carried the request.
    pub rank: u32,
    pub preempted: bool,
    pub status_code: u16,
}

/// Destination for per-request measurements.
///
/// Submission is fire-and-forget: implementations log failures and never
/// surface them to the request path.
pub trait TelemetrySink: Send + Sync {
    fn submit(&self, record: RequestRecord);
}

/// Sink used when no telemetry backend is configured.
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn submit(&self, record: RequestRecord) {
        tracing::debug!(
            model = %record.model,
            status = record.status_code,
            "telemetry disabled, dropping record"
        );
    }
}
