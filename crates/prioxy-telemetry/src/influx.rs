use reqwest::Client;
use tracing::warn;

use crate::{RequestRecord, TelemetrySink};

/// InfluxDB v2 sink writing one line-protocol point per request.
pub struct InfluxSink {
    client: Client,
    write_url: String,
    token: String,
}

impl InfluxSink {
    pub fn new(url: &str, token: &str, org: &str, bucket: &str) -> Self {
        let base = url.trim_end_matches('/');
        Self {
            client: Client::new(),
            write_url: format!("{base}/api/v2/write?org={org}&bucket={bucket}"),
            token: token.to_string(),
        }
    }

    fn encode(record: &RequestRecord) -> String {
        let mut line = String::from("openai_request");
        if !record.model.is_empty() {
            line.push_str(",model=");
            line.push_str(&escape_tag(&record.model));
        }
        line.push_str(",endpoint=");
        line.push_str(&escape_tag(&record.endpoint_path));
        line.push_str(&format!(",priority={}", record.rank));
        line.push_str(&format!(",preempted={}", record.preempted));
        line.push_str(&format!(
            " input_tokens={}i,processing_time_ms={}i,retry_count={}i,status_code={}i",
            record.input_tokens,
            record.processing_time.as_millis(),
            record.retry_count,
            record.status_code,
        ));
        if !record.tools.is_empty() {
            line.push_str(&format!(
                ",tools=\"{}\"",
                escape_field_string(&record.tools.join(","))
            ));
        }
        line
    }
}

impl TelemetrySink for InfluxSink {
    fn submit(&self, record: RequestRecord) {
        let request = self
            .client
            .post(&self.write_url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(Self::encode(&record));

        // Fire and forget; the request path never waits on telemetry.
        tokio::spawn(async move {
            match request.send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "telemetry write rejected");
                }
                Ok(_) => {}
                Err(err) => warn!("telemetry write failed: {err}"),
            }
        });
    }
}

fn escape_tag(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(',', "\\,")
        .replace(' ', "\\ ")
        .replace('=', "\\=")
}

fn escape_field_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn record() -> RequestRecord {
        RequestRecord {
            model: "gpt-4".to_string(),
            input_tokens: 100,
            processing_time: Duration::from_millis(250),
            retry_count: 2,
            tools: vec!["function".to_string(), "web_search".to_string()],
            endpoint_path: "/v1/chat/completions".to_string(),
            rank: 2,
            preempted: true,
            status_code: 200,
        }
    }

    #[test]
    fn encodes_line_protocol() {
        let line = InfluxSink::encode(&record());
        assert_eq!(
            line,
            "openai_request,model=gpt-4,endpoint=/v1/chat/completions,priority=2,preempted=true \
             input_tokens=100i,processing_time_ms=250i,retry_count=2i,status_code=200i,\
             tools=\"function,web_search\""
        );
    }

    #[test]
    fn skips_empty_model_tag() {
        let mut unclassified = record();
        unclassified.model = String::new();
        unclassified.tools = Vec::new();
        let line = InfluxSink::encode(&unclassified);
        assert!(line.starts_with("openai_request,endpoint="));
        assert!(!line.contains("model="));
        assert!(!line.contains("tools="));
    }

    #[test]
    fn escapes_tag_characters() {
        let mut spaced = record();
        spaced.model = "my model,v=1".to_string();
        let line = InfluxSink::encode(&spaced);
        assert!(line.contains("model=my\\ model\\,v\\=1"));
    }

    #[test]
    fn write_url_includes_org_and_bucket() {
        let sink = InfluxSink::new("http://localhost:8086/", "t", "openaiorg", "proxybucket");
        assert_eq!(
            sink.write_url,
            "http://localhost:8086/api/v2/write?org=openaiorg&bucket=proxybucket"
        );
    }
}
