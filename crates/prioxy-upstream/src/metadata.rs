use serde_json::Value;

/// Classification extracted from a buffered request body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RequestMetadata {
    /// Model named in the request, empty when absent.
    pub model: String,
    /// Rough token estimate: text length / 4 over all text inputs.
    pub input_tokens: i64,
    /// Tool types named in the request.
    pub tools: Vec<String>,
}

/// Parse an OpenAI-style request body for routing and telemetry metadata.
///
/// Understands the text inputs of chat (`messages`), completion (`prompt`
/// string or array) and embedding (`input` string or array) request
/// shapes. An empty body yields empty metadata; malformed JSON is an
/// error the caller is expected to log and ignore.
pub fn extract_request_metadata(body: &[u8]) -> serde_json::Result<RequestMetadata> {
    if body.is_empty() {
        return Ok(RequestMetadata::default());
    }
    let request: Value = serde_json::from_slice(body)?;

    let model = request
        .get("model")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let mut input_tokens = 0i64;
    if let Some(messages) = request.get("messages").and_then(Value::as_array) {
        for message in messages {
            if let Some(content) = message.get("content").and_then(Value::as_str) {
                input_tokens += estimate_tokens(content);
            }
        }
    } else if let Some(prompt) = request.get("prompt") {
        input_tokens += estimate_text_value(prompt);
    } else if let Some(input) = request.get("input") {
        input_tokens += estimate_text_value(input);
    }

    let tools = request
        .get("tools")
        .and_then(Value::as_array)
        .map(|tools| {
            tools
                .iter()
                .filter_map(|tool| tool.get("type").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(RequestMetadata {
        model,
        input_tokens,
        tools,
    })
}

fn estimate_tokens(text: &str) -> i64 {
    text.len() as i64 / 4
}

fn estimate_text_value(value: &Value) -> i64 {
    match value {
        Value::String(text) => estimate_tokens(text),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(estimate_tokens)
            .sum(),
        _ => 0,
    }
}
