use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::extract::{Request, State};
use axum::response::Response;
use axum::Router;
use http::header::{
    ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS, ACCESS_CONTROL_ALLOW_ORIGIN,
    CONTENT_TYPE, HOST,
};
use http::{HeaderValue, Method, StatusCode};
use tower_http::trace::TraceLayer;
use tracing::warn;

use prioxy_scheduler::{ProxyResponse, QueueManager, QueuedRequest, ResponseSlot, OVERLOADED_BODY};
use prioxy_upstream::extract_request_metadata;

const METHOD_NOT_ALLOWED_BODY: &str = r#"{"error":"Method not allowed"}"#;
const INVALID_PORT_BODY: &str = r#"{"error":"Invalid port"}"#;
const NO_QUEUE_BODY: &str = r#"{"error":"No queue configured for this port"}"#;
const BODY_READ_BODY: &str = r#"{"error":"Failed to read request body"}"#;
const ABORTED_BODY: &str = r#"{"error":"Request aborted"}"#;

#[derive(Clone)]
struct GatewayState {
    manager: Arc<QueueManager>,
}

/// Router handling every path on a listener.
///
/// Requests are classified by the port in the Host header and parked on
/// the matching priority queue until the scheduler answers.
pub fn router(manager: Arc<QueueManager>) -> Router {
    Router::new()
        .fallback(handle)
        .layer(TraceLayer::new_for_http())
        .with_state(GatewayState { manager })
}

async fn handle(State(state): State<GatewayState>, request: Request) -> Response {
    if request.method() == Method::OPTIONS {
        return with_cors(Response::new(Body::empty()));
    }
    if request.method() != Method::POST && request.method() != Method::GET {
        return with_cors(json_response(
            StatusCode::METHOD_NOT_ALLOWED,
            METHOD_NOT_ALLOWED_BODY,
        ));
    }

    let Some(port) = host_port(&request) else {
        return with_cors(json_response(StatusCode::BAD_REQUEST, INVALID_PORT_BODY));
    };
    let Some(queue) = state.manager.find_by_port(port) else {
        return with_cors(json_response(StatusCode::NOT_FOUND, NO_QUEUE_BODY));
    };

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    // Buffer the whole body up front: it is classified here and re-sent
    // verbatim on every retry after a preemption.
    let body = match to_bytes(request.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(_) => return with_cors(json_response(StatusCode::BAD_REQUEST, BODY_READ_BODY)),
    };

    let (reply, response_rx) = ResponseSlot::new();
    let mut queued = QueuedRequest::new(method, path, body, reply);
    match extract_request_metadata(&queued.body) {
        Ok(metadata) => {
            queued.model = metadata.model;
            queued.input_tokens = metadata.input_tokens;
            queued.tools = metadata.tools;
        }
        Err(err) => warn!("failed to extract request metadata: {err}"),
    }

    if queue.try_enqueue(queued).is_err() {
        return with_cors(json_response(StatusCode::TOO_MANY_REQUESTS, OVERLOADED_BODY));
    }

    // Park until the scheduler (or the preemption monitor's overload
    // path) answers.
    match response_rx.await {
        Ok(response) => with_cors(forwarded_response(response)),
        Err(_) => with_cors(json_response(StatusCode::BAD_GATEWAY, ABORTED_BODY)),
    }
}

/// Listening port, taken from the Host header the client addressed.
fn host_port(request: &Request) -> Option<u16> {
    let host = request.headers().get(HOST)?.to_str().ok()?;
    let (_, port) = host.rsplit_once(':')?;
    port.parse().ok()
}

fn json_response(status: StatusCode, body: &str) -> Response {
    let mut response = Response::new(Body::from(body.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

/// Upstream status, headers and body stream, copied through unchanged.
fn forwarded_response(upstream: ProxyResponse) -> Response {
    let mut response = Response::new(Body::from_stream(upstream.body));
    *response.status_mut() = upstream.status;
    *response.headers_mut() = upstream.headers;
    response
}

fn with_cors(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, GET, OPTIONS, PUT, DELETE"),
    );
    headers.insert(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type, Authorization"),
    );
    response
}
