use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use std::time::Instant;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Per-request logging: a short request id (taken from `X-Request-ID` or
/// generated), start/finish lines with latency, and the id echoed back on the
/// response so callers can correlate.
pub async fn request_logging(mut request: Request, next: Next) -> Response {
    let request_id = match incoming_request_id(&request) {
        Some(id) => id,
        None => {
            let id = short_id();
            if let Ok(value) = HeaderValue::from_str(&id) {
                // Make the generated id visible to handlers downstream.
                request.headers_mut().insert(REQUEST_ID_HEADER, value);
            }
            id
        }
    };

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let started = Instant::now();
    tracing::info!(%method, path = %path, request_id = %request_id, "request started");

    let mut response = next.run(request).await;

    let elapsed_ms = started.elapsed().as_millis() as u64;
    tracing::info!(
        %method,
        path = %path,
        request_id = %request_id,
        status = response.status().as_u16(),
        elapsed_ms,
        "request completed"
    );

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request id for handlers: whatever the middleware put on the request, or a
/// fresh id when the middleware is not in the stack (tests)
pub fn request_id_from(headers: &axum::http::HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(short_id)
}

fn incoming_request_id(request: &Request) -> Option<String> {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn short_id() -> String {
    let id = Uuid::new_v4().to_string();
    id[..8].to_string()
}
