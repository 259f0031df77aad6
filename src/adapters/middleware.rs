//! Axum middleware for the local emulator.
use std::time::Instant;

use axum::{extract::Request, http::HeaderValue, middleware::Next, response::Response};
use tracing::Instrument;

use crate::tracing_setup;

pub const REQUEST_ID_HEADER: &str = "x-amzn-requestid";

/// Per-request id, available to handlers as a request extension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Assign a request id, run the request inside a `request` span and echo the
/// id back in `x-amzn-requestid`.
pub async fn request_id_middleware(mut req: Request, next: Next) -> Response {
    let request_id = uuid::Uuid::new_v4().to_string();
    req.extensions_mut().insert(RequestId(request_id.clone()));

    let span = tracing_setup::create_request_span(
        req.method().as_str(),
        req.uri().path(),
        &request_id,
    );
    let start = Instant::now();
    let mut response = next.run(req).instrument(span.clone()).await;

    span.record("http.status_code", response.status().as_u16());
    span.record("duration_ms", start.elapsed().as_millis() as u64);

    if let Ok(header_value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, header_value);
    }
    response
}

/// Log start/end of a request including latency.
pub async fn request_timing_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    tracing::debug!(%method, %uri, "Started processing request");
    let response = next.run(req).await;

    tracing::info!(
        %method,
        %uri,
        status = response.status().as_u16(),
        elapsed = ?start.elapsed(),
        "Completed request"
    );
    response
}
