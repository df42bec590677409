//! Request tracing middleware

use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use uuid::Uuid;

/// Log every request with a generated request id, its outcome and latency
pub async fn request_tracing(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    tracing::debug!(%request_id, %method, %path, "Request started");

    let start = Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            %request_id,
            %method,
            %path,
            status = status.as_u16(),
            duration_ms,
            "Request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            %request_id,
            %method,
            %path,
            status = status.as_u16(),
            duration_ms,
            "Request rejected"
        );
    } else {
        tracing::info!(
            %request_id,
            %method,
            %path,
            status = status.as_u16(),
            duration_ms,
            "Request completed"
        );
    }

    response
}
