use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Adds two response headers and logs one line per API request:
///
///   X-Response-Time-Us  total handler wall time in microseconds
///   Server-Timing       same value in the standard Server-Timing format
pub async fn timing_middleware(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let start = Instant::now();
    let mut response = next.run(req).await;
    let elapsed = start.elapsed();
    let us = elapsed.as_micros() as u64;

    if let Ok(val) = us.to_string().parse() {
        response.headers_mut().insert("x-response-time-us", val);
    }
    let server_timing = format!("total;dur={:.3}", elapsed.as_secs_f64() * 1000.0);
    if let Ok(val) = server_timing.parse() {
        response.headers_mut().insert("server-timing", val);
    }

    // The SSE stream would log once per connection lifetime, skip it
    if path.ends_with("/stream") {
        return response;
    }

    let status = response.status().as_u16();
    match status {
        500..=599 => tracing::warn!(%method, %path, status, us, "request failed"),
        _ => tracing::info!(%method, %path, status, us, "request"),
    }

    response
}
