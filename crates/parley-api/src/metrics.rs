//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Install the Prometheus recorder and return the render handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "parley_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "parley_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "parley_http_requests_in_flight";

    // Stream proxy metrics
    pub const WS_CONNECTIONS_TOTAL: &str = "parley_ws_connections_total";
    pub const WS_CONNECTIONS_ACTIVE: &str = "parley_ws_connections_active";
    pub const STREAM_MESSAGES_TOTAL: &str = "parley_stream_messages_total";

    // Video job metrics
    pub const VIDEO_JOBS_STARTED_TOTAL: &str = "parley_video_jobs_started_total";
    pub const VIDEO_JOBS_FINISHED_TOTAL: &str = "parley_video_jobs_finished_total";
    pub const VIDEO_JOB_DURATION_SECONDS: &str = "parley_video_job_duration_seconds";

    // Media cache
    pub const CACHE_LOOKUPS_TOTAL: &str = "parley_media_cache_lookups_total";

    // Rate limiting metrics
    pub const RATE_LIMIT_HITS_TOTAL: &str = "parley_rate_limit_hits_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", route_label(path).to_string()),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a stream proxy connection.
pub fn record_ws_connection() {
    counter!(names::WS_CONNECTIONS_TOTAL).increment(1);
}

/// Update active stream connections gauge.
pub fn set_ws_active_connections(count: i64) {
    gauge!(names::WS_CONNECTIONS_ACTIVE).set(count as f64);
}

/// Record a proxied stream message. `direction` is `upstream` or `downstream`.
pub fn record_stream_message(direction: &'static str, kind: &'static str) {
    counter!(names::STREAM_MESSAGES_TOTAL, "direction" => direction, "type" => kind).increment(1);
}

/// Record a video job accepted by the start action.
pub fn record_video_job_started() {
    counter!(names::VIDEO_JOBS_STARTED_TOTAL).increment(1);
}

/// Record a terminal video job. `outcome` is `completed`, `failed` or `timed_out`.
pub fn record_video_job_finished(outcome: &'static str, duration_secs: f64) {
    counter!(names::VIDEO_JOBS_FINISHED_TOTAL, "outcome" => outcome).increment(1);
    histogram!(names::VIDEO_JOB_DURATION_SECONDS, "outcome" => outcome).record(duration_secs);
}

/// Record a media cache read.
pub fn record_cache_lookup(kind: &'static str, hit: bool) {
    let result = if hit { "hit" } else { "miss" };
    counter!(names::CACHE_LOOKUPS_TOTAL, "kind" => kind, "result" => result).increment(1);
}

/// Record rate limit hit.
pub fn record_rate_limit_hit(endpoint: &str) {
    let labels = [("endpoint", route_label(endpoint).to_string())];
    counter!(names::RATE_LIMIT_HITS_TOTAL, &labels).increment(1);
}

/// Collapse request paths onto the known routes so labels stay bounded.
fn route_label(path: &str) -> &'static str {
    match path.trim_end_matches('/') {
        "/functions/v1/ditto-generate-video" => "/functions/v1/ditto-generate-video",
        "/functions/v1/media-cache" => "/functions/v1/media-cache",
        "/functions/v1/ditto-stream" => "/functions/v1/ditto-stream",
        "/health" => "/health",
        "/ready" => "/ready",
        "/metrics" => "/metrics",
        _ => "other",
    }
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    record_http_request(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}
