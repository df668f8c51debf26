//! Prometheus metrics for HTTP requests and GC passes
//!
//! The recorder is installed once per process. Recording before installation
//! is harmless: the `metrics` macros fall back to a no-op recorder.

use actix_web::{web, App, HttpResponse, HttpServer};
use log::info;
use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

use crate::service::gc_worker::{GcOutcome, GcReport};

pub const HTTP_REQUESTS_TOTAL: &str = "restfs_http_requests_total";
pub const HTTP_REQUEST_DURATION: &str = "restfs_http_request_duration_seconds";
pub const HTTP_REQUEST_SIZE: &str = "restfs_http_request_size_bytes";
pub const HTTP_RESPONSE_SIZE: &str = "restfs_http_response_size_bytes";

pub const GC_RUNS_TOTAL: &str = "restfs_gc_runs_total";
pub const GC_DURATION: &str = "restfs_gc_duration_seconds";
pub const GC_TOMBSTONES_RESOLVED: &str = "restfs_gc_tombstones_resolved_total";

/// Body bytes a handler actually consumed. Stored in request extensions so
/// chunked uploads are measured without a Content-Length header.
#[derive(Debug, Clone, Copy)]
pub struct RequestBodySize(pub u64);

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Installs the Prometheus recorder. Later calls return the same handle.
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    if let Some(handle) = PROMETHEUS_HANDLE.get() {
        return Ok(handle.clone());
    }
    let handle = PrometheusBuilder::new().install_recorder()?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests made.");
    describe_histogram!(HTTP_REQUEST_DURATION, Unit::Seconds, "The HTTP request latencies in seconds.");
    describe_histogram!(HTTP_REQUEST_SIZE, Unit::Bytes, "The HTTP request sizes in bytes.");
    describe_histogram!(HTTP_RESPONSE_SIZE, Unit::Bytes, "The HTTP response sizes in bytes.");
    describe_counter!(GC_RUNS_TOTAL, "GC passes by outcome.");
    describe_histogram!(GC_DURATION, Unit::Seconds, "GC pass duration in seconds.");
    describe_counter!(GC_TOMBSTONES_RESOLVED, "Tombstones resolved by GC, by resolution.");

    Ok(PROMETHEUS_HANDLE.get_or_init(|| handle).clone())
}

/// Label value for an HTTP method: `GET` is recorded as `get`
pub fn method_label(method: &str) -> String {
    method.to_ascii_lowercase()
}

pub fn record_request(method: &str, code: u16, elapsed: Duration, request_size: u64, response_size: u64) {
    let method = method_label(method);
    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "code" => code.to_string()).increment(1);
    histogram!(HTTP_REQUEST_DURATION, "method" => method.clone()).record(elapsed.as_secs_f64());
    histogram!(HTTP_REQUEST_SIZE, "method" => method.clone()).record(request_size as f64);
    histogram!(HTTP_RESPONSE_SIZE, "method" => method).record(response_size as f64);
}

pub fn record_gc(report: &GcReport) {
    histogram!(GC_DURATION).record(report.elapsed.as_secs_f64());
    match &report.outcome {
        GcOutcome::Finished(summary) => {
            counter!(GC_RUNS_TOTAL, "outcome" => "finished").increment(1);
            counter!(GC_TOMBSTONES_RESOLVED, "resolution" => "confirmed").increment(summary.confirmed);
            counter!(GC_TOMBSTONES_RESOLVED, "resolution" => "resurrected").increment(summary.resurrected);
            counter!(GC_TOMBSTONES_RESOLVED, "resolution" => "orphaned").increment(summary.orphaned);
        }
        GcOutcome::Aborted(_) => {
            counter!(GC_RUNS_TOTAL, "outcome" => "aborted").increment(1);
        }
    }
}

async fn render_metrics(handle: web::Data<PrometheusHandle>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(handle.render())
}

/// Builds the standalone exporter server. The caller spawns the returned future.
pub fn metrics_server(listen: &str, handle: PrometheusHandle) -> std::io::Result<actix_web::dev::Server> {
    info!("Prometheus stats enabled at {}", listen);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(handle.clone()))
            .route("/metrics", web::get().to(render_metrics))
    })
    .workers(1)
    .bind(listen)?
    .run();
    Ok(server)
}
