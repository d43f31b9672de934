//! Metrics module
//!
//! Prometheus metrics for uploads, JSON decoding and the HTTP routes.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram, Counter, CounterVec, Encoder,
    Histogram, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADED_FILES_TOTAL: CounterVec = register_counter_vec!(
        "handler_kit_uploaded_files_total",
        "Files handled by the upload operations",
        &["status"]  // "stored", "rejected" or "failed"
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "handler_kit_upload_bytes_total",
        "Total bytes written to upload directories"
    ).unwrap();

    pub static ref UPLOAD_DURATION: Histogram = register_histogram!(
        "handler_kit_upload_duration_seconds",
        "Duration of one upload call in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // JSON metrics
    pub static ref JSON_DECODE_ERRORS: CounterVec = register_counter_vec!(
        "handler_kit_json_decode_errors_total",
        "JSON request bodies that failed to decode",
        &["kind"]
    ).unwrap();

    // HTTP metrics
    pub static ref HTTP_REQUESTS_TOTAL: CounterVec = register_counter_vec!(
        "handler_kit_http_requests_total",
        "HTTP requests served",
        &["route", "status"]
    ).unwrap();
}

/// Record a file written to disk
pub fn record_file_stored(bytes: u64) {
    UPLOADED_FILES_TOTAL.with_label_values(&["stored"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a file refused because of its sniffed type
pub fn record_file_rejected() {
    UPLOADED_FILES_TOTAL.with_label_values(&["rejected"]).inc();
}

/// Record a file that failed for any other reason
pub fn record_file_failed() {
    UPLOADED_FILES_TOTAL.with_label_values(&["failed"]).inc();
}

/// Record upload call duration
pub fn record_upload_duration(duration_secs: f64) {
    UPLOAD_DURATION.observe(duration_secs);
}

/// Record a JSON decode failure
pub fn record_json_error(kind: &str) {
    JSON_DECODE_ERRORS.with_label_values(&[kind]).inc();
}

/// Record a served HTTP request
pub fn record_http_request(route: &str, status: u16) {
    let status = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route, status.as_str()])
        .inc();
}

/// Encode every registered metric in the Prometheus text format.
///
/// Returns the encoded buffer and its content type.
pub fn encode() -> Result<(Vec<u8>, String), prometheus::Error> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    Ok((buffer, encoder.format_type().to_string()))
}
