//! Metrics collection and Prometheus export module.
//!
//! This module provides:
//! - Rate limiting for HTTP requests
//! - Authentication for metrics endpoints
//! - Prometheus metrics server setup
//! - Metrics recording functions for the download pipeline and the bot

use anyhow::Result;
use hyper::server::conn::http1;
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;

use crate::downloader::MediaKind;
use crate::observability::health_checks::ReadinessProbe;
use crate::observability_config::ObservabilityConfig;

/// Simple rate limiter for HTTP requests
#[derive(Debug)]
pub struct RateLimiter {
    requests: Mutex<HashMap<String, Vec<Instant>>>,
    max_requests: u32,
    window_secs: u64,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            requests: Mutex::new(HashMap::new()),
            max_requests,
            window_secs,
        }
    }

    /// Check if request is allowed for the given IP
    pub fn is_allowed(&self, ip: &str) -> bool {
        let now = Instant::now();
        let window = Duration::from_secs(self.window_secs);

        let mut requests = self.requests.lock();
        let client_requests = requests.entry(ip.to_string()).or_default();

        // Remove old requests outside the window
        client_requests.retain(|&time| now.duration_since(time) < window);

        if client_requests.len() >= self.max_requests as usize {
            return false;
        }

        client_requests.push(now);
        true
    }
}

/// Check the bearer token of a request; everything passes when no token is configured
pub fn check_auth<B>(req: &hyper::Request<B>, expected_token: Option<&str>) -> bool {
    let expected_token = match expected_token {
        Some(token) if !token.is_empty() => token,
        _ => return true,
    };

    req.headers()
        .get(hyper::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token == expected_token)
        .unwrap_or(false)
}

/// Check request size limit
pub fn check_request_size<B>(req: &hyper::Request<B>) -> bool {
    const MAX_REQUEST_SIZE: u64 = 1024 * 1024; // 1MB limit

    match req.headers().get(hyper::header::CONTENT_LENGTH) {
        Some(content_length) => content_length
            .to_str()
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(|size| size <= MAX_REQUEST_SIZE)
            .unwrap_or(false),
        None => true, // GET requests carry no body
    }
}

/// Initialize metrics collection with Prometheus exporter and configuration
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics_export,
        "Metrics collection initialized"
    );
    Ok(handle)
}

/// Everything the metrics server needs to answer a request
#[derive(Clone)]
pub struct MetricsServerContext {
    pub metrics_handle: PrometheusHandle,
    pub rate_limiter: Arc<RateLimiter>,
    pub auth_token: Option<String>,
    pub readiness: ReadinessProbe,
}

impl MetricsServerContext {
    pub fn new(
        metrics_handle: PrometheusHandle,
        auth_token: Option<String>,
        readiness: ReadinessProbe,
    ) -> Self {
        Self {
            metrics_handle,
            // 10 requests per minute per IP
            rate_limiter: Arc::new(RateLimiter::new(10, 60)),
            auth_token,
            readiness,
        }
    }
}

fn text_response(status: hyper::StatusCode, body: impl Into<String>) -> hyper::Response<String> {
    let mut response = hyper::Response::new(body.into());
    *response.status_mut() = status;
    response
}

/// Answer one request of the metrics and health server
pub async fn route_request<B>(
    req: &hyper::Request<B>,
    peer_ip: &str,
    ctx: &MetricsServerContext,
) -> hyper::Response<String> {
    if !ctx.rate_limiter.is_allowed(peer_ip) {
        return text_response(hyper::StatusCode::TOO_MANY_REQUESTS, "Rate limit exceeded");
    }

    if !check_request_size(req) {
        return text_response(hyper::StatusCode::PAYLOAD_TOO_LARGE, "Request too large");
    }

    if !check_auth(req, ctx.auth_token.as_deref()) {
        let mut response = text_response(hyper::StatusCode::UNAUTHORIZED, "Unauthorized");
        response.headers_mut().insert(
            hyper::header::WWW_AUTHENTICATE,
            hyper::header::HeaderValue::from_static("Bearer"),
        );
        return response;
    }

    match (req.method(), req.uri().path()) {
        (&hyper::Method::GET, "/metrics") => {
            let mut response = hyper::Response::new(ctx.metrics_handle.render());
            response.headers_mut().insert(
                hyper::header::CONTENT_TYPE,
                hyper::header::HeaderValue::from_static("text/plain; version=0.0.4; charset=utf-8"),
            );
            response
        }
        (&hyper::Method::GET, "/health/live") => text_response(hyper::StatusCode::OK, "OK"),
        (&hyper::Method::GET, "/health/ready") => {
            match ctx.readiness.perform_readiness_checks().await {
                Ok(()) => text_response(hyper::StatusCode::OK, "OK"),
                Err(e) => text_response(
                    hyper::StatusCode::SERVICE_UNAVAILABLE,
                    format!("NOT READY: {}", e),
                ),
            }
        }
        _ => text_response(hyper::StatusCode::NOT_FOUND, "Not Found"),
    }
}

/// Start the metrics server with health endpoints
pub async fn start_metrics_server(
    ctx: MetricsServerContext,
    port: u16,
    bind_all: bool,
) -> Result<tokio::task::JoinHandle<()>> {
    let addr = if bind_all {
        SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), port)
    } else {
        SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port) // localhost only
    };

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(address = %addr, bind_all = bind_all, "Metrics server listening");

    let handle = tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((stream, peer_addr)) => {
                    let ctx = ctx.clone();

                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let peer_ip = peer_addr.ip().to_string();

                        let service = hyper::service::service_fn(
                            move |req: hyper::Request<hyper::body::Incoming>| {
                                let ctx = ctx.clone();
                                let peer_ip = peer_ip.clone();
                                async move {
                                    let start = Instant::now();
                                    // Only the head is needed; no endpoint reads a body
                                    let (parts, _body) = req.into_parts();
                                    let req = hyper::Request::from_parts(parts, ());
                                    let response = route_request(&req, &peer_ip, &ctx).await;
                                    record_request_metrics(
                                        req.method().as_str(),
                                        response.status().as_u16(),
                                        start.elapsed(),
                                    );
                                    Ok::<_, std::convert::Infallible>(response)
                                }
                            },
                        );

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await
                        {
                            crate::errors::error_logging::log_network_error(
                                &err,
                                "serve_http_connection",
                                Some(&peer_addr.to_string()),
                                None,
                            );
                        }
                    });
                }
                Err(e) => {
                    crate::errors::error_logging::log_network_error(
                        &e,
                        "accept_tcp_connection",
                        Some(&addr.to_string()),
                        None,
                    );
                }
            }
        }
    });

    Ok(handle)
}

/// Parameters for download metrics recording
#[derive(Debug, Clone)]
pub struct DownloadMetricsParams {
    pub kind: MediaKind,
    /// `success` or the error label of the failure
    pub outcome: &'static str,
    pub duration: Duration,
    pub size_bytes: u64,
    pub attempt_count: u32,
}

/// Record the outcome of one download request
pub fn record_download_metrics(params: DownloadMetricsParams) {
    let kind = params.kind.as_str();
    metrics::counter!("downloads_total", "kind" => kind, "result" => params.outcome).increment(1);
    metrics::histogram!("download_duration_seconds", "kind" => kind)
        .record(params.duration.as_secs_f64());

    if params.outcome == "success" {
        metrics::histogram!("download_size_bytes", "kind" => kind).record(params.size_bytes as f64);
        metrics::histogram!("download_attempts", "kind" => kind).record(params.attempt_count as f64);
    } else {
        record_error_metrics(params.outcome, "downloader");
    }
}

/// Record a Telegram upload
pub fn record_upload_metrics(kind: MediaKind, method: &'static str, success: bool, duration: Duration) {
    metrics::counter!(
        "uploads_total",
        "kind" => kind.as_str(),
        "method" => method,
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    metrics::histogram!("upload_duration_seconds", "method" => method).record(duration.as_secs_f64());
}

/// Number of downloads currently running
pub fn record_active_downloads(count: usize) {
    metrics::gauge!("active_downloads").set(count as f64);
}

/// Record request metrics
pub fn record_request_metrics(method: &str, status: u16, duration: Duration) {
    let method = method.to_string();
    let status = status.to_string();
    metrics::counter!("requests_total", "method" => method, "status" => status).increment(1);
    metrics::histogram!("request_duration_seconds").record(duration.as_secs_f64());
}

/// Record health check metrics
pub fn record_health_check_metrics(check_type: &str, success: bool, duration: Duration) {
    let check_type = check_type.to_string();
    metrics::counter!(
        "health_checks_total",
        "type" => check_type.clone(),
        "result" => if success { "success" } else { "failure" }
    )
    .increment(1);
    metrics::histogram!("health_check_duration_seconds", "type" => check_type.clone())
        .record(duration.as_secs_f64());
    metrics::gauge!("health_check_status", "type" => check_type).set(if success { 1.0 } else { 0.0 });
}

/// Record error rate metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}

/// Record application startup metrics
pub fn record_startup_metrics(duration: Duration) {
    metrics::histogram!("application_startup_duration_seconds").record(duration.as_secs_f64());
    metrics::counter!("application_starts_total").increment(1);
}

/// Record application uptime
pub fn record_uptime(uptime_secs: f64) {
    metrics::gauge!("application_uptime_seconds").set(uptime_secs);
}

/// Update circuit breaker state metric
pub fn update_circuit_breaker_state(is_open: bool) {
    metrics::gauge!("circuit_breaker_state").set(if is_open { 1.0 } else { 0.0 });
}

/// Record Telegram message processing metrics
pub fn record_telegram_message(message_type: &str) {
    let message_type = message_type.to_string();
    metrics::counter!("telegram_messages_total", "type" => message_type).increment(1);
}

/// Record duplicate Telegram message detection
pub fn record_telegram_duplicate_message() {
    metrics::counter!("telegram_duplicate_messages_total").increment(1);
}

/// Record how long an update took to handle
pub fn record_telegram_performance_metrics(message_type: &str, processing_duration: Duration) {
    record_telegram_message(message_type);
    let message_type = message_type.to_string();
    metrics::histogram!("telegram_processing_duration_seconds", "type" => message_type)
        .record(processing_duration.as_secs_f64());
}
