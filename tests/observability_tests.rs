//! # Observability Tests Module
//!
//! Tests for the metrics and health server routing, the metric recorders and the
//! observability configuration.

#[cfg(test)]
mod tests {
    use hyper::{Request, StatusCode};
    use media_relay_bot::downloader::MediaKind;
    use media_relay_bot::observability::{
        self, route_request, DownloadMetricsParams, MetricsServerContext, ReadinessProbe,
    };
    use media_relay_bot::observability_config::{presets, LogFormat, ObservabilityConfig};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use std::time::Duration;

    const TOKEN: &str = "123456789:AAFakeTokenForTestingPurposes1234567890";

    fn context(auth_token: Option<&str>, ytdlp_path: &str) -> MetricsServerContext {
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let readiness = ReadinessProbe::new(
            ytdlp_path.to_string(),
            Some(TOKEN.to_string()),
            Some(std::env::temp_dir()),
        );
        MetricsServerContext::new(handle, auth_token.map(str::to_string), readiness)
    }

    fn get(path: &str) -> Request<()> {
        Request::builder().uri(path).body(()).expect("valid request")
    }

    #[tokio::test]
    async fn test_liveness_endpoint() {
        let ctx = context(None, "/nonexistent/yt-dlp");

        let response = route_request(&get("/health/live"), "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), "OK");
    }

    #[tokio::test]
    async fn test_metrics_endpoint_content_type() {
        let ctx = context(None, "/nonexistent/yt-dlp");

        let response = route_request(&get("/metrics"), "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response
            .headers()
            .get(hyper::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(content_type.starts_with("text/plain"));
    }

    #[tokio::test]
    async fn test_readiness_fails_without_ytdlp() {
        let ctx = context(None, "/nonexistent/yt-dlp");

        let response = route_request(&get("/health/ready"), "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(response.body().starts_with("NOT READY"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_readiness_passes_with_working_dependencies() {
        use std::os::unix::fs::PermissionsExt;

        let scripts = tempfile::TempDir::new().expect("script dir");
        let script = scripts.path().join("yt-dlp");
        std::fs::write(&script, "#!/bin/sh\necho 2025.10.22\n").expect("write script");
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).expect("chmod");

        let ctx = context(None, &script.to_string_lossy());
        let response = route_request(&get("/health/ready"), "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::OK, "body: {}", response.body());
    }

    #[tokio::test]
    async fn test_unknown_path_is_not_found() {
        let ctx = context(None, "/nonexistent/yt-dlp");

        let response = route_request(&get("/admin"), "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_bearer_auth_required_when_configured() {
        let ctx = context(Some("s3cret"), "/nonexistent/yt-dlp");

        let anonymous = route_request(&get("/metrics"), "10.0.0.1", &ctx).await;
        assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
        assert!(anonymous.headers().contains_key(hyper::header::WWW_AUTHENTICATE));

        let authorized = Request::builder()
            .uri("/metrics")
            .header("authorization", "Bearer s3cret")
            .body(())
            .expect("valid request");
        let response = route_request(&authorized, "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_rate_limit_per_ip() {
        let ctx = context(None, "/nonexistent/yt-dlp");

        for _ in 0..10 {
            let response = route_request(&get("/health/live"), "10.0.0.9", &ctx).await;
            assert_eq!(response.status(), StatusCode::OK);
        }
        let limited = route_request(&get("/health/live"), "10.0.0.9", &ctx).await;
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        // Other clients are unaffected
        let other = route_request(&get("/health/live"), "10.0.0.10", &ctx).await;
        assert_eq!(other.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_oversized_request_rejected() {
        let ctx = context(None, "/nonexistent/yt-dlp");
        let request = Request::builder()
            .uri("/metrics")
            .header("content-length", "4194304")
            .body(())
            .expect("valid request");

        let response = route_request(&request, "10.0.0.1", &ctx).await;
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    /// The recorders must be callable without an installed recorder
    #[test]
    fn test_metrics_recording_without_recorder() {
        observability::record_telegram_message("url");
        observability::record_telegram_duplicate_message();
        observability::record_telegram_performance_metrics("command", Duration::from_millis(12));
        observability::record_download_metrics(DownloadMetricsParams {
            kind: MediaKind::Video,
            outcome: "success",
            duration: Duration::from_secs(3),
            size_bytes: 1024,
            attempt_count: 1,
        });
        observability::record_download_metrics(DownloadMetricsParams {
            kind: MediaKind::Audio,
            outcome: "timeout",
            duration: Duration::from_secs(300),
            size_bytes: 0,
            attempt_count: 0,
        });
        observability::record_upload_metrics(MediaKind::Audio, "send_audio", true, Duration::from_secs(1));
        observability::record_active_downloads(2);
        observability::update_circuit_breaker_state(false);
        observability::record_health_check_metrics("ytdlp", true, Duration::from_millis(40));
        observability::record_error_metrics("handler_error", "telegram");
        observability::record_uptime(12.5);
    }

    #[test]
    fn test_spans_carry_operation() {
        let span = observability::download_span("download", "video");
        let _ = span.enter();
        let span = observability::telegram_span("message_handler", Some(42));
        let _ = span.enter();
    }

    #[test]
    fn test_observability_config_presets() {
        let development = presets::development();
        assert!(development.is_development());
        assert_eq!(development.effective_log_format(), LogFormat::Pretty);
        assert!(development.validate().is_ok());

        let production = presets::production();
        assert!(production.is_production());
        assert_eq!(production.effective_log_format(), LogFormat::Json);
        assert!(production.validate().is_ok());
    }

    #[test]
    fn test_observability_config_from_lookup() {
        let config = ObservabilityConfig::from_lookup(|name| match name {
            "ENVIRONMENT" => Some("staging".to_string()),
            "LOG_FORMAT" => Some("pretty".to_string()),
            "OBSERVABILITY_LOG_LEVEL" => Some("debug".to_string()),
            _ => None,
        });

        assert_eq!(config.environment, "staging");
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.effective_log_format(), LogFormat::Pretty);
        assert!(config.otlp_endpoint.is_none());
    }
}
