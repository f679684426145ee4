//! # Observability Configuration
//!
//! Environment-specific configuration for logging, tracing and metrics export.

use crate::errors::{AppError, AppResult};

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

/// Observability configuration for different environments
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Environment name (development, staging, production)
    pub environment: String,
    /// OTLP endpoint for trace export
    pub otlp_endpoint: Option<String>,
    /// Log level for this crate
    pub log_level: String,
    /// Explicit log format; `None` picks pretty in development and JSON elsewhere
    pub log_format: Option<LogFormat>,
    /// Whether to enable trace sampling
    pub enable_trace_sampling: bool,
    /// Trace sampling ratio (0.0-1.0)
    pub trace_sampling_ratio: f64,
    /// Whether to serve the Prometheus endpoint
    pub enable_metrics_export: bool,
    /// Bearer token required on the metrics and health endpoints
    pub metrics_auth_token: Option<String>,
    /// Additional tags attached to traces
    pub tags: Vec<(String, String)>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            otlp_endpoint: None,
            log_level: "info".to_string(),
            log_format: None,
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
            enable_metrics_export: true,
            metrics_auth_token: None,
            tags: Vec::new(),
        }
    }
}

impl ObservabilityConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    ///
    /// Unparsable values fall back to the defaults; `validate` catches the rest.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let mut config = Self {
            environment: non_empty("ENVIRONMENT").unwrap_or(defaults.environment),
            otlp_endpoint: non_empty("OTLP_ENDPOINT"),
            log_level: non_empty("OBSERVABILITY_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_format: non_empty("LOG_FORMAT").and_then(|v| parse_log_format(&v)),
            enable_trace_sampling: non_empty("ENABLE_TRACE_SAMPLING")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_trace_sampling),
            trace_sampling_ratio: non_empty("TRACE_SAMPLING_RATIO")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.trace_sampling_ratio),
            enable_metrics_export: non_empty("ENABLE_METRICS_EXPORT")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.enable_metrics_export),
            metrics_auth_token: non_empty("METRICS_AUTH_TOKEN"),
            tags: non_empty("OBSERVABILITY_TAGS")
                .map(|v| parse_tags(&v))
                .unwrap_or_default(),
        };
        config.add_default_tags(lookup("HOSTNAME"));
        config
    }

    fn add_default_tags(&mut self, hostname: Option<String>) {
        self.tags.push(("environment".to_string(), self.environment.clone()));
        self.tags.push(("service".to_string(), "media-relay-bot".to_string()));
        self.tags.push((
            "version".to_string(),
            env!("CARGO_PKG_VERSION").to_string(),
        ));
        if let Some(hostname) = hostname {
            self.tags.push(("hostname".to_string(), hostname));
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }

    /// Log format after applying the environment default
    pub fn effective_log_format(&self) -> LogFormat {
        self.log_format.unwrap_or(if self.is_development() {
            LogFormat::Pretty
        } else {
            LogFormat::Json
        })
    }

    /// Sampling ratio actually applied to new traces
    pub fn effective_sampling_ratio(&self) -> f64 {
        if self.enable_trace_sampling {
            self.trace_sampling_ratio
        } else {
            1.0
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> AppResult<()> {
        if let Some(endpoint) = &self.otlp_endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(AppError::Config(format!(
                    "Invalid OTLP endpoint format: {}",
                    endpoint
                )));
            }
        }

        if !(0.0..=1.0).contains(&self.trace_sampling_ratio) {
            return Err(AppError::Config(format!(
                "Invalid trace sampling ratio: {}",
                self.trace_sampling_ratio
            )));
        }

        if !matches!(
            self.log_level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        ) {
            return Err(AppError::Config(format!(
                "Invalid log level: {}",
                self.log_level
            )));
        }

        Ok(())
    }
}

fn parse_log_format(value: &str) -> Option<LogFormat> {
    match value.trim().to_lowercase().as_str() {
        "json" => Some(LogFormat::Json),
        "pretty" | "text" => Some(LogFormat::Pretty),
        _ => None,
    }
}

/// Parse tags from environment variable string
/// Format: "key1=value1,key2=value2,key3=value3"
fn parse_tags(tags_str: &str) -> Vec<(String, String)> {
    tags_str
        .split(',')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let key = key.trim();
            (!key.is_empty()).then(|| (key.to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Environment-specific configuration presets
pub mod presets {
    use super::ObservabilityConfig;

    /// Development configuration with full observability
    pub fn development() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "development".to_string(),
            enable_trace_sampling: false,
            trace_sampling_ratio: 1.0,
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Production configuration with sampled traces
    pub fn production() -> ObservabilityConfig {
        ObservabilityConfig {
            environment: "production".to_string(),
            enable_trace_sampling: true,
            trace_sampling_ratio: 0.1,
            log_level: "info".to_string(),
            ..Default::default()
        }
    }
}
