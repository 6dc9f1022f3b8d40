//! Configuration schema types.
//!
//! This module defines the structure of all configuration sections.

use serde::{Deserialize, Serialize};

/// Which built-in scopes to register.
///
/// # Example
///
/// ```
/// use custos_config::ScopesConfig;
///
/// let scopes: ScopesConfig = toml::from_str(r#"
///     [request]
///     enabled = false
/// "#).unwrap();
///
/// assert!(!scopes.request.enabled);
/// assert!(scopes.refresh.enabled);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct ScopesConfig {
    /// Refreshable scope settings.
    #[serde(default)]
    pub refresh: RefreshScopeConfig,

    /// Thread-local scope settings.
    #[serde(default)]
    pub thread_local: ScopeToggle,

    /// Request scope settings.
    #[serde(default)]
    pub request: ScopeToggle,
}

/// Enables or disables a scope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ScopeToggle {
    /// Register the scope.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for ScopeToggle {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Refreshable scope settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RefreshScopeConfig {
    /// Register the scope.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Reload properties when the configuration file changes.
    #[serde(default)]
    pub watch: bool,

    /// Debounce window for file change events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

impl Default for RefreshScopeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            watch: false,
            debounce_ms: default_debounce_ms(),
        }
    }
}

fn default_debounce_ms() -> u64 {
    500
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Enable metrics collection and export.
    #[serde(default)]
    pub enabled: bool,

    /// Prometheus metrics endpoint address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

/// Log format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON formatted logs (production).
    #[default]
    Json,
    /// Human-readable pretty format (development).
    Pretty,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Log filter (e.g. "info", "custos_scope=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include source file and line in logs.
    #[serde(default)]
    pub include_location: bool,

    /// Include the emitting thread's ID.
    #[serde(default)]
    pub thread_ids: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
            thread_ids: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Telemetry configuration section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct TelemetrySection {
    /// Service name reported at startup.
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,
}

impl Default for TelemetrySection {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            metrics: MetricsSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

impl TelemetrySection {
    /// Converts this section into the telemetry crate's configuration.
    #[must_use]
    pub fn to_telemetry_config(&self) -> custos_telemetry::TelemetryConfig {
        let logging = custos_telemetry::LogConfig {
            enabled: self.logging.enabled,
            level: self.logging.level.clone(),
            json_format: self.logging.format == LogFormat::Json,
            span_events: false,
            file_line_info: self.logging.include_location,
            thread_ids: self.logging.thread_ids,
            include_target: true,
        };
        let metrics = custos_telemetry::MetricsConfig {
            enabled: self.metrics.enabled,
            addr: Some(self.metrics.addr.clone()),
        };

        custos_telemetry::TelemetryConfig::builder()
            .service_name(&self.service_name)
            .logging(logging)
            .metrics(metrics)
            .build()
    }
}

fn default_service_name() -> String {
    "custos".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scopes_default_all_enabled() {
        let config = ScopesConfig::default();
        assert!(config.refresh.enabled);
        assert!(config.thread_local.enabled);
        assert!(config.request.enabled);
        assert!(!config.refresh.watch);
        assert_eq!(config.refresh.debounce_ms, 500);
    }

    #[test]
    fn test_scopes_unknown_field_rejected() {
        let toml = r#"
            [session]
            enabled = true
        "#;
        let result: Result<ScopesConfig, _> = toml::from_str(toml);
        assert!(result.is_err());
    }

    #[test]
    fn test_metrics_default_disabled() {
        let config = MetricsSection::default();
        assert!(!config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_log_format_deserialize() {
        let format: LogFormat = serde_json::from_str(r#""pretty""#).unwrap();
        assert_eq!(format, LogFormat::Pretty);
        assert!(serde_json::from_str::<LogFormat>(r#""xml""#).is_err());
    }

    #[test]
    fn test_to_telemetry_config() {
        let section = TelemetrySection {
            service_name: "orders".to_string(),
            metrics: MetricsSection {
                enabled: true,
                addr: "127.0.0.1:9100".to_string(),
            },
            logging: LoggingSection {
                format: LogFormat::Pretty,
                thread_ids: true,
                ..Default::default()
            },
        };

        let config = section.to_telemetry_config();
        assert_eq!(config.service_name, "orders");
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.addr.as_deref(), Some("127.0.0.1:9100"));
        assert!(!config.logging.json_format);
        assert!(config.logging.thread_ids);
    }
}
