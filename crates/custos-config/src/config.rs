//! Main configuration types.
//!
//! This module provides the top-level [`CustosConfig`] struct and its builder.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConfigError, LogFormat, PropertySnapshot, ScopesConfig, TelemetrySection};

/// Complete Custos configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load configuration from files
/// and environment variables.
///
/// # Example
///
/// ```
/// use custos_config::CustosConfig;
///
/// let config: CustosConfig = toml::from_str(r#"
///     [properties.datasource]
///     url = "postgres://localhost/orders"
///     pool_size = 8
/// "#).unwrap();
///
/// let snapshot = config.property_snapshot();
/// assert_eq!(snapshot.get("datasource.pool_size"), Some("8"));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct CustosConfig {
    /// Which scopes to register.
    #[serde(default)]
    pub scopes: ScopesConfig,

    /// Telemetry configuration (metrics, logging).
    #[serde(default)]
    pub telemetry: TelemetrySection,

    /// Application properties consumed by refreshable beans.
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl CustosConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> CustosConfigBuilder {
        CustosConfigBuilder::new()
    }

    /// Flattens [`properties`](Self::properties) into dotted keys.
    #[must_use]
    pub fn property_snapshot(&self) -> PropertySnapshot {
        PropertySnapshot::from_properties(&self.properties)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if:
    /// - Metrics are enabled with an invalid address
    /// - The log filter does not parse
    /// - File watching is enabled with a zero debounce window
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.telemetry.metrics.enabled
            && self
                .telemetry
                .metrics
                .addr
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(ConfigError::invalid_value(
                "telemetry.metrics.addr",
                format!("invalid socket address: {}", self.telemetry.metrics.addr),
            ));
        }

        if self.telemetry.logging.enabled {
            custos_telemetry::logging::create_env_filter(&self.telemetry.logging.level)
                .map_err(|e| ConfigError::invalid_value("telemetry.logging.level", e.to_string()))?;
        }

        if self.scopes.refresh.watch && self.scopes.refresh.debounce_ms == 0 {
            return Err(ConfigError::invalid_value(
                "scopes.refresh.debounce_ms",
                "must be greater than zero when watching",
            ));
        }

        Ok(())
    }

    /// Create a development configuration preset.
    ///
    /// Pretty debug logs with thread IDs, and file watching for the refresh
    /// scope.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "debug".to_string();
        config.telemetry.logging.format = LogFormat::Pretty;
        config.telemetry.logging.include_location = true;
        config.telemetry.logging.thread_ids = true;

        config.scopes.refresh.watch = true;

        config
    }

    /// Create a production configuration preset.
    ///
    /// JSON info logs and Prometheus metrics.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.telemetry.logging.level = "info".to_string();
        config.telemetry.logging.format = LogFormat::Json;
        config.telemetry.metrics.enabled = true;

        config
    }
}

/// Builder for [`CustosConfig`].
#[derive(Debug, Default)]
pub struct CustosConfigBuilder {
    scopes: Option<ScopesConfig>,
    telemetry: Option<TelemetrySection>,
    properties: Map<String, Value>,
}

impl CustosConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scopes configuration.
    #[must_use]
    pub fn scopes(mut self, scopes: ScopesConfig) -> Self {
        self.scopes = Some(scopes);
        self
    }

    /// Set the telemetry configuration.
    #[must_use]
    pub fn telemetry(mut self, telemetry: TelemetrySection) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Set a top-level property.
    #[must_use]
    pub fn property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Build the configuration.
    ///
    /// Any unset sections will use their default values.
    #[must_use]
    pub fn build(self) -> CustosConfig {
        CustosConfig {
            scopes: self.scopes.unwrap_or_default(),
            telemetry: self.telemetry.unwrap_or_default(),
            properties: self.properties,
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<CustosConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MetricsSection, RefreshScopeConfig};
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = CustosConfig::default();
        assert!(config.scopes.request.enabled);
        assert_eq!(config.telemetry.service_name, "custos");
        assert!(config.properties.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_properties() {
        let config = CustosConfig::builder()
            .property("feature", json!({ "enabled": true }))
            .property("region", "eu-west-1")
            .build();

        let snapshot = config.property_snapshot();
        assert_eq!(snapshot.get("feature.enabled"), Some("true"));
        assert_eq!(snapshot.get("region"), Some("eu-west-1"));
    }

    #[test]
    fn test_validate_invalid_metrics_addr() {
        let config = CustosConfig::builder()
            .telemetry(TelemetrySection {
                metrics: MetricsSection {
                    enabled: true,
                    addr: "invalid".to_string(),
                },
                ..Default::default()
            })
            .build();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("metrics.addr"));
    }

    #[test]
    fn test_validate_disabled_metrics_ignores_addr() {
        let config = CustosConfig::builder()
            .telemetry(TelemetrySection {
                metrics: MetricsSection {
                    enabled: false,
                    addr: "invalid".to_string(),
                },
                ..Default::default()
            })
            .build();

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = CustosConfig::default();
        config.telemetry.logging.level = "custos=loud".to_string();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("telemetry.logging.level"));
    }

    #[test]
    fn test_validate_zero_debounce_when_watching() {
        let result = CustosConfig::builder()
            .scopes(ScopesConfig {
                refresh: RefreshScopeConfig {
                    watch: true,
                    debounce_ms: 0,
                    ..Default::default()
                },
                ..Default::default()
            })
            .build_validated();

        assert!(result.unwrap_err().to_string().contains("debounce_ms"));
    }

    #[test]
    fn test_development_preset() {
        let config = CustosConfig::development();
        assert_eq!(config.telemetry.logging.level, "debug");
        assert_eq!(config.telemetry.logging.format, LogFormat::Pretty);
        assert!(config.telemetry.logging.thread_ids);
        assert!(config.scopes.refresh.watch);
    }

    #[test]
    fn test_production_preset() {
        let config = CustosConfig::production();
        assert_eq!(config.telemetry.logging.format, LogFormat::Json);
        assert!(config.telemetry.metrics.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_round_trip_sections() {
        let config = CustosConfig::default();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        assert!(toml_str.contains("[scopes.refresh]"));
        assert!(toml_str.contains("[telemetry]"));
    }

    #[test]
    fn test_unknown_section_rejected() {
        let toml_str = r#"
            [server]
            http_addr = "127.0.0.1:8000"
        "#;

        let result: Result<CustosConfig, _> = toml::from_str(toml_str);
        assert!(result.is_err());
    }

    #[test]
    fn test_properties_accept_free_form_tables() {
        let toml_str = r#"
            [properties]
            greeting = "hello"

            [properties.mail.smtp]
            host = "smtp.example.com"
            port = 587
        "#;

        let config: CustosConfig = toml::from_str(toml_str).unwrap();
        let snapshot = config.property_snapshot();
        assert_eq!(snapshot.get("mail.smtp.port"), Some("587"));
        assert_eq!(snapshot.len(), 3);
    }
}
