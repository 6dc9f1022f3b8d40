//! Typed configuration for Custos.
//!
//! - TOML and JSON configuration files
//! - `.env` files and `CUSTOS__…` environment overrides
//! - Strict validation (fails on unknown fields)
//! - Flattened [`PropertySnapshot`]s for refresh diffing
//! - A debounced [`FileWatcher`] for reload
//!
//! # Configuration File Format
//!
//! ```toml
//! [scopes.refresh]
//! enabled = true
//! watch = true
//! debounce_ms = 500
//!
//! [scopes.thread_local]
//! enabled = true
//!
//! [scopes.request]
//! enabled = true
//!
//! [telemetry]
//! service_name = "orders"
//!
//! [telemetry.metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//!
//! [telemetry.logging]
//! level = "info"
//! format = "json"
//!
//! [properties.datasource]
//! url = "postgres://localhost/orders"
//! pool_size = 8
//! ```
//!
//! # Environment Variable Overrides
//!
//! - `CUSTOS__SCOPES__REQUEST__ENABLED=false`
//! - `CUSTOS__TELEMETRY__METRICS__ENABLED=true`
//! - `CUSTOS__PROPERTIES__DATASOURCE__URL=postgres://db/orders`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod properties;
mod schema;
mod watcher;

pub use config::{CustosConfig, CustosConfigBuilder};
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use properties::PropertySnapshot;
pub use schema::{
    LogFormat, LoggingSection, MetricsSection, RefreshScopeConfig, ScopeToggle, ScopesConfig,
    TelemetrySection,
};
pub use watcher::{FileChangeEvent, FileChangeKind, FileWatcher, FileWatcherBuilder, FileWatcherConfig};
