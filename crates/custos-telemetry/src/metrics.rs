//! Prometheus metrics for Custos scopes.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `custos_beans_created_total` | Counter | `scope` | Beans created on a cache miss |
//! | `custos_bean_creation_failures_total` | Counter | `scope` | Factory failures |
//! | `custos_bean_creation_duration_seconds` | Histogram | `scope` | Time spent in factories |
//! | `custos_beans_destroyed_total` | Counter | `scope` | Beans closed cleanly |
//! | `custos_bean_destruction_failures_total` | Counter | `scope` | Pre-destroy hook failures |
//! | `custos_scope_refreshes_total` | Counter | `scope` | Refresh events applied |
//!
//! Recording functions are cheap no-ops until a recorder is installed with
//! [`init_metrics`].

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::thread;
use std::time::Duration;
use tokio::runtime::{self, Handle};

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    ///
    /// `None` installs the recorder without an HTTP listener; metrics are
    /// then only available through [`render_metrics`].
    pub addr: Option<String>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: None,
        }
    }
}

/// Initializes the metrics subsystem.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` for an unparsable listener
/// address and `TelemetryError::MetricsInit` if a recorder is already
/// installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new();

    let handle = match &config.addr {
        Some(addr) => {
            let addr: SocketAddr = addr
                .parse()
                .map_err(|e| TelemetryError::InvalidAddress(format!("{addr}: {e}")))?;
            install_with_listener(builder.with_http_listener(addr))?
        }
        None => builder
            .install_recorder()
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?,
    };

    let _ = METRICS_HANDLE.set(handle);

    register_metric_descriptions();

    Ok(())
}

/// Installs the recorder and serves it over HTTP.
///
/// The exporter runs on the current Tokio runtime when there is one, and on
/// a dedicated single-threaded runtime otherwise.
fn install_with_listener(builder: PrometheusBuilder) -> TelemetryResult<PrometheusHandle> {
    let init_error = |e: &dyn std::fmt::Display| TelemetryError::MetricsInit(e.to_string());

    let recorder = if let Ok(runtime) = Handle::try_current() {
        let (recorder, exporter) = {
            let _entered = runtime.enter();
            builder.build().map_err(|e| init_error(&e))?
        };
        runtime.spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });
        recorder
    } else {
        let runtime = runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| init_error(&e))?;
        let (recorder, exporter) = {
            let _entered = runtime.enter();
            builder.build().map_err(|e| init_error(&e))?
        };
        thread::Builder::new()
            .name("custos-metrics".to_string())
            .spawn(move || {
                if runtime.block_on(exporter).is_err() {
                    tracing::error!("Metrics exporter stopped");
                }
            })
            .map_err(|e| init_error(&e))?;
        recorder
    };

    let handle = recorder.handle();
    metrics::set_global_recorder(recorder).map_err(|e| init_error(&e))?;
    Ok(handle)
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!(
        "custos_beans_created_total",
        "Total number of beans created by custom scopes"
    );
    describe_counter!(
        "custos_bean_creation_failures_total",
        "Total number of bean factory failures"
    );
    describe_histogram!(
        "custos_bean_creation_duration_seconds",
        "Time spent creating beans in seconds"
    );
    describe_counter!(
        "custos_beans_destroyed_total",
        "Total number of beans destroyed cleanly"
    );
    describe_counter!(
        "custos_bean_destruction_failures_total",
        "Total number of failed bean destructions"
    );
    describe_counter!(
        "custos_scope_refreshes_total",
        "Total number of refresh events applied to a scope"
    );
}

/// Records a successful bean creation.
pub fn record_bean_created(scope: &str, duration: Duration) {
    counter!("custos_beans_created_total", "scope" => scope.to_string()).increment(1);
    histogram!(
        "custos_bean_creation_duration_seconds",
        "scope" => scope.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Records a failed bean creation.
pub fn record_bean_creation_failure(scope: &str) {
    counter!("custos_bean_creation_failures_total", "scope" => scope.to_string()).increment(1);
}

/// Records a bean destroyed without error.
pub fn record_bean_destroyed(scope: &str) {
    counter!("custos_beans_destroyed_total", "scope" => scope.to_string()).increment(1);
}

/// Records a bean whose pre-destroy hook failed.
pub fn record_bean_destruction_failure(scope: &str) {
    counter!("custos_bean_destruction_failures_total", "scope" => scope.to_string())
        .increment(1);
}

/// Records a refresh event applied to a scope.
pub fn record_scope_refresh(scope: &str) {
    counter!("custos_scope_refreshes_total", "scope" => scope.to_string()).increment(1);
}
