//! Application-level wiring of scopes, configuration and refresh.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use custos_config::{
    ConfigError, ConfigLoader, CustosConfig, FileChangeKind, FileWatcher, PropertySnapshot,
};
use custos_core::{
    BeanCreationContext, BeanInstance, CustomScopeExt, ScopeRegistry, ScopeResult, ScopeTag,
};
use custos_scope::{
    RefreshEvent, RefreshScope, RequestBinding, RequestScope, ThreadBoundRequests,
    ThreadLocalScope,
};
use parking_lot::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// What a property update changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefreshOutcome {
    /// Dotted property keys that were added, removed or changed.
    pub changed_keys: Vec<String>,
    /// Number of refreshable beans destroyed.
    pub destroyed: usize,
}

/// The scopes of an application plus the configuration driving them.
///
/// # Example
///
/// ```
/// use custos::{ScopeContext, ThreadBoundRequests};
/// use custos_config::CustosConfig;
/// use custos_core::{FactoryContext, ScopeTag};
///
/// let scopes = ScopeContext::from_config(&CustosConfig::default(), ThreadBoundRequests::new());
/// let context = FactoryContext::new("clock", || Ok::<_, std::io::Error>(42_u64));
///
/// let bean = scopes.get_or_create(ScopeTag::REFRESHABLE, &context).unwrap();
/// assert_eq!(bean.downcast_ref::<u64>(), Some(&42));
///
/// scopes.shutdown();
/// ```
pub struct ScopeContext<B: RequestBinding = ThreadBoundRequests> {
    registry: ScopeRegistry,
    refresh: Option<Arc<RefreshScope>>,
    thread_local: Option<Arc<ThreadLocalScope>>,
    request: Option<Arc<RequestScope<B>>>,
    properties: RwLock<PropertySnapshot>,
    reload: ConfigLoader,
    watch: bool,
    debounce: Duration,
}

impl<B: RequestBinding> ScopeContext<B> {
    /// Registers the scopes enabled in `config`.
    ///
    /// The request scope resolves the current request through `binding`.
    pub fn from_config(config: &CustosConfig, binding: B) -> Self {
        let mut registry = ScopeRegistry::new();

        let refresh = config.scopes.refresh.enabled.then(|| {
            let scope = Arc::new(RefreshScope::refreshable());
            registry.register(scope.clone());
            scope
        });

        let thread_local = config.scopes.thread_local.enabled.then(|| {
            let scope = Arc::new(ThreadLocalScope::thread_local());
            registry.register(scope.clone());
            scope
        });

        let request = if config.scopes.request.enabled {
            let scope = Arc::new(RequestScope::<B>::request(binding));
            registry.register(scope.clone());
            Some(scope)
        } else {
            None
        };

        info!(
            scopes = ?registry.tags().collect::<Vec<_>>(),
            "Scope context initialized"
        );

        Self {
            registry,
            refresh,
            thread_local,
            request,
            properties: RwLock::new(config.property_snapshot()),
            reload: ConfigLoader::new(),
            watch: config.scopes.refresh.watch,
            debounce: Duration::from_millis(config.scopes.refresh.debounce_ms),
        }
    }

    /// Loads the configuration with `loader` and registers its scopes.
    ///
    /// Reloads go through the same loader, so environment overrides keep
    /// applying on top of the reloaded file.
    pub fn from_loader(loader: ConfigLoader, binding: B) -> Result<Self, ConfigError> {
        let config = loader.clone().load()?;
        Ok(Self::from_config(&config, binding).reload_with(loader))
    }

    /// Uses `loader` as the base of every reload.
    ///
    /// The reloaded file replaces the loader's file layer; its environment
    /// prefix still applies.
    #[must_use]
    pub fn reload_with(mut self, loader: ConfigLoader) -> Self {
        self.reload = loader;
        self
    }

    /// Returns the scope registry.
    pub fn registry(&self) -> &ScopeRegistry {
        &self.registry
    }

    /// Returns the refreshable scope, if enabled.
    pub fn refresh_scope(&self) -> Option<&Arc<RefreshScope>> {
        self.refresh.as_ref()
    }

    /// Returns the thread-local scope, if enabled.
    pub fn thread_local_scope(&self) -> Option<&Arc<ThreadLocalScope>> {
        self.thread_local.as_ref()
    }

    /// Returns the request scope, if enabled.
    pub fn request_scope(&self) -> Option<&Arc<RequestScope<B>>> {
        self.request.as_ref()
    }

    /// Gets or creates a bean in the scope registered under `tag`.
    pub fn get_or_create(
        &self,
        tag: ScopeTag,
        context: &dyn BeanCreationContext,
    ) -> ScopeResult<BeanInstance> {
        self.registry.get_or_create(tag, context)
    }

    /// Like [`get_or_create`](Self::get_or_create), downcasting to `T`.
    pub fn get_or_create_typed<T: std::any::Any + Send + Sync>(
        &self,
        tag: ScopeTag,
        context: &dyn BeanCreationContext,
    ) -> ScopeResult<Arc<T>> {
        self.registry.require(tag)?.get_or_create_typed(context)
    }

    /// Returns the current property snapshot.
    pub fn properties(&self) -> PropertySnapshot {
        self.properties.read().clone()
    }

    /// Replaces the property snapshot and refreshes beans depending on the
    /// keys that changed.
    pub fn apply_properties(&self, updated: PropertySnapshot) -> RefreshOutcome {
        let changed_keys = {
            let mut current = self.properties.write();
            let changed = current.diff(&updated);
            *current = updated;
            changed
        };

        if changed_keys.is_empty() {
            debug!("Properties unchanged");
            return RefreshOutcome::default();
        }

        let destroyed = self.refresh.as_ref().map_or(0, |scope| {
            scope.refresh(&RefreshEvent::Keys(changed_keys.clone()))
        });

        info!(
            changed = changed_keys.len(),
            destroyed, "Applied property changes"
        );
        RefreshOutcome {
            changed_keys,
            destroyed,
        }
    }

    /// Re-reads the configuration file at `path` and applies its properties.
    ///
    /// Scope toggles and telemetry settings are not re-applied.
    pub fn reload_from(&self, path: impl AsRef<Path>) -> Result<RefreshOutcome, ConfigError> {
        let config = self.reload.clone().with_file(path)?.load()?;
        Ok(self.apply_properties(config.property_snapshot()))
    }

    /// Reloads properties whenever the file at `path` changes.
    ///
    /// Runs until the watcher shuts down. Reload failures are logged and the
    /// previous properties stay in effect.
    pub async fn watch_config(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let mut watcher = FileWatcher::builder()
            .with_debounce(self.debounce)
            .watch_path(path)
            .and_then(custos_config::FileWatcherBuilder::build)
            .with_context(|| format!("failed to watch {}", path.display()))?;

        info!(path = %path.display(), "Watching configuration for changes");

        while let Some(event) = watcher.next().await {
            if event.kind == FileChangeKind::Deleted {
                warn!(path = %event.path.display(), "Configuration file deleted; keeping current properties");
                continue;
            }
            match self.reload_from(path) {
                Ok(outcome) => debug!(destroyed = outcome.destroyed, "Configuration reloaded"),
                Err(e) => warn!(error = %e, "Configuration reload failed"),
            }
        }

        Ok(())
    }

    /// Spawns [`watch_config`](Self::watch_config) on the current Tokio
    /// runtime if `scopes.refresh.watch` is enabled.
    ///
    /// Returns `None` when watching is disabled.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn_watch(
        self: &Arc<Self>,
        path: impl AsRef<Path>,
    ) -> Option<JoinHandle<anyhow::Result<()>>> {
        if !self.watch {
            debug!("Configuration watching disabled");
            return None;
        }
        let scopes = Arc::clone(self);
        let path = path.as_ref().to_path_buf();
        Some(tokio::spawn(async move { scopes.watch_config(&path).await }))
    }

    /// Stops every scope, destroying the beans they hold.
    ///
    /// Thread-local beans are destroyed for every thread, not only the
    /// calling one.
    pub fn shutdown(&self) {
        info!("Shutting down scopes");
        self.registry.stop_all();
    }
}

impl<B: RequestBinding> std::fmt::Debug for ScopeContext<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopeContext")
            .field("registry", &self.registry)
            .field("properties", &self.properties.read().len())
            .finish_non_exhaustive()
    }
}

/// Initializes logging and metrics from `config`.
pub fn init_telemetry(config: &CustosConfig) -> anyhow::Result<()> {
    custos_telemetry::init_telemetry(&config.telemetry.to_telemetry_config())
        .context("failed to initialize telemetry")
}
