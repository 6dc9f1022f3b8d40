//! Refreshable scope.
//!
//! Beans survive until the configuration they depend on changes. A
//! [`RefreshEvent`] names the changed property keys; every bean whose
//! definition declares a matching property prefix is destroyed and will be
//! re-created on its next lookup.

use custos_core::{BeanDefinition, ScopeResult, ScopeTag};
use custos_telemetry::metrics;
use tracing::info;

use crate::engine::{ConcurrentScope, ScopeMap, ScopeMapProvider};

/// Scope whose beans are discarded when their configuration changes.
pub type RefreshScope = ConcurrentScope<RefreshableBeans>;

/// What changed in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshEvent {
    /// Everything may have changed.
    All,
    /// These dotted property keys changed.
    Keys(Vec<String>),
}

impl RefreshEvent {
    /// Creates a key-based event.
    pub fn keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Keys(keys.into_iter().map(Into::into).collect())
    }

    /// Returns `true` if beans of `definition` must be discarded.
    #[must_use]
    pub fn affects(&self, definition: &BeanDefinition) -> bool {
        match self {
            Self::All => true,
            Self::Keys(keys) => keys.iter().any(|key| definition.depends_on_property(key)),
        }
    }

    /// Returns `true` if the event cannot affect any bean.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Keys(keys) if keys.is_empty())
    }
}

/// The process-wide map of refreshable beans.
#[derive(Debug, Default)]
pub struct RefreshableBeans {
    beans: ScopeMap,
}

impl RefreshableBeans {
    /// Returns the stored beans.
    #[must_use]
    pub fn beans(&self) -> &ScopeMap {
        &self.beans
    }
}

impl ScopeMapProvider for RefreshableBeans {
    fn scope_tag(&self) -> ScopeTag {
        ScopeTag::REFRESHABLE
    }

    fn scope_map(&self, _for_creation: bool) -> ScopeResult<ScopeMap> {
        Ok(self.beans.clone())
    }
}

impl ConcurrentScope<RefreshableBeans> {
    /// Creates a refreshable scope.
    #[must_use]
    pub fn refreshable() -> Self {
        Self::new(RefreshableBeans::default())
    }

    /// Destroys the beans affected by `event`.
    ///
    /// Returns the number of beans destroyed.
    pub fn refresh(&self, event: &RefreshEvent) -> usize {
        if event.is_empty() {
            return 0;
        }
        let beans = self.provider().beans();
        let destroyed = match event {
            RefreshEvent::All => self.destroy(beans),
            RefreshEvent::Keys(_) => {
                self.destroy_where(beans, |created| event.affects(created.definition()))
            }
        };
        metrics::record_scope_refresh(ScopeTag::REFRESHABLE.name());
        info!(scope = %ScopeTag::REFRESHABLE, bean_count = destroyed, "Refreshed scope");
        destroyed
    }
}
