//! Scope registry.
//!
//! The registry maps a [`ScopeTag`] to the scope that serves it. Scopes are
//! registered once at application startup and looked up by tag whenever the
//! container needs a scoped bean.
//!
//! # Example
//!
//! ```rust
//! use custos_core::{BeanCreationContext, CustomScope, FactoryContext, ScopeRegistry, ScopeTag};
//! # use custos_core::{BeanIdentifier, BeanInstance, ScopeResult};
//! # use std::sync::Arc;
//! # struct AlwaysNew;
//! # impl CustomScope for AlwaysNew {
//! #     fn scope_tag(&self) -> ScopeTag { ScopeTag::new("prototype") }
//! #     fn get_or_create(&self, ctx: &dyn BeanCreationContext) -> ScopeResult<BeanInstance> {
//! #         Ok(ctx.create()?.bean().clone())
//! #     }
//! #     fn remove(&self, _id: &BeanIdentifier) -> Option<BeanInstance> { None }
//! # }
//!
//! let mut registry = ScopeRegistry::new();
//! registry.register(Arc::new(AlwaysNew));
//!
//! let context = FactoryContext::new("clock", || Ok::<_, std::io::Error>(0_u64));
//! let bean = registry.get_or_create(ScopeTag::new("prototype"), &context).unwrap();
//! assert_eq!(bean.downcast_ref::<u64>(), Some(&0));
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::bean::{BeanIdentifier, BeanInstance, BeanRegistration};
use crate::created::BeanCreationContext;
use crate::error::{ScopeError, ScopeResult};
use crate::scope::{CustomScope, ScopeTag};

/// Registry of custom scopes keyed by tag.
///
/// Registration order is kept so shutdown can run in reverse.
#[derive(Default)]
pub struct ScopeRegistry {
    scopes: IndexMap<ScopeTag, Arc<dyn CustomScope>>,
}

impl ScopeRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            scopes: IndexMap::new(),
        }
    }

    /// Registers a scope under its own tag.
    ///
    /// Returns the scope previously registered under that tag, if any.
    pub fn register(&mut self, scope: Arc<dyn CustomScope>) -> Option<Arc<dyn CustomScope>> {
        let tag = scope.scope_tag();
        debug!(scope = %tag, "Registering custom scope");
        self.scopes.insert(tag, scope)
    }

    /// Finds the scope registered under `tag`.
    #[must_use]
    pub fn find(&self, tag: ScopeTag) -> Option<&Arc<dyn CustomScope>> {
        self.scopes.get(&tag)
    }

    /// Finds the scope registered under `tag` or fails.
    pub fn require(&self, tag: ScopeTag) -> ScopeResult<&Arc<dyn CustomScope>> {
        self.find(tag).ok_or(ScopeError::NotRegistered(tag))
    }

    /// Gets or creates a bean in the scope registered under `tag`.
    pub fn get_or_create(
        &self,
        tag: ScopeTag,
        context: &dyn BeanCreationContext,
    ) -> ScopeResult<BeanInstance> {
        self.require(tag)?.get_or_create(context)
    }

    /// Removes a bean from the scope registered under `tag`.
    ///
    /// Returns `None` when the scope is not registered.
    pub fn remove(&self, tag: ScopeTag, id: &BeanIdentifier) -> Option<BeanInstance> {
        self.find(tag)?.remove(id)
    }

    /// Finds the registration of `bean` in any registered scope.
    pub fn find_bean_registration(&self, bean: &BeanInstance) -> Option<(ScopeTag, BeanRegistration)> {
        self.scopes.iter().find_map(|(tag, scope)| {
            scope
                .find_bean_registration(bean)
                .map(|registration| (*tag, registration))
        })
    }

    /// Stops every lifecycle-aware scope, most recently registered first.
    pub fn stop_all(&self) {
        for (tag, scope) in self.scopes.iter().rev() {
            if let Some(lifecycle) = scope.as_lifecycle() {
                if lifecycle.is_running() {
                    info!(scope = %tag, "Stopping custom scope");
                    lifecycle.stop();
                }
            }
        }
    }

    /// Returns `true` if a scope is registered under `tag`.
    #[must_use]
    pub fn contains(&self, tag: ScopeTag) -> bool {
        self.scopes.contains_key(&tag)
    }

    /// Returns the registered tags in registration order.
    pub fn tags(&self) -> impl Iterator<Item = ScopeTag> + '_ {
        self.scopes.keys().copied()
    }

    /// Returns the number of registered scopes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    /// Returns `true` if no scopes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }
}

impl fmt::Debug for ScopeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeRegistry")
            .field("scopes", &self.scopes.keys().collect::<Vec<_>>())
            .finish()
    }
}
