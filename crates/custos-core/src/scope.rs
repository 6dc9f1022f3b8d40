//! The custom scope contract.
//!
//! A [`CustomScope`] caches beans under a [`BeanIdentifier`] for as long as
//! its lifecycle policy allows: one per request, one per thread, one until the
//! next configuration refresh, and so on.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::bean::{BeanDefinition, BeanIdentifier, BeanInstance, BeanRegistration};
use crate::created::BeanCreationContext;
use crate::error::{ScopeError, ScopeResult};
use crate::lifecycle::LifeCycle;

/// Identifies a kind of scope for registry lookup.
///
/// # Example
///
/// ```
/// use custos_core::ScopeTag;
///
/// const SESSION: ScopeTag = ScopeTag::new("session");
/// assert_eq!(SESSION.name(), "session");
/// assert_ne!(SESSION, ScopeTag::REQUEST);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeTag(&'static str);

impl ScopeTag {
    /// Beans destroyed whenever the configuration they depend on changes.
    pub const REFRESHABLE: Self = Self("refreshable");
    /// One bean per OS thread.
    pub const THREAD_LOCAL: Self = Self("thread-local");
    /// One bean per in-flight request.
    pub const REQUEST: Self = Self("request");

    /// Creates a tag for a user-defined scope.
    pub const fn new(name: &'static str) -> Self {
        Self(name)
    }

    /// Returns the tag name.
    pub const fn name(&self) -> &'static str {
        self.0
    }
}

impl fmt::Display for ScopeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// A scope that creates, caches and destroys beans.
///
/// Implementations must be shareable across threads. The reverse lookups
/// default to `None` so a scope only pays for a linear scan when it opts in.
pub trait CustomScope: Send + Sync {
    /// Returns the tag this scope is registered under.
    fn scope_tag(&self) -> ScopeTag;

    /// Returns the bean stored under `context.id()`, creating it on a miss.
    ///
    /// Creation failures propagate and leave no entry behind.
    fn get_or_create(&self, context: &dyn BeanCreationContext) -> ScopeResult<BeanInstance>;

    /// Removes and destroys the bean stored under `id`.
    ///
    /// Returns the removed instance, or `None` if nothing was stored or the
    /// scope has no map in the current context. Destruction failures are
    /// reported through the scope's destruction hook, not returned.
    fn remove(&self, id: &BeanIdentifier) -> Option<BeanInstance>;

    /// Finds the registration of a stored bean by instance identity.
    fn find_bean_registration(&self, _bean: &BeanInstance) -> Option<BeanRegistration> {
        None
    }

    /// Finds the registration of a stored bean by definition.
    fn find_bean_registration_for(&self, _definition: &BeanDefinition) -> Option<BeanRegistration> {
        None
    }

    /// Returns the lifecycle view of this scope, if it has one.
    fn as_lifecycle(&self) -> Option<&dyn LifeCycle> {
        None
    }
}

/// Typed helpers over any [`CustomScope`].
pub trait CustomScopeExt: CustomScope {
    /// Like [`CustomScope::get_or_create`], downcasting the bean to `T`.
    fn get_or_create_typed<T: Any + Send + Sync>(
        &self,
        context: &dyn BeanCreationContext,
    ) -> ScopeResult<Arc<T>> {
        self.get_or_create(context)?
            .downcast::<T>()
            .map_err(|_| ScopeError::type_mismatch::<T>(context.id().clone()))
    }

    /// Like [`CustomScope::remove`], downcasting the removed bean to `T`.
    ///
    /// The bean is destroyed either way; `None` is returned when it was not a `T`.
    fn remove_typed<T: Any + Send + Sync>(&self, id: &BeanIdentifier) -> Option<Arc<T>> {
        self.remove(id)?.downcast::<T>().ok()
    }
}

impl<S: CustomScope + ?Sized> CustomScopeExt for S {}

impl fmt::Debug for dyn CustomScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomScope")
            .field("tag", &self.scope_tag())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::created::FactoryContext;
    use support::SingleSlotScope;

    // A minimal scope holding at most one bean, enough to exercise the
    // provided methods without the concurrent engine.
    mod support {
        use super::*;
        use std::sync::Mutex;

        #[derive(Default)]
        pub struct SingleSlotScope {
            pub slot: Mutex<Option<(BeanIdentifier, BeanInstance)>>,
        }

        impl CustomScope for SingleSlotScope {
            fn scope_tag(&self) -> ScopeTag {
                ScopeTag::new("single")
            }

            fn get_or_create(
                &self,
                context: &dyn BeanCreationContext,
            ) -> ScopeResult<BeanInstance> {
                let mut slot = self.slot.lock().unwrap();
                if let Some((id, bean)) = slot.as_ref() {
                    if id == context.id() {
                        return Ok(bean.clone());
                    }
                }
                let created = context.create()?;
                let bean = created.bean().clone();
                *slot = Some((context.id().clone(), bean.clone()));
                Ok(bean)
            }

            fn remove(&self, id: &BeanIdentifier) -> Option<BeanInstance> {
                let mut slot = self.slot.lock().unwrap();
                match slot.take() {
                    Some((stored, bean)) if &stored == id => Some(bean),
                    other => {
                        *slot = other;
                        None
                    }
                }
            }
        }
    }

    #[test]
    fn test_builtin_tags() {
        assert_eq!(ScopeTag::REFRESHABLE.to_string(), "refreshable");
        assert_eq!(ScopeTag::THREAD_LOCAL.name(), "thread-local");
        assert_eq!(ScopeTag::REQUEST.name(), "request");
    }

    #[test]
    fn test_default_lookups_are_empty() {
        let scope = SingleSlotScope::default();
        let bean: BeanInstance = Arc::new(1_u8);
        assert!(scope.find_bean_registration(&bean).is_none());
        assert!(scope
            .find_bean_registration_for(&BeanDefinition::of::<u8>("one"))
            .is_none());
        assert!(scope.as_lifecycle().is_none());
    }

    #[test]
    fn test_get_or_create_typed() {
        let scope = SingleSlotScope::default();
        let context = FactoryContext::new("greeting", || Ok::<_, std::io::Error>(String::from("hi")));

        let greeting: Arc<String> = scope.get_or_create_typed(&context).unwrap();
        assert_eq!(greeting.as_str(), "hi");
    }

    #[test]
    fn test_get_or_create_typed_mismatch() {
        let scope = SingleSlotScope::default();
        let context = FactoryContext::new("number", || Ok::<_, std::io::Error>(7_i64));

        let result = scope.get_or_create_typed::<String>(&context);
        assert!(matches!(result, Err(ScopeError::TypeMismatch { .. })));
    }

    #[test]
    fn test_remove_typed() {
        let scope = SingleSlotScope::default();
        let context = FactoryContext::new("number", || Ok::<_, std::io::Error>(7_i64));
        scope.get_or_create(&context).unwrap();

        let removed = scope.remove_typed::<i64>(&BeanIdentifier::new("number"));
        assert_eq!(removed.as_deref(), Some(&7));
        assert!(scope.remove(&BeanIdentifier::new("number")).is_none());
    }

    #[test]
    fn test_dyn_scope_debug() {
        let scope: Arc<dyn CustomScope> = Arc::new(SingleSlotScope::default());
        let debug = format!("{scope:?}");
        assert!(debug.contains("single"));
    }
}
