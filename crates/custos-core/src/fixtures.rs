//! Test fixtures for scope implementations.
//!
//! A [`Probe`] hands out creation contexts that count how often beans are
//! created and destroyed, optionally slowing creation down or failing on
//! purpose. Scope tests across the workspace use it to check exactly-once
//! creation and teardown behaviour.
//!
//! # Example
//!
//! ```
//! use custos_core::fixtures::{Probe, TrackedBean};
//! use custos_core::BeanCreationContext;
//!
//! let probe = Probe::new();
//! let context = probe.context("service");
//!
//! let created = context.create().unwrap();
//! assert_eq!(probe.created(), 1);
//! assert_eq!(created.bean().downcast_ref::<TrackedBean>().unwrap().serial, 0);
//!
//! created.close().unwrap();
//! assert_eq!(probe.destroyed(), 1);
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::bean::{BeanDefinition, BeanIdentifier};
use crate::created::{BeanCreationContext, FactoryContext};
use crate::error::BoxError;

/// Bean produced by [`Probe`] contexts.
#[derive(Debug, PartialEq, Eq)]
pub struct TrackedBean {
    /// Order in which the probe created this bean, starting at zero.
    pub serial: usize,
    /// Name of the context that created it.
    pub name: String,
}

/// Counts creations and destructions across the contexts it hands out.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    created: Arc<AtomicUsize>,
    destroyed: Arc<AtomicUsize>,
    destroy_attempts: Arc<AtomicUsize>,
}

impl Probe {
    /// Creates a probe with zeroed counters.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of beans created so far.
    #[must_use]
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of beans whose pre-destroy hook succeeded.
    #[must_use]
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::SeqCst)
    }

    /// Number of pre-destroy hooks run, successful or not.
    #[must_use]
    pub fn destroy_attempts(&self) -> usize {
        self.destroy_attempts.load(Ordering::SeqCst)
    }

    /// A context that creates a [`TrackedBean`] immediately.
    #[must_use]
    pub fn context(&self, name: &str) -> Arc<dyn BeanCreationContext> {
        self.build(name, Duration::ZERO, false, false, &[])
    }

    /// A context whose beans depend on the given property prefixes.
    #[must_use]
    pub fn context_with_prefixes(&self, name: &str, prefixes: &[&str]) -> Arc<dyn BeanCreationContext> {
        self.build(name, Duration::ZERO, false, false, prefixes)
    }

    /// A context that sleeps for `delay` before creating.
    #[must_use]
    pub fn slow_context(&self, name: &str, delay: Duration) -> Arc<dyn BeanCreationContext> {
        self.build(name, delay, false, false, &[])
    }

    /// A context whose factory always fails. Attempts are still counted.
    #[must_use]
    pub fn failing_context(&self, name: &str) -> Arc<dyn BeanCreationContext> {
        self.build(name, Duration::ZERO, true, false, &[])
    }

    /// A context whose beans fail in their pre-destroy hook.
    #[must_use]
    pub fn failing_destroy_context(&self, name: &str) -> Arc<dyn BeanCreationContext> {
        self.build(name, Duration::ZERO, false, true, &[])
    }

    fn build(
        &self,
        name: &str,
        delay: Duration,
        fail_create: bool,
        fail_destroy: bool,
        prefixes: &[&str],
    ) -> Arc<dyn BeanCreationContext> {
        let definition = prefixes.iter().fold(
            BeanDefinition::of::<TrackedBean>(name),
            |definition, prefix| definition.with_property_prefix(*prefix),
        );

        let created = self.created.clone();
        let bean_name = name.to_string();
        let factory = move || -> Result<TrackedBean, BoxError> {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            let serial = created.fetch_add(1, Ordering::SeqCst);
            if fail_create {
                return Err(format!("factory for '{bean_name}' refused").into());
            }
            Ok(TrackedBean {
                serial,
                name: bean_name.clone(),
            })
        };

        let destroyed = self.destroyed.clone();
        let attempts = self.destroy_attempts.clone();
        let context = FactoryContext::with_definition(
            BeanIdentifier::new(name),
            Arc::new(definition),
            factory,
        )
        .on_destroy(move |bean: &TrackedBean| -> Result<(), BoxError> {
            attempts.fetch_add(1, Ordering::SeqCst);
            if fail_destroy {
                return Err(format!("'{}' refused to shut down", bean.name).into());
            }
            destroyed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        Arc::new(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_context_counts_attempt() {
        let probe = Probe::new();
        assert!(probe.failing_context("x").create().is_err());
        assert_eq!(probe.created(), 1);
    }

    #[test]
    fn test_failing_destroy_context() {
        let probe = Probe::new();
        let created = probe.failing_destroy_context("x").create().unwrap();
        let err = created.close().unwrap_err();
        assert!(err.message.contains("refused to shut down"));
        assert_eq!(probe.destroy_attempts(), 1);
        assert_eq!(probe.destroyed(), 0);
    }

    #[test]
    fn test_context_with_prefixes() {
        let probe = Probe::new();
        let context = probe.context_with_prefixes("x", &["a", "b.c"]);
        assert!(context.definition().depends_on_property("b.c.d"));
        assert!(!context.definition().depends_on_property("b"));
    }
}
