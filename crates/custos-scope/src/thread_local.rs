//! One bean per OS thread.

use std::thread::{self, ThreadId};

use custos_core::{ScopeResult, ScopeTag};
use dashmap::DashMap;
use tracing::debug;

use crate::engine::{ConcurrentScope, ScopeMap, ScopeMapProvider};

/// Scope whose beans are private to the thread that created them.
pub type ThreadLocalScope = ConcurrentScope<ThreadScopeMaps>;

/// Keeps a [`ScopeMap`] per thread.
///
/// The map for a thread is allocated on its first creation and released by
/// [`ThreadLocalScope::destroy_current_thread`],
/// [`ThreadLocalScope::destroy_all_threads`] or when the scope stops.
#[derive(Debug, Default)]
pub struct ThreadScopeMaps {
    maps: DashMap<ThreadId, ScopeMap>,
}

impl ThreadScopeMaps {
    /// Returns the number of threads holding a map.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.maps.len()
    }
}

impl ScopeMapProvider for ThreadScopeMaps {
    fn scope_tag(&self) -> ScopeTag {
        ScopeTag::THREAD_LOCAL
    }

    fn scope_map(&self, for_creation: bool) -> ScopeResult<ScopeMap> {
        let thread = thread::current().id();
        if for_creation {
            return Ok(self.maps.entry(thread).or_default().clone());
        }
        Ok(self
            .maps
            .get(&thread)
            .map(|map| map.value().clone())
            .unwrap_or_default())
    }

    fn maps_on_stop(&self) -> ScopeResult<Vec<ScopeMap>> {
        Ok(self.detach_all())
    }
}

impl ThreadScopeMaps {
    fn detach_all(&self) -> Vec<ScopeMap> {
        let threads: Vec<ThreadId> = self.maps.iter().map(|entry| *entry.key()).collect();
        threads
            .iter()
            .filter_map(|thread| self.maps.remove(thread))
            .map(|(_, map)| map)
            .collect()
    }
}

impl ConcurrentScope<ThreadScopeMaps> {
    /// Creates a thread-local scope.
    #[must_use]
    pub fn thread_local() -> Self {
        Self::new(ThreadScopeMaps::default())
    }

    /// Destroys the calling thread's beans and releases its map.
    ///
    /// Worker pools call this when a task finishes. Returns the number of
    /// beans destroyed.
    pub fn destroy_current_thread(&self) -> usize {
        let Some((thread, map)) = self.provider().maps.remove(&thread::current().id()) else {
            return 0;
        };
        let destroyed = self.destroy(&map);
        debug!(?thread, bean_count = destroyed, "Released thread-local beans");
        destroyed
    }

    /// Destroys the beans of every thread and releases all maps.
    ///
    /// Returns the number of beans destroyed.
    pub fn destroy_all_threads(&self) -> usize {
        let (threads, destroyed) = self.exclusive(|| {
            let maps = self.provider().detach_all();
            let destroyed = maps
                .iter()
                .map(|map| self.destroy_locked(map.drain_where(|_| true)))
                .sum::<usize>();
            (maps.len(), destroyed)
        });
        debug!(threads, bean_count = destroyed, "Released all thread-local beans");
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_core::fixtures::Probe;
    use custos_core::{same_instance, CustomScope, LifeCycle};
    use std::sync::Arc;

    #[test]
    fn test_same_thread_shares_bean() {
        let probe = Probe::new();
        let scope = ThreadLocalScope::thread_local();
        let context = probe.context("buffer");

        let first = scope.get_or_create(context.as_ref()).unwrap();
        let second = scope.get_or_create(context.as_ref()).unwrap();
        assert!(same_instance(&first, &second));
        assert_eq!(scope.provider().active_threads(), 1);
    }

    #[test]
    fn test_threads_get_distinct_beans() {
        let probe = Probe::new();
        let scope = Arc::new(ThreadLocalScope::thread_local());
        let context = probe.context("buffer");

        let here = scope.get_or_create(context.as_ref()).unwrap();

        let remote_scope = scope.clone();
        let remote_context = context.clone();
        let there = thread::spawn(move || {
            remote_scope
                .get_or_create(remote_context.as_ref())
                .unwrap()
        })
        .join()
        .unwrap();

        assert!(!same_instance(&here, &there));
        assert_eq!(probe.created(), 2);
        assert_eq!(scope.provider().active_threads(), 2);
    }

    #[test]
    fn test_remove_without_map_is_none() {
        let scope = ThreadLocalScope::thread_local();
        assert!(scope
            .remove(&custos_core::BeanIdentifier::new("never"))
            .is_none());
        assert_eq!(scope.provider().active_threads(), 0);
    }

    #[test]
    fn test_destroy_current_thread() {
        let probe = Probe::new();
        let scope = ThreadLocalScope::thread_local();
        scope.get_or_create(probe.context("a").as_ref()).unwrap();
        scope.get_or_create(probe.context("b").as_ref()).unwrap();

        assert_eq!(scope.destroy_current_thread(), 2);
        assert_eq!(probe.destroyed(), 2);
        assert_eq!(scope.provider().active_threads(), 0);
        assert_eq!(scope.destroy_current_thread(), 0);
    }

    #[test]
    fn test_stop_releases_calling_thread() {
        let probe = Probe::new();
        let scope = ThreadLocalScope::thread_local();
        scope.get_or_create(probe.context("a").as_ref()).unwrap();

        scope.stop();

        assert_eq!(probe.destroyed(), 1);
        assert_eq!(scope.provider().active_threads(), 0);
    }

    fn create_on_worker(scope: &Arc<ThreadLocalScope>, probe: &Probe, name: &str) {
        let scope = scope.clone();
        let context = probe.context(name);
        thread::spawn(move || scope.get_or_create(context.as_ref()).map(|_| ()))
            .join()
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_stop_destroys_worker_thread_beans() {
        let probe = Probe::new();
        let scope = Arc::new(ThreadLocalScope::thread_local());
        scope.get_or_create(probe.context("main").as_ref()).unwrap();
        create_on_worker(&scope, &probe, "worker");
        assert_eq!(scope.provider().active_threads(), 2);

        scope.stop();

        assert_eq!(probe.created(), 2);
        assert_eq!(probe.destroyed(), 2);
        assert_eq!(scope.provider().active_threads(), 0);
    }

    #[test]
    fn test_destroy_all_threads() {
        let probe = Probe::new();
        let scope = Arc::new(ThreadLocalScope::thread_local());
        create_on_worker(&scope, &probe, "first");
        create_on_worker(&scope, &probe, "second");

        assert_eq!(scope.destroy_all_threads(), 2);
        assert_eq!(probe.destroyed(), 2);
        assert_eq!(scope.provider().active_threads(), 0);
        assert!(scope.is_running());
        assert_eq!(scope.destroy_all_threads(), 0);
    }
}
