//! Integration tests for the concurrent scope engine.
//!
//! These tests drive [`ConcurrentScope`] from many threads at once and check
//! the guarantees callers rely on: one creation per identifier, fully built
//! beans, idempotent removal and isolated teardown.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier, Mutex};
use std::thread;
use std::time::Duration;

use custos_core::fixtures::{Probe, TrackedBean};
use custos_core::{
    same_instance, BeanDestructionError, BeanIdentifier, CustomScope, CustomScopeExt,
    FactoryContext, LifeCycle, ScopeError, ScopeResult, ScopeTag,
};
use custos_scope::{ConcurrentScope, ScopeMap, ScopeMapProvider};

/// Provider whose map can be switched off to simulate a missing context.
#[derive(Default)]
struct Switchable {
    beans: ScopeMap,
    unavailable: AtomicBool,
    closes: AtomicUsize,
    destruction_failures: Mutex<Vec<BeanIdentifier>>,
}

impl Switchable {
    fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }
}

impl ScopeMapProvider for Switchable {
    fn scope_tag(&self) -> ScopeTag {
        ScopeTag::new("switchable")
    }

    fn scope_map(&self, _for_creation: bool) -> ScopeResult<ScopeMap> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ScopeError::unavailable(self.scope_tag(), "switched off"));
        }
        Ok(self.beans.clone())
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_destruction_error(&self, error: &BeanDestructionError) {
        self.destruction_failures.lock().unwrap().push(error.id.clone());
    }
}

fn new_scope() -> Arc<ConcurrentScope<Switchable>> {
    Arc::new(ConcurrentScope::new(Switchable::default()))
}

/// Runs `f` on `threads` threads released together, collecting the results.
fn race<T, F>(threads: usize, f: F) -> Vec<T>
where
    T: Send + 'static,
    F: Fn(usize) -> T + Send + Sync + 'static,
{
    let barrier = Arc::new(Barrier::new(threads));
    let f = Arc::new(f);
    let handles: Vec<_> = (0..threads)
        .map(|index| {
            let barrier = barrier.clone();
            let f = f.clone();
            thread::spawn(move || {
                barrier.wait();
                f(index)
            })
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_two_threads_share_slow_creation() {
    let probe = Probe::new();
    let scope = new_scope();
    let context = probe.slow_context("slow", Duration::from_millis(50));

    let beans = {
        let scope = scope.clone();
        race(2, move |_| scope.get_or_create(context.as_ref()).unwrap())
    };

    assert!(same_instance(&beans[0], &beans[1]));
    assert_eq!(probe.created(), 1);
}

#[test]
fn test_many_threads_create_at_most_once() {
    let probe = Probe::new();
    let scope = new_scope();
    let context = probe.slow_context("contended", Duration::from_millis(20));

    let beans = {
        let scope = scope.clone();
        race(16, move |_| scope.get_or_create(context.as_ref()).unwrap())
    };

    assert_eq!(probe.created(), 1);
    assert!(beans.iter().all(|bean| same_instance(bean, &beans[0])));
    assert_eq!(scope.provider().beans.len(), 1);
}

#[test]
fn test_distinct_ids_each_created_once() {
    let probe = Probe::new();
    let scope = new_scope();

    let contexts: Vec<_> = (0..8).map(|i| probe.context(&format!("bean-{i}"))).collect();
    let contexts = Arc::new(contexts);

    {
        let scope = scope.clone();
        let contexts = contexts.clone();
        race(32, move |index| {
            scope
                .get_or_create(contexts[index % contexts.len()].as_ref())
                .unwrap()
        });
    }

    assert_eq!(probe.created(), 8);
    assert_eq!(scope.provider().beans.len(), 8);
}

struct Connection {
    handshake_complete: bool,
}

#[test]
fn test_no_partial_publication() {
    let scope = new_scope();
    let context = Arc::new(FactoryContext::new("connection", || {
        let mut connection = Connection {
            handshake_complete: false,
        };
        thread::sleep(Duration::from_millis(30));
        connection.handshake_complete = true;
        Ok::<_, std::io::Error>(connection)
    }));

    let observed = {
        let scope = scope.clone();
        race(8, move |_| {
            let connection: Arc<Connection> = scope.get_or_create_typed(context.as_ref()).unwrap();
            connection.handshake_complete
        })
    };

    assert!(observed.into_iter().all(|complete| complete));
}

#[test]
fn test_failed_creation_is_not_published() {
    let probe = Probe::new();
    let scope = new_scope();
    let context = probe.failing_context("flaky");

    let results = {
        let scope = scope.clone();
        race(4, move |_| scope.get_or_create(context.as_ref()).is_err())
    };

    assert!(results.into_iter().all(|failed| failed));
    assert!(scope.provider().beans.is_empty());
    // Each caller retried under the write lock.
    assert_eq!(probe.created(), 4);
}

#[test]
fn test_remove_twice() {
    let probe = Probe::new();
    let scope = new_scope();
    let bean = scope.get_or_create(probe.context("once").as_ref()).unwrap();
    let id = BeanIdentifier::new("once");

    let removed = scope.remove(&id).unwrap();
    assert!(same_instance(&bean, &removed));
    assert!(scope.remove(&id).is_none());
    assert_eq!(probe.destroy_attempts(), 1);
}

#[test]
fn test_concurrent_removal_destroys_once() {
    let probe = Probe::new();
    let scope = new_scope();
    scope.get_or_create(probe.context("shared").as_ref()).unwrap();

    let removed = {
        let scope = scope.clone();
        race(8, move |_| scope.remove(&BeanIdentifier::new("shared")).is_some())
    };

    assert_eq!(removed.into_iter().filter(|r| *r).count(), 1);
    assert_eq!(probe.destroyed(), 1);
}

#[test]
fn test_teardown_isolation() {
    let probe = Probe::new();
    let scope = new_scope();
    scope.get_or_create(probe.context("first").as_ref()).unwrap();
    scope
        .get_or_create(probe.failing_destroy_context("broken").as_ref())
        .unwrap();
    scope.get_or_create(probe.context("last").as_ref()).unwrap();

    scope.stop();

    assert_eq!(probe.destroy_attempts(), 3);
    assert_eq!(probe.destroyed(), 2);
    assert_eq!(
        *scope.provider().destruction_failures.lock().unwrap(),
        vec![BeanIdentifier::new("broken")]
    );
    assert!(scope.provider().beans.is_empty());
    assert_eq!(scope.provider().closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unavailable_map_tolerance() {
    let probe = Probe::new();
    let scope = new_scope();
    let bean = scope.get_or_create(probe.context("kept").as_ref()).unwrap();

    scope.provider().set_available(false);

    assert!(scope.remove(&BeanIdentifier::new("kept")).is_none());
    assert!(scope.find_bean_registration(&bean).is_none());

    let err = scope
        .get_or_create(probe.context("new").as_ref())
        .unwrap_err();
    assert!(err.is_unavailable());
    assert_eq!(probe.created(), 1);

    scope.stop();
    assert!(!scope.is_running());
    assert_eq!(scope.provider().closes.load(Ordering::SeqCst), 1);
    assert_eq!(probe.destroyed(), 0);

    scope.provider().set_available(true);
    assert_eq!(scope.provider().beans.len(), 1);
}

#[test]
fn test_reverse_lookup_tracks_contents() {
    let probe = Probe::new();
    let scope = new_scope();
    let alpha = scope.get_or_create(probe.context("alpha").as_ref()).unwrap();
    let beta = scope.get_or_create(probe.context("beta").as_ref()).unwrap();

    let registration = scope.find_bean_registration(&beta).unwrap();
    assert_eq!(registration.id(), &BeanIdentifier::new("beta"));
    assert_eq!(registration.bean_as::<TrackedBean>().unwrap().name, "beta");

    scope.remove(&BeanIdentifier::new("alpha"));
    assert!(scope.find_bean_registration(&alpha).is_none());
    assert!(scope.find_bean_registration(&beta).is_some());
}

#[test]
fn test_lookup_during_creation_burst() {
    let probe = Probe::new();
    let scope = new_scope();
    let anchor = scope.get_or_create(probe.context("anchor").as_ref()).unwrap();

    let contexts: Arc<Vec<_>> = Arc::new(
        (0..16)
            .map(|i| probe.slow_context(&format!("burst-{i}"), Duration::from_millis(2)))
            .collect(),
    );

    let found = {
        let scope = scope.clone();
        let anchor = anchor.clone();
        race(16, move |index| {
            scope.get_or_create(contexts[index].as_ref()).unwrap();
            scope.find_bean_registration(&anchor).is_some()
        })
    };

    assert!(found.into_iter().all(|f| f));
    assert_eq!(probe.created(), 17);
}

#[test]
fn test_stop_then_reuse() {
    let probe = Probe::new();
    let scope = new_scope();
    let context = probe.context("phoenix");

    let before = scope.get_or_create(context.as_ref()).unwrap();
    scope.stop();
    scope.start();
    let after = scope.get_or_create(context.as_ref()).unwrap();

    assert!(!same_instance(&before, &after));
    assert_eq!(probe.created(), 2);
    assert_eq!(probe.destroyed(), 1);
}
