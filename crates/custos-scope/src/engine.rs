//! The concurrent scope engine.
//!
//! [`ConcurrentScope`] turns a [`ScopeMapProvider`] into a thread-safe
//! [`CustomScope`]. The provider decides *where* beans live for the current
//! execution context (a request, a thread, the whole process); the engine
//! decides *how* they are created, cached and destroyed.
//!
//! # Locking
//!
//! Each engine owns one reader-writer lock covering every map the provider
//! hands out:
//!
//! - lookups of existing beans run under the read lock
//! - a miss releases the read lock, takes the write lock and checks again
//!   before creating, so concurrent callers create a bean at most once
//! - after inserting, the write lock is downgraded to a read lock
//! - removal and teardown run under the write lock
//!
//! A factory may resolve other beans from the same scope while it runs; the
//! engine recognises the nested call and serves it under the write lock the
//! thread already holds.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Instant;

use custos_core::{
    same_instance, BeanCreationContext, BeanDefinition, BeanDestructionError, BeanIdentifier,
    BeanInstance, BeanRegistration, CreatedBean, CustomScope, LifeCycle, ScopeResult, ScopeTag,
};
use custos_telemetry::metrics;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};
use tracing::{debug, error, info, warn};

/// Shared handle to the beans of one execution context.
///
/// Clones refer to the same table. Mutation goes through the owning
/// [`ConcurrentScope`], which holds its lock while doing so. Reads take a
/// shared lock on the table, so lookups from many threads run in parallel.
#[derive(Clone, Default)]
pub struct ScopeMap {
    beans: Arc<RwLock<HashMap<BeanIdentifier, CreatedBean>>>,
}

impl ScopeMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the bean stored under `id`.
    #[must_use]
    pub fn get(&self, id: &BeanIdentifier) -> Option<BeanInstance> {
        self.beans.read().get(id).map(|created| created.bean().clone())
    }

    /// Returns `true` if a bean is stored under `id`.
    #[must_use]
    pub fn contains(&self, id: &BeanIdentifier) -> bool {
        self.beans.read().contains_key(id)
    }

    /// Returns the identifiers currently stored.
    #[must_use]
    pub fn ids(&self) -> Vec<BeanIdentifier> {
        self.beans.read().keys().cloned().collect()
    }

    /// Returns the number of stored beans.
    #[must_use]
    pub fn len(&self) -> usize {
        self.beans.read().len()
    }

    /// Returns `true` if no beans are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.beans.read().is_empty()
    }

    /// Returns `true` if both handles refer to the same table.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.beans, &other.beans)
    }

    fn insert(&self, created: CreatedBean) {
        self.beans.write().insert(created.id().clone(), created);
    }

    fn take(&self, id: &BeanIdentifier) -> Option<CreatedBean> {
        self.beans.write().remove(id)
    }

    pub(crate) fn drain_where(
        &self,
        mut predicate: impl FnMut(&CreatedBean) -> bool,
    ) -> Vec<CreatedBean> {
        let mut beans = self.beans.write();
        let ids: Vec<BeanIdentifier> = beans
            .iter()
            .filter(|(_, created)| predicate(created))
            .map(|(id, _)| id.clone())
            .collect();
        ids.iter().filter_map(|id| beans.remove(id)).collect()
    }

    fn find(&self, bean: &BeanInstance) -> Option<BeanRegistration> {
        self.beans
            .read()
            .values()
            .find(|created| same_instance(created.bean(), bean))
            .map(CreatedBean::registration)
    }

    fn find_for(&self, definition: &BeanDefinition) -> Option<BeanRegistration> {
        self.beans
            .read()
            .values()
            .find(|created| {
                let candidate = created.definition();
                candidate.name() == definition.name() && candidate.type_id() == definition.type_id()
            })
            .map(CreatedBean::registration)
    }
}

impl fmt::Debug for ScopeMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopeMap")
            .field("beans", &self.ids())
            .finish()
    }
}

/// Supplies the bean map for the current execution context.
///
/// Implement this to define a new kind of scope, then wrap it in a
/// [`ConcurrentScope`].
pub trait ScopeMapProvider: Send + Sync + 'static {
    /// The tag of the scope this provider backs.
    fn scope_tag(&self) -> ScopeTag;

    /// Returns the map for the current context.
    ///
    /// `for_creation` is `true` on the get-or-create path, where a provider
    /// may lazily allocate a map. Returns [`ScopeError::Unavailable`] when
    /// there is no active context.
    ///
    /// [`ScopeError::Unavailable`]: custos_core::ScopeError::Unavailable
    fn scope_map(&self, for_creation: bool) -> ScopeResult<ScopeMap>;

    /// Returns every map whose beans are destroyed when the scope stops.
    ///
    /// Defaults to the map of the current context. Providers that keep one
    /// map per context detach and return all of them.
    fn maps_on_stop(&self) -> ScopeResult<Vec<ScopeMap>> {
        self.scope_map(false).map(|map| vec![map])
    }

    /// Releases provider resources once the scope has been destroyed.
    fn close(&self) {}

    /// Called for every bean whose pre-destroy hook failed.
    fn handle_destruction_error(&self, error: &BeanDestructionError) {
        error!(
            scope = %self.scope_tag(),
            bean_id = %error.id,
            bean = %error.bean,
            error = %error,
            "Failed to destroy bean"
        );
    }
}

/// Clears the writer slot when the write section ends.
struct WriterMark<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> WriterMark<'a> {
    fn set(slot: &'a Mutex<Option<ThreadId>>) -> Self {
        *slot.lock() = Some(thread::current().id());
        Self(slot)
    }
}

impl Drop for WriterMark<'_> {
    fn drop(&mut self) {
        *self.0.lock() = None;
    }
}

/// A thread-safe custom scope driven by a [`ScopeMapProvider`].
///
/// # Example
///
/// ```
/// use custos_core::{CustomScope, FactoryContext, ScopeResult, ScopeTag};
/// use custos_scope::{ConcurrentScope, ScopeMap, ScopeMapProvider};
///
/// #[derive(Default)]
/// struct Session {
///     beans: ScopeMap,
/// }
///
/// impl ScopeMapProvider for Session {
///     fn scope_tag(&self) -> ScopeTag {
///         ScopeTag::new("session")
///     }
///
///     fn scope_map(&self, _for_creation: bool) -> ScopeResult<ScopeMap> {
///         Ok(self.beans.clone())
///     }
/// }
///
/// let scope = ConcurrentScope::new(Session::default());
/// let context = FactoryContext::new("cart", || Ok::<_, std::io::Error>(Vec::<u32>::new()));
///
/// let first = scope.get_or_create(&context).unwrap();
/// let second = scope.get_or_create(&context).unwrap();
/// assert!(custos_core::same_instance(&first, &second));
/// ```
pub struct ConcurrentScope<P> {
    provider: P,
    lock: RwLock<()>,
    writer: Mutex<Option<ThreadId>>,
    running: AtomicBool,
}

impl<P: ScopeMapProvider> ConcurrentScope<P> {
    /// Creates a running scope backed by `provider`.
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            lock: RwLock::new(()),
            writer: Mutex::new(None),
            running: AtomicBool::new(true),
        }
    }

    /// Returns the provider.
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Destroys every bean in `map`, leaving it empty.
    ///
    /// Returns the number of beans destroyed. Failures go to the provider's
    /// destruction hook and do not stop the remaining destructions.
    pub fn destroy(&self, map: &ScopeMap) -> usize {
        self.exclusive(|| self.destroy_locked(map.drain_where(|_| true)))
    }

    /// Destroys the beans in `map` matching `predicate`.
    ///
    /// Returns the number of beans destroyed.
    pub fn destroy_where(
        &self,
        map: &ScopeMap,
        predicate: impl FnMut(&CreatedBean) -> bool,
    ) -> usize {
        self.exclusive(|| self.destroy_locked(map.drain_where(predicate)))
    }

    fn held_by_current_thread(&self) -> bool {
        *self.writer.lock() == Some(thread::current().id())
    }

    pub(crate) fn exclusive<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.held_by_current_thread() {
            return f();
        }
        let _write = self.lock.write();
        let _mark = WriterMark::set(&self.writer);
        f()
    }

    fn shared<R>(&self, f: impl FnOnce() -> R) -> R {
        if self.held_by_current_thread() {
            return f();
        }
        let _read = self.lock.read();
        f()
    }

    // Caller holds the write lock.
    fn create_locked(
        &self,
        map: &ScopeMap,
        context: &dyn BeanCreationContext,
    ) -> ScopeResult<BeanInstance> {
        let tag = self.provider.scope_tag();
        let started = Instant::now();

        let created = match context.create() {
            Ok(created) => created,
            Err(err) => {
                metrics::record_bean_creation_failure(tag.name());
                warn!(scope = %tag, bean_id = %context.id(), error = %err, "Bean creation failed");
                return Err(err.into());
            }
        };

        metrics::record_bean_created(tag.name(), started.elapsed());
        debug!(
            scope = %tag,
            bean_id = %created.id(),
            bean = created.definition().name(),
            "Created scoped bean"
        );

        let bean = created.bean().clone();
        map.insert(created);
        Ok(bean)
    }

    // Caller holds the write lock.
    pub(crate) fn destroy_locked(&self, beans: Vec<CreatedBean>) -> usize {
        let count = beans.len();
        for created in beans {
            self.close_bean(created);
        }
        count
    }

    fn close_bean(&self, created: CreatedBean) {
        let tag = self.provider.scope_tag();
        let id = created.id().clone();
        match created.close() {
            Ok(()) => {
                metrics::record_bean_destroyed(tag.name());
                debug!(scope = %tag, bean_id = %id, "Destroyed scoped bean");
            }
            Err(err) => {
                metrics::record_bean_destruction_failure(tag.name());
                self.provider.handle_destruction_error(&err);
            }
        }
    }

    fn nested_get_or_create(&self, context: &dyn BeanCreationContext) -> ScopeResult<BeanInstance> {
        let map = self.provider.scope_map(true)?;
        match map.get(context.id()) {
            Some(bean) => Ok(bean),
            None => self.create_locked(&map, context),
        }
    }
}

impl<P: ScopeMapProvider> CustomScope for ConcurrentScope<P> {
    fn scope_tag(&self) -> ScopeTag {
        self.provider.scope_tag()
    }

    fn get_or_create(&self, context: &dyn BeanCreationContext) -> ScopeResult<BeanInstance> {
        if self.held_by_current_thread() {
            return self.nested_get_or_create(context);
        }

        let id = context.id();
        {
            let _read = self.lock.read();
            if let Some(bean) = self.provider.scope_map(true)?.get(id) {
                return Ok(bean);
            }
        }

        let write = self.lock.write();
        let mark = WriterMark::set(&self.writer);

        let map = self.provider.scope_map(true)?;
        if let Some(bean) = map.get(id) {
            return Ok(bean);
        }
        let bean = self.create_locked(&map, context)?;

        drop(mark);
        let _read = RwLockWriteGuard::downgrade(write);
        Ok(bean)
    }

    fn remove(&self, id: &BeanIdentifier) -> Option<BeanInstance> {
        self.exclusive(|| {
            let map = match self.provider.scope_map(false) {
                Ok(map) => map,
                Err(err) => {
                    debug!(
                        scope = %self.provider.scope_tag(),
                        bean_id = %id,
                        error = %err,
                        "Nothing to remove"
                    );
                    return None;
                }
            };
            let created = map.take(id)?;
            let bean = created.bean().clone();
            self.close_bean(created);
            Some(bean)
        })
    }

    fn find_bean_registration(&self, bean: &BeanInstance) -> Option<BeanRegistration> {
        self.shared(|| self.provider.scope_map(false).ok()?.find(bean))
    }

    fn find_bean_registration_for(&self, definition: &BeanDefinition) -> Option<BeanRegistration> {
        self.shared(|| self.provider.scope_map(false).ok()?.find_for(definition))
    }

    fn as_lifecycle(&self) -> Option<&dyn LifeCycle> {
        Some(self)
    }
}

impl<P: ScopeMapProvider> LifeCycle for ConcurrentScope<P> {
    fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    fn stop(&self) {
        let tag = self.provider.scope_tag();
        let destroyed = self.exclusive(|| {
            let destroyed = match self.provider.maps_on_stop() {
                Ok(maps) => maps
                    .iter()
                    .map(|map| self.destroy_locked(map.drain_where(|_| true)))
                    .sum(),
                Err(err) => {
                    debug!(scope = %tag, error = %err, "No scope map to destroy");
                    0
                }
            };
            self.provider.close();
            destroyed
        });
        self.running.store(false, Ordering::SeqCst);
        info!(scope = %tag, bean_count = destroyed, "Scope stopped");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl<P> fmt::Debug for ConcurrentScope<P>
where
    P: ScopeMapProvider,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentScope")
            .field("tag", &self.provider.scope_tag())
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}
