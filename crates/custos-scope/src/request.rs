//! Request scope.
//!
//! Beans live in the [`RequestAttributes`] of the request being served. The
//! scope finds the current request through a [`RequestBinding`]; the default
//! binding, [`ThreadBoundRequests`], associates a request with the thread
//! handling it for as long as a [`RequestGuard`] is alive.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use custos_core::{CustomScope, FactoryContext};
//! use custos_scope::{RequestAttributes, RequestScope, ThreadBoundRequests};
//!
//! let requests = ThreadBoundRequests::new();
//! let scope = RequestScope::request(requests.clone());
//! let context = FactoryContext::new("auditLog", || Ok::<_, std::io::Error>(Vec::<String>::new()));
//!
//! // Outside a request the scope is unavailable.
//! assert!(scope.get_or_create(&context).is_err());
//!
//! let request = Arc::new(RequestAttributes::new());
//! {
//!     let _guard = requests.enter(request.clone());
//!     scope.get_or_create(&context).unwrap();
//! }
//!
//! assert_eq!(scope.request_terminated(&request), 1);
//! ```

use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use custos_core::{ScopeError, ScopeResult, ScopeTag};
use dashmap::DashMap;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{ConcurrentScope, ScopeMap, ScopeMapProvider};

/// Scope whose beans live as long as the request that created them.
pub type RequestScope<B = ThreadBoundRequests> = ConcurrentScope<RequestScopeMaps<B>>;

/// Unique request identifier (UUID v7, time-ordered).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a new request ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the inner UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for RequestId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

/// Per-request state holding the request's beans.
#[derive(Debug, Default)]
pub struct RequestAttributes {
    id: RequestId,
    beans: ScopeMap,
}

impl RequestAttributes {
    /// Creates attributes for a new request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates attributes for a request with a known ID.
    #[must_use]
    pub fn with_id(id: RequestId) -> Self {
        Self {
            id,
            beans: ScopeMap::new(),
        }
    }

    /// Returns the request ID.
    #[must_use]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns the request's beans.
    #[must_use]
    pub fn beans(&self) -> &ScopeMap {
        &self.beans
    }
}

/// Resolves the request being served by the caller.
pub trait RequestBinding: Send + Sync + 'static {
    /// Returns the current request, or `None` outside a request.
    fn current_request(&self) -> Option<Arc<RequestAttributes>>;
}

/// Binds requests to the threads serving them.
///
/// Clones share the same bindings.
#[derive(Debug, Clone, Default)]
pub struct ThreadBoundRequests {
    bound: Arc<DashMap<ThreadId, Arc<RequestAttributes>>>,
}

impl ThreadBoundRequests {
    /// Creates an empty binding table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `request` to the current thread until the guard drops.
    ///
    /// Entering while another request is bound stacks: the previous request
    /// is restored when the guard drops.
    #[must_use = "the request is unbound as soon as the guard drops"]
    pub fn enter(&self, request: Arc<RequestAttributes>) -> RequestGuard {
        let thread = thread::current().id();
        debug!(request_id = %request.id(), "Entering request");
        let previous = self.bound.insert(thread, request);
        RequestGuard {
            bound: self.bound.clone(),
            thread,
            previous,
            _not_send: PhantomData,
        }
    }
}

impl RequestBinding for ThreadBoundRequests {
    fn current_request(&self) -> Option<Arc<RequestAttributes>> {
        self.bound
            .get(&thread::current().id())
            .map(|request| request.value().clone())
    }
}

/// Keeps a request bound to the current thread.
///
/// Must be dropped on the thread that created it.
pub struct RequestGuard {
    bound: Arc<DashMap<ThreadId, Arc<RequestAttributes>>>,
    thread: ThreadId,
    previous: Option<Arc<RequestAttributes>>,
    _not_send: PhantomData<Rc<()>>,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(previous) => {
                self.bound.insert(self.thread, previous);
            }
            None => {
                self.bound.remove(&self.thread);
            }
        }
    }
}

impl fmt::Debug for RequestGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestGuard")
            .field("thread", &self.thread)
            .field("restores_previous", &self.previous.is_some())
            .finish()
    }
}

/// Supplies the current request's bean map.
#[derive(Debug)]
pub struct RequestScopeMaps<B> {
    binding: B,
}

impl<B: RequestBinding> RequestScopeMaps<B> {
    /// Returns the request binding.
    pub fn binding(&self) -> &B {
        &self.binding
    }
}

impl<B: RequestBinding> ScopeMapProvider for RequestScopeMaps<B> {
    fn scope_tag(&self) -> ScopeTag {
        ScopeTag::REQUEST
    }

    fn scope_map(&self, _for_creation: bool) -> ScopeResult<ScopeMap> {
        self.binding
            .current_request()
            .map(|request| request.beans().clone())
            .ok_or_else(|| {
                ScopeError::unavailable(
                    ScopeTag::REQUEST,
                    "no request is bound to the current thread",
                )
            })
    }
}

impl<B: RequestBinding> ConcurrentScope<RequestScopeMaps<B>> {
    /// Creates a request scope resolving requests through `binding`.
    pub fn request(binding: B) -> Self {
        Self::new(RequestScopeMaps { binding })
    }

    /// Destroys the beans of a finished request.
    ///
    /// Returns the number of beans destroyed.
    pub fn request_terminated(&self, request: &RequestAttributes) -> usize {
        let destroyed = self.destroy(request.beans());
        debug!(request_id = %request.id(), bean_count = destroyed, "Request terminated");
        destroyed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use custos_core::fixtures::Probe;
    use custos_core::{same_instance, BeanIdentifier, CustomScope};

    #[test]
    fn test_unavailable_outside_request() {
        let probe = Probe::new();
        let scope = RequestScope::request(ThreadBoundRequests::new());

        let err = scope.get_or_create(probe.context("x").as_ref()).unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(probe.created(), 0);
    }

    #[test]
    fn test_remove_outside_request_is_none() {
        let scope = RequestScope::request(ThreadBoundRequests::new());
        assert!(scope.remove(&BeanIdentifier::new("x")).is_none());
    }

    #[test]
    fn test_requests_are_isolated() {
        let probe = Probe::new();
        let requests = ThreadBoundRequests::new();
        let scope = RequestScope::request(requests.clone());
        let context = probe.context("session");

        let first_request = Arc::new(RequestAttributes::new());
        let second_request = Arc::new(RequestAttributes::new());

        let first = {
            let _guard = requests.enter(first_request.clone());
            scope.get_or_create(context.as_ref()).unwrap()
        };
        let second = {
            let _guard = requests.enter(second_request.clone());
            scope.get_or_create(context.as_ref()).unwrap()
        };

        assert!(!same_instance(&first, &second));
        assert_eq!(first_request.beans().len(), 1);
        assert_eq!(second_request.beans().len(), 1);
    }

    #[test]
    fn test_nested_enter_restores_previous() {
        let requests = ThreadBoundRequests::new();
        let outer = Arc::new(RequestAttributes::new());
        let inner = Arc::new(RequestAttributes::new());

        let _outer_guard = requests.enter(outer.clone());
        {
            let _inner_guard = requests.enter(inner.clone());
            assert_eq!(requests.current_request().unwrap().id(), inner.id());
        }
        assert_eq!(requests.current_request().unwrap().id(), outer.id());
    }

    #[test]
    fn test_guard_drop_unbinds() {
        let requests = ThreadBoundRequests::new();
        {
            let _guard = requests.enter(Arc::new(RequestAttributes::new()));
            assert!(requests.current_request().is_some());
        }
        assert!(requests.current_request().is_none());
    }

    #[test]
    fn test_request_terminated_destroys_beans() {
        let probe = Probe::new();
        let requests = ThreadBoundRequests::new();
        let scope = RequestScope::request(requests.clone());
        let request = Arc::new(RequestAttributes::new());

        {
            let _guard = requests.enter(request.clone());
            scope.get_or_create(probe.context("a").as_ref()).unwrap();
            scope.get_or_create(probe.failing_destroy_context("b").as_ref()).unwrap();
        }

        assert_eq!(scope.request_terminated(&request), 2);
        assert_eq!(probe.destroy_attempts(), 2);
        assert_eq!(probe.destroyed(), 1);
        assert!(request.beans().is_empty());
    }

    #[test]
    fn test_request_id_display() {
        let uuid = Uuid::now_v7();
        let id = RequestId::from(uuid);
        assert_eq!(id.to_string(), uuid.to_string());
        assert_eq!(id.as_uuid(), &uuid);
    }
}
