//! # Custos Scope
//!
//! The concurrent scope engine and the scopes built on it.
//!
//! - [`ConcurrentScope`] - double-checked, lock-protected get-or-create over
//!   a [`ScopeMapProvider`]
//! - [`RefreshScope`] - beans discarded when their configuration changes
//! - [`ThreadLocalScope`] - one bean per OS thread
//! - [`RequestScope`] - one bean per in-flight request
//!
//! # Example
//!
//! ```
//! use custos_core::{CustomScope, FactoryContext, LifeCycle};
//! use custos_scope::{RefreshEvent, RefreshScope};
//!
//! let scope = RefreshScope::refreshable();
//! let context = FactoryContext::new("greeting", || Ok::<_, std::io::Error>(String::from("hello")));
//!
//! let greeting = scope.get_or_create(&context).unwrap();
//! assert_eq!(greeting.downcast_ref::<String>().unwrap(), "hello");
//!
//! scope.refresh(&RefreshEvent::All);
//! scope.stop();
//! ```

#![doc(html_root_url = "https://docs.rs/custos-scope/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod engine;
mod refresh;
mod request;
mod thread_local;

pub use engine::{ConcurrentScope, ScopeMap, ScopeMapProvider};
pub use refresh::{RefreshEvent, RefreshScope, RefreshableBeans};
pub use request::{
    RequestAttributes, RequestBinding, RequestGuard, RequestId, RequestScope, RequestScopeMaps,
    ThreadBoundRequests,
};
pub use thread_local::{ThreadLocalScope, ThreadScopeMaps};
