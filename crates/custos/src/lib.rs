//! # Custos
//!
//! **Concurrent custom-scope bean lifecycle management**
//!
//! Custos creates, caches and destroys beans inside named lifecycle scopes:
//!
//! - **Refreshable** – beans rebuilt when the configuration they read changes
//! - **Thread-local** – one bean per OS thread
//! - **Request** – one bean per in-flight request
//!
//! Every scope guarantees that concurrent callers create a bean at most once,
//! that a bean is fully built before anyone else sees it, and that one failing
//! destructor never stops the others.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use custos::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new()
//!         .with_optional_file("custos.toml")?
//!         .with_env_prefix("CUSTOS")
//!         .load()?;
//!     custos::init_telemetry(&config)?;
//!
//!     let requests = ThreadBoundRequests::new();
//!     let scopes = ScopeContext::from_config(&config, requests.clone());
//!
//!     let request = std::sync::Arc::new(RequestAttributes::new());
//!     {
//!         let _guard = requests.enter(request.clone());
//!         let audit = FactoryContext::new("auditLog", || Ok::<_, std::io::Error>(Vec::<String>::new()));
//!         scopes.get_or_create(ScopeTag::REQUEST, &audit)?;
//!     }
//!     if let Some(scope) = scopes.request_scope() {
//!         scope.request_terminated(&request);
//!     }
//!
//!     scopes.shutdown();
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ScopeContext ── ScopeRegistry ── CustomScope (tag → scope)
//!                                    │
//!                          ConcurrentScope<P: ScopeMapProvider>
//!                                    │
//!                RefreshableBeans · ThreadScopeMaps · RequestScopeMaps
//! ```

#![doc(html_root_url = "https://docs.rs/custos/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod context;

pub use context::{init_telemetry, RefreshOutcome, ScopeContext};

// Re-export core contracts
pub use custos_core as core;

// Re-export scope engine and built-in scopes
pub use custos_scope as scope;

// Re-export configuration
pub use custos_config as config;

// Re-export telemetry
pub use custos_telemetry as telemetry;

pub use custos_scope::{RequestAttributes, ThreadBoundRequests};

/// Prelude module for convenient imports.
///
/// ```rust
/// use custos::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{RefreshOutcome, ScopeContext};

    pub use custos_core::{
        BeanCreationContext, BeanDefinition, BeanIdentifier, BeanInstance, CreatedBean,
        CustomScope, CustomScopeExt, FactoryContext, LifeCycle, ScopeError, ScopeRegistry,
        ScopeResult, ScopeTag,
    };

    pub use custos_scope::{
        ConcurrentScope, RefreshEvent, RefreshScope, RequestAttributes, RequestBinding,
        RequestScope, ScopeMap, ScopeMapProvider, ThreadBoundRequests, ThreadLocalScope,
    };

    pub use custos_config::{ConfigLoader, CustosConfig, PropertySnapshot};
}
