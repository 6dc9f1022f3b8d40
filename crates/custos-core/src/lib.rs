//! # Custos Core
//!
//! Contracts shared by every Custos scope.
//!
//! This crate provides the foundational types the scope engine is built on:
//!
//! - [`BeanIdentifier`] / [`BeanDefinition`] - Bean identity and metadata
//! - [`CreatedBean`] - A live bean plus its disposal operation
//! - [`BeanCreationContext`] - Container-supplied factory for a bean
//! - [`CustomScope`] - The public contract every scope implements
//! - [`LifeCycle`] - Start/stop protocol driven at shutdown
//! - [`ScopeRegistry`] - Scopes keyed by [`ScopeTag`]
//! - [`ScopeError`] - Errors surfaced to callers

#![doc(html_root_url = "https://docs.rs/custos-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod bean;
mod created;
mod error;
pub mod fixtures;
mod lifecycle;
mod registry;
mod scope;

pub use bean::{same_instance, BeanDefinition, BeanIdentifier, BeanInstance, BeanRegistration};
pub use created::{BeanCreationContext, CreatedBean, FactoryContext};
pub use error::{BeanCreationError, BeanDestructionError, BoxError, ScopeError, ScopeResult};
pub use lifecycle::LifeCycle;
pub use registry::ScopeRegistry;
pub use scope::{CustomScope, CustomScopeExt, ScopeTag};
