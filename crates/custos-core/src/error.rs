//! Error types for scope operations.
//!
//! Three failure domains are kept apart:
//!
//! | Condition | Type | Surfaces from |
//! |---|---|---|
//! | No active context (e.g. no request bound) | [`ScopeError::Unavailable`] | creation path only |
//! | Factory failed to build the bean | [`BeanCreationError`] | `get_or_create` |
//! | Pre-destroy hook failed | [`BeanDestructionError`] | destruction hook only |
//!
//! "Not found" is never an error; lookups and removals return `Option`.

use std::error::Error as StdError;

use thiserror::Error;

use crate::bean::BeanIdentifier;
use crate::scope::ScopeTag;

/// Boxed error produced by user-supplied factories and hooks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Result type alias using [`ScopeError`].
pub type ScopeResult<T> = Result<T, ScopeError>;

/// Errors surfaced to callers of scope operations.
#[derive(Error, Debug)]
pub enum ScopeError {
    /// The scope has no map in the current execution context.
    #[error("scope '{scope}' is not available in the current context: {reason}")]
    Unavailable {
        /// The scope that was asked for its map.
        scope: ScopeTag,
        /// Why the map is unavailable.
        reason: String,
    },

    /// The bean factory failed.
    #[error(transparent)]
    Creation(#[from] BeanCreationError),

    /// A stored bean is not of the requested type.
    #[error("bean '{id}' is not of type {expected}")]
    TypeMismatch {
        /// The identifier of the bean.
        id: BeanIdentifier,
        /// The requested type name.
        expected: &'static str,
    },

    /// No scope is registered for the tag.
    #[error("no scope registered for '{0}'")]
    NotRegistered(ScopeTag),
}

impl ScopeError {
    /// Creates an unavailable-context error.
    pub fn unavailable(scope: ScopeTag, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            scope,
            reason: reason.into(),
        }
    }

    /// Creates a type mismatch error for `T`.
    pub fn type_mismatch<T>(id: BeanIdentifier) -> Self {
        Self::TypeMismatch {
            id,
            expected: std::any::type_name::<T>(),
        }
    }

    /// Returns `true` if the scope map was unavailable.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// A bean factory failed to produce an instance.
#[derive(Error, Debug)]
#[error("failed to create bean '{id}': {message}")]
pub struct BeanCreationError {
    /// The identifier of the bean being created.
    pub id: BeanIdentifier,
    /// Human-readable message.
    pub message: String,
    /// The underlying failure.
    #[source]
    pub source: Option<BoxError>,
}

impl BeanCreationError {
    /// Creates a creation error with a message.
    pub fn new(id: BeanIdentifier, message: impl Into<String>) -> Self {
        Self {
            id,
            message: message.into(),
            source: None,
        }
    }

    /// Creates a creation error wrapping a source error.
    pub fn with_source(id: BeanIdentifier, source: impl Into<BoxError>) -> Self {
        let source = source.into();
        Self {
            id,
            message: source.to_string(),
            source: Some(source),
        }
    }
}

/// A bean's pre-destroy hook failed.
///
/// Never returned from `remove` or `stop`; it is routed to the scope's
/// destruction hook instead.
#[derive(Error, Debug)]
#[error("failed to destroy bean '{id}' ({bean}): {message}")]
pub struct BeanDestructionError {
    /// The identifier of the bean.
    pub id: BeanIdentifier,
    /// The bean definition name.
    pub bean: String,
    /// Human-readable message.
    pub message: String,
    /// The underlying failure.
    #[source]
    pub source: Option<BoxError>,
}

impl BeanDestructionError {
    /// Creates a destruction error wrapping a source error.
    pub fn with_source(id: BeanIdentifier, bean: impl Into<String>, source: BoxError) -> Self {
        Self {
            id,
            bean: bean.into(),
            message: source.to_string(),
            source: Some(source),
        }
    }
}
