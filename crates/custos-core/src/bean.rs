//! Bean identity and metadata.
//!
//! A bean is any `Send + Sync` value owned by a scope. The scope engine never
//! sees concrete types: instances travel as [`BeanInstance`] and are described
//! by an [`Arc<BeanDefinition>`] shared with the surrounding container.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use crate::scope::ScopeTag;

/// A type-erased, shared bean instance.
pub type BeanInstance = Arc<dyn Any + Send + Sync>;

/// Returns `true` if both handles point at the same bean allocation.
///
/// Only the data pointer is compared, so two handles to one instance match
/// even when they were erased through different vtables.
#[must_use]
pub fn same_instance(a: &BeanInstance, b: &BeanInstance) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

/// Unique key of a bean within a scope.
///
/// Identifiers are cheap to clone and compare. Two equal identifiers refer to
/// at most one live entry in any scope map.
///
/// # Example
///
/// ```
/// use custos_core::BeanIdentifier;
///
/// let id = BeanIdentifier::new("datasource");
/// assert_eq!(id.name(), "datasource");
/// assert_eq!(id, BeanIdentifier::from("datasource"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BeanIdentifier(Arc<str>);

impl BeanIdentifier {
    /// Creates an identifier from a name.
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    /// Mints a fresh identifier that is unique for the life of the process.
    pub fn unique() -> Self {
        Self::new(Uuid::now_v7().to_string())
    }

    /// Returns the identifier's name.
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BeanIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BeanIdentifier {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for BeanIdentifier {
    fn from(name: String) -> Self {
        Self(Arc::from(name))
    }
}

impl From<Uuid> for BeanIdentifier {
    fn from(uuid: Uuid) -> Self {
        Self::new(uuid.to_string())
    }
}

/// Metadata describing how a bean is built.
///
/// Definitions are owned by the container and shared read-only with scopes.
///
/// # Example
///
/// ```
/// use custos_core::{BeanDefinition, ScopeTag};
///
/// struct MailClient;
///
/// let definition = BeanDefinition::of::<MailClient>("mailClient")
///     .with_scope(ScopeTag::REFRESHABLE)
///     .with_property_prefix("mail");
///
/// assert!(definition.is_type::<MailClient>());
/// assert!(definition.depends_on_property("mail.host"));
/// assert!(!definition.depends_on_property("mailer.host"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeanDefinition {
    name: String,
    type_name: &'static str,
    type_id: TypeId,
    scope: Option<ScopeTag>,
    property_prefixes: Vec<String>,
}

impl BeanDefinition {
    /// Creates a definition for beans of type `T`.
    pub fn of<T: Any>(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: std::any::type_name::<T>(),
            type_id: TypeId::of::<T>(),
            scope: None,
            property_prefixes: Vec::new(),
        }
    }

    /// Sets the scope that owns beans of this definition.
    #[must_use]
    pub fn with_scope(mut self, scope: ScopeTag) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Declares a configuration property prefix this bean is built from.
    ///
    /// The refresh scope destroys beans whose prefixes match a changed key.
    #[must_use]
    pub fn with_property_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.property_prefixes.push(prefix.into());
        self
    }

    /// Returns the bean name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the Rust type name of the bean.
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Returns the `TypeId` of the bean.
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns `true` if the bean is of type `T`.
    pub fn is_type<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// Returns the owning scope, if declared.
    pub fn scope(&self) -> Option<ScopeTag> {
        self.scope
    }

    /// Returns the declared property prefixes.
    pub fn property_prefixes(&self) -> &[String] {
        &self.property_prefixes
    }

    /// Returns `true` if a change to `key` affects this bean.
    ///
    /// A key matches a prefix when it equals the prefix or continues it with a
    /// `.` separated segment.
    pub fn depends_on_property(&self, key: &str) -> bool {
        self.property_prefixes.iter().any(|prefix| {
            key.strip_prefix(prefix.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
    }
}

/// A read-only view of a bean stored in a scope.
///
/// Produced by reverse lookups; it never owns the bean's lifecycle.
#[derive(Clone)]
pub struct BeanRegistration {
    id: BeanIdentifier,
    definition: Arc<BeanDefinition>,
    bean: BeanInstance,
}

impl BeanRegistration {
    /// Creates a registration view.
    pub fn new(id: BeanIdentifier, definition: Arc<BeanDefinition>, bean: BeanInstance) -> Self {
        Self {
            id,
            definition,
            bean,
        }
    }

    /// Returns the identifier the bean is stored under.
    pub fn id(&self) -> &BeanIdentifier {
        &self.id
    }

    /// Returns the bean definition.
    pub fn definition(&self) -> &Arc<BeanDefinition> {
        &self.definition
    }

    /// Returns the bean instance.
    pub fn bean(&self) -> &BeanInstance {
        &self.bean
    }

    /// Returns the bean downcast to `T`, if it is one.
    pub fn bean_as<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.bean.clone().downcast::<T>().ok()
    }
}

impl fmt::Debug for BeanRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BeanRegistration")
            .field("id", &self.id)
            .field("definition", &self.definition.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct Widget;

    #[test]
    fn test_identifier_equality() {
        assert_eq!(BeanIdentifier::new("a"), BeanIdentifier::from("a"));
        assert_ne!(BeanIdentifier::new("a"), BeanIdentifier::new("b"));
    }

    #[test]
    fn test_unique_identifiers_differ() {
        assert_ne!(BeanIdentifier::unique(), BeanIdentifier::unique());
    }

    #[test]
    fn test_identifier_display() {
        assert_eq!(BeanIdentifier::new("cache").to_string(), "cache");
    }

    #[test]
    fn test_definition_type_info() {
        let definition = BeanDefinition::of::<Widget>("widget");
        assert_eq!(definition.name(), "widget");
        assert!(definition.is_type::<Widget>());
        assert!(!definition.is_type::<String>());
        assert!(definition.type_name().ends_with("Widget"));
        assert_eq!(definition.scope(), None);
    }

    #[test]
    fn test_definition_without_prefixes_never_matches() {
        let definition = BeanDefinition::of::<Widget>("widget");
        assert!(!definition.depends_on_property("anything"));
    }

    #[test]
    fn test_depends_on_property_segment_boundary() {
        let definition = BeanDefinition::of::<Widget>("widget").with_property_prefix("db");
        assert!(definition.depends_on_property("db"));
        assert!(definition.depends_on_property("db.url"));
        assert!(!definition.depends_on_property("dbx.url"));
        assert!(!definition.depends_on_property("cache.db"));
    }

    #[test]
    fn test_same_instance() {
        let a: BeanInstance = Arc::new(Widget);
        let b: BeanInstance = Arc::new(Widget);
        assert!(same_instance(&a, &a.clone()));
        assert!(!same_instance(&a, &b));
    }

    #[test]
    fn test_registration_downcast() {
        let bean: BeanInstance = Arc::new(42_u32);
        let registration = BeanRegistration::new(
            BeanIdentifier::new("answer"),
            Arc::new(BeanDefinition::of::<u32>("answer")),
            bean,
        );
        assert_eq!(registration.bean_as::<u32>().as_deref(), Some(&42));
        assert!(registration.bean_as::<String>().is_none());
    }

    proptest! {
        #[test]
        fn prop_prefix_matches_nested_keys(
            prefix in "[a-z]{1,8}",
            suffix in "[a-z]{1,8}",
        ) {
            let definition = BeanDefinition::of::<Widget>("w").with_property_prefix(prefix.clone());
            let nested = format!("{prefix}.{suffix}");
            let glued = format!("{prefix}{suffix}");
            prop_assert!(definition.depends_on_property(&nested));
            prop_assert!(!definition.depends_on_property(&glued));
        }
    }
}
