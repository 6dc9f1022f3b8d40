//! Created beans and the contexts that create them.
//!
//! The container hands a scope a [`BeanCreationContext`]; on a cache miss the
//! scope calls [`BeanCreationContext::create`] and stores the returned
//! [`CreatedBean`] until it is removed or the scope shuts down.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::bean::{BeanDefinition, BeanIdentifier, BeanInstance, BeanRegistration};
use crate::error::{BeanCreationError, BeanDestructionError, BoxError};

type PreDestroy = Box<dyn FnOnce() -> Result<(), BoxError> + Send + Sync>;

/// A live bean plus the operation that disposes of it.
///
/// [`close`](Self::close) consumes the bean, so it can run at most once.
pub struct CreatedBean {
    id: BeanIdentifier,
    definition: Arc<BeanDefinition>,
    bean: BeanInstance,
    pre_destroy: Option<PreDestroy>,
}

impl CreatedBean {
    /// Wraps an instance that needs no pre-destroy behaviour.
    pub fn new<T: Any + Send + Sync>(
        id: BeanIdentifier,
        definition: Arc<BeanDefinition>,
        bean: Arc<T>,
    ) -> Self {
        Self {
            id,
            definition,
            bean,
            pre_destroy: None,
        }
    }

    /// Wraps an instance with a hook that runs when the bean is closed.
    ///
    /// # Example
    ///
    /// ```
    /// use custos_core::{BeanDefinition, BeanIdentifier, CreatedBean};
    /// use std::sync::Arc;
    /// use std::sync::atomic::{AtomicBool, Ordering};
    ///
    /// let closed = Arc::new(AtomicBool::new(false));
    /// let flag = closed.clone();
    ///
    /// let bean = CreatedBean::with_pre_destroy(
    ///     BeanIdentifier::new("pool"),
    ///     Arc::new(BeanDefinition::of::<String>("pool")),
    ///     Arc::new(String::from("pool")),
    ///     move |_pool: &String| {
    ///         flag.store(true, Ordering::SeqCst);
    ///         Ok::<_, std::io::Error>(())
    ///     },
    /// );
    ///
    /// bean.close().unwrap();
    /// assert!(closed.load(Ordering::SeqCst));
    /// ```
    pub fn with_pre_destroy<T, F, E>(
        id: BeanIdentifier,
        definition: Arc<BeanDefinition>,
        bean: Arc<T>,
        pre_destroy: F,
    ) -> Self
    where
        T: Any + Send + Sync,
        F: FnOnce(&T) -> Result<(), E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        let target = bean.clone();
        let hook: PreDestroy = Box::new(move || pre_destroy(&target).map_err(Into::into));
        Self {
            id,
            definition,
            bean,
            pre_destroy: Some(hook),
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

    /// Returns the live instance.
    pub fn bean(&self) -> &BeanInstance {
        &self.bean
    }

    /// Returns a read-only registration view of this bean.
    pub fn registration(&self) -> BeanRegistration {
        BeanRegistration::new(self.id.clone(), self.definition.clone(), self.bean.clone())
    }

    /// Disposes of the bean, running its pre-destroy hook.
    ///
    /// The instance itself is released once the last handle to it drops.
    pub fn close(self) -> Result<(), BeanDestructionError> {
        let Self {
            id,
            definition,
            pre_destroy,
            ..
        } = self;
        match pre_destroy {
            Some(hook) => hook()
                .map_err(|e| BeanDestructionError::with_source(id, definition.name(), e)),
            None => Ok(()),
        }
    }
}

impl fmt::Debug for CreatedBean {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreatedBean")
            .field("id", &self.id)
            .field("definition", &self.definition.name())
            .field("has_pre_destroy", &self.pre_destroy.is_some())
            .finish()
    }
}

/// Knows how to materialise a bean for one identifier.
///
/// Supplied by the container; scopes only call it.
pub trait BeanCreationContext: Send + Sync {
    /// The identifier the new bean will be stored under.
    fn id(&self) -> &BeanIdentifier;

    /// The definition of the bean to create.
    fn definition(&self) -> &Arc<BeanDefinition>;

    /// Creates a new bean.
    fn create(&self) -> Result<CreatedBean, BeanCreationError>;
}

type TypedPreDestroy<T> = Arc<dyn Fn(&T) -> Result<(), BoxError> + Send + Sync>;

/// A [`BeanCreationContext`] backed by a closure.
///
/// # Example
///
/// ```
/// use custos_core::{BeanCreationContext, FactoryContext};
///
/// let context = FactoryContext::new("counter", || Ok::<_, std::io::Error>(0_u64));
/// let created = context.create().unwrap();
///
/// assert_eq!(created.id().name(), "counter");
/// assert_eq!(created.bean().downcast_ref::<u64>(), Some(&0));
/// ```
pub struct FactoryContext<T, F> {
    id: BeanIdentifier,
    definition: Arc<BeanDefinition>,
    factory: F,
    pre_destroy: Option<TypedPreDestroy<T>>,
    _bean: PhantomData<fn() -> T>,
}

impl<T, F, E> FactoryContext<T, F>
where
    T: Any + Send + Sync,
    F: Fn() -> Result<T, E> + Send + Sync,
    E: Into<BoxError>,
{
    /// Creates a context whose identifier and definition share `name`.
    pub fn new(name: impl AsRef<str>, factory: F) -> Self {
        let name = name.as_ref();
        Self::with_definition(
            BeanIdentifier::new(name),
            Arc::new(BeanDefinition::of::<T>(name)),
            factory,
        )
    }

    /// Creates a context for an explicit identifier and definition.
    pub fn with_definition(
        id: BeanIdentifier,
        definition: Arc<BeanDefinition>,
        factory: F,
    ) -> Self {
        Self {
            id,
            definition,
            factory,
            pre_destroy: None,
            _bean: PhantomData,
        }
    }

    /// Registers a hook run when beans from this context are closed.
    #[must_use]
    pub fn on_destroy<D, DE>(mut self, hook: D) -> Self
    where
        D: Fn(&T) -> Result<(), DE> + Send + Sync + 'static,
        DE: Into<BoxError>,
    {
        self.pre_destroy = Some(Arc::new(move |bean: &T| hook(bean).map_err(Into::into)));
        self
    }
}

impl<T, F, E> BeanCreationContext for FactoryContext<T, F>
where
    T: Any + Send + Sync,
    F: Fn() -> Result<T, E> + Send + Sync,
    E: Into<BoxError>,
{
    fn id(&self) -> &BeanIdentifier {
        &self.id
    }

    fn definition(&self) -> &Arc<BeanDefinition> {
        &self.definition
    }

    fn create(&self) -> Result<CreatedBean, BeanCreationError> {
        let bean = (self.factory)()
            .map(Arc::new)
            .map_err(|e| BeanCreationError::with_source(self.id.clone(), e))?;

        Ok(match &self.pre_destroy {
            Some(hook) => {
                let hook = hook.clone();
                CreatedBean::with_pre_destroy(
                    self.id.clone(),
                    self.definition.clone(),
                    bean,
                    move |bean: &T| hook(bean),
                )
            }
            None => CreatedBean::new(self.id.clone(), self.definition.clone(), bean),
        })
    }
}

impl<T, F> fmt::Debug for FactoryContext<T, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactoryContext")
            .field("id", &self.id)
            .field("definition", &self.definition.name())
            .finish_non_exhaustive()
    }
}
