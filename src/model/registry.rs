use crate::config::Config;
use crate::context::{AppContext, LibraryContext};
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::model::{Collection, Entity, EntityResource};
use std::any::{Any, type_name};
use std::cell::OnceCell;
use std::sync::Arc;

/// Resolves models, resources and collections for entity type `E` in one library.
///
/// The resource is created on first use and reused afterwards; collections are
/// built fresh on every call. A registry is meant for one thread: workers each
/// hold their own.
pub struct EntityRegistry<E: Entity> {
    app: AppContext,
    library: Arc<LibraryContext>,
    resource: OnceCell<Arc<EntityResource<E>>>,
}

impl<E: Entity> EntityRegistry<E> {
    /// Create a registry for `E` in the given library.
    pub fn new(app: AppContext, library: Arc<LibraryContext>) -> Self {
        Self {
            app,
            library,
            resource: OnceCell::new(),
        }
    }

    /// Fresh registry for another entity type on the same contexts.
    pub fn for_entity<F: Entity>(&self) -> EntityRegistry<F> {
        EntityRegistry::new(self.app.clone(), Arc::clone(&self.library))
    }

    /// Application context.
    pub fn app(&self) -> &AppContext {
        &self.app
    }

    /// Application configuration.
    pub fn config(&self) -> &Config {
        &self.app.config
    }

    /// Library this registry reads from.
    pub fn library(&self) -> &Arc<LibraryContext> {
        &self.library
    }

    /// Library database connection.
    pub fn connection(&self) -> &Database {
        self.library.db()
    }

    /// Construct a new instance of the named model.
    pub fn get_model(&self, name: &str) -> Result<Box<dyn Any + Send>> {
        let factory = self.app.catalog.resolve(name)?;
        Ok(factory(&self.library))
    }

    /// Construct a new instance of the named model as `T`.
    pub fn get_model_as<T: Any>(&self, name: &str) -> Result<T> {
        self.get_model(name)?
            .downcast::<T>()
            .map(|model| *model)
            .map_err(|_| {
                AppError::Resolution(format!("{} is not a {}", name, type_name::<T>()))
            })
    }

    /// Resource of `E`, created on first call.
    pub fn resource(&self) -> Result<Arc<EntityResource<E>>> {
        if let Some(resource) = self.resource.get() {
            return Ok(Arc::clone(resource));
        }

        let resource: EntityResource<E> = self.get_model_as(&E::KIND.resource_name())?;
        tracing::debug!(entity = %E::KIND, library = %self.library.name(), "Resource resolved");
        Ok(Arc::clone(self.resource.get_or_init(|| Arc::new(resource))))
    }

    /// New collection of `E`.
    pub fn collection(&self) -> Result<Collection<E>> {
        self.get_model_as(&E::KIND.collection_name())
    }

    /// Load one entity by id.
    pub fn load(&self, id: i64) -> Result<E> {
        let mut entity: E = self.get_model_as(E::KIND.name())?;
        self.resource()?.load(id, &mut entity)?;
        Ok(entity)
    }
}

impl<E: Entity> Clone for EntityRegistry<E> {
    /// Clones share the contexts but never the resolved resource.
    fn clone(&self) -> Self {
        Self::new(self.app.clone(), Arc::clone(&self.library))
    }
}
