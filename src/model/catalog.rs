use crate::context::LibraryContext;
use crate::error::{AppError, Result};
use crate::library::{Author, Book, Serie, Tag};
use crate::model::{Collection, Entity, EntityResource};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

/// Namespace the standard models are registered under.
pub const MODEL_NAMESPACE: &str = "model";

/// Constructor of one model, given the library it operates on.
pub type ModelFactory = fn(&Arc<LibraryContext>) -> Box<dyn Any + Send>;

/// Model factories keyed by name, registered at startup.
#[derive(Default, Clone)]
pub struct ModelCatalog {
    factories: HashMap<String, ModelFactory>,
}

impl ModelCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with every entity type, its resource and its collection.
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        catalog
            .register_entity::<Book>()
            .register_entity::<Author>()
            .register_entity::<Serie>()
            .register_entity::<Tag>();
        catalog
    }

    /// Register `E`, `EResource` and `ECollection` under the model namespace.
    pub fn register_entity<E: Entity>(&mut self) -> &mut Self {
        let kind = E::KIND;
        self.register(namespaced(kind.name()), make_entity::<E>)
            .register(namespaced(&kind.resource_name()), make_resource::<E>)
            .register(namespaced(&kind.collection_name()), make_collection::<E>)
    }

    /// Register a factory under an exact name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, factory: ModelFactory) -> &mut Self {
        self.factories.insert(name.into(), factory);
        self
    }

    /// Remove a factory. Returns whether one was registered.
    ///
    /// Both the exact and the namespaced name are tried.
    pub fn unregister(&mut self, name: &str) -> bool {
        self.factories.remove(name).is_some() || self.factories.remove(&namespaced(name)).is_some()
    }

    /// Find a factory: the literal name first, then the namespaced variant.
    pub fn resolve(&self, name: &str) -> Result<ModelFactory> {
        self.factories
            .get(name)
            .or_else(|| self.factories.get(&namespaced(name)))
            .copied()
            .ok_or_else(|| {
                AppError::Resolution(format!("{} (also tried {})", name, namespaced(name)))
            })
    }

    /// Whether a name resolves.
    pub fn contains(&self, name: &str) -> bool {
        self.resolve(name).is_ok()
    }
}

fn namespaced(name: &str) -> String {
    format!("{}::{}", MODEL_NAMESPACE, name)
}

fn make_entity<E: Entity>(_library: &Arc<LibraryContext>) -> Box<dyn Any + Send> {
    Box::new(E::default())
}

fn make_resource<E: Entity>(library: &Arc<LibraryContext>) -> Box<dyn Any + Send> {
    Box::new(EntityResource::<E>::new(Arc::clone(library)))
}

fn make_collection<E: Entity>(library: &Arc<LibraryContext>) -> Box<dyn Any + Send> {
    Box::new(Collection::<E>::new(Arc::clone(library)))
}
