//! Logical entity registry.
//!
//! Entities are plain names (`"EmailTemplate"`) that callers use instead of
//! collection names. The registry is built once at startup and handed to the
//! engine; nothing is registered globally.
//!
//! ```rust
//! use quarry_mongodb::EntityRegistry;
//!
//! let registry = EntityRegistry::builder()
//!     .register("Admin")
//!     .register_with("EmailTemplate", |handle| {
//!         handle.timestamps(true).relation("createdBy", "Admin")
//!     })
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(registry.resolve("EmailTemplate").unwrap().collection(), "emailtemplates");
//! assert!(registry.resolve("Missing").is_err());
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use indexmap::IndexMap;
use smol_str::SmolStr;

use crate::error::{QueryError, QueryResult};

/// Default collection name for an entity: lower-cased, with an `s` suffix.
pub fn default_collection_name(entity: &str) -> String {
    format!("{}s", entity.to_lowercase())
}

/// A resolved entity: where it lives and how it is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionHandle {
    entity: SmolStr,
    collection: String,
    timestamps: bool,
    relations: IndexMap<String, SmolStr>,
}

impl CollectionHandle {
    /// Logical entity name.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Backing collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Whether writes stamp `createdAt`/`updatedAt`.
    pub fn timestamps(&self) -> bool {
        self.timestamps
    }

    /// Entity referenced by a relation path, if declared.
    pub fn relation(&self, path: &str) -> Option<&str> {
        self.relations.get(path).map(SmolStr::as_str)
    }
}

/// Builder for a single [`CollectionHandle`].
#[derive(Debug)]
pub struct CollectionHandleBuilder {
    entity: SmolStr,
    collection: Option<String>,
    timestamps: bool,
    relations: IndexMap<String, SmolStr>,
}

impl CollectionHandleBuilder {
    fn new(entity: &str) -> Self {
        Self {
            entity: SmolStr::new(entity),
            collection: None,
            timestamps: false,
            relations: IndexMap::new(),
        }
    }

    /// Override the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.collection = Some(name.into());
        self
    }

    /// Enable or disable write timestamps.
    pub fn timestamps(mut self, enabled: bool) -> Self {
        self.timestamps = enabled;
        self
    }

    /// Declare a relation path pointing at another entity.
    pub fn relation(mut self, path: impl Into<String>, target: impl AsRef<str>) -> Self {
        self.relations
            .insert(path.into(), SmolStr::new(target.as_ref()));
        self
    }

    fn build(self) -> CollectionHandle {
        let collection = self
            .collection
            .unwrap_or_else(|| default_collection_name(&self.entity));
        CollectionHandle {
            entity: self.entity,
            collection,
            timestamps: self.timestamps,
            relations: self.relations,
        }
    }
}

/// Immutable mapping from entity name to collection handle.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<SmolStr, Arc<CollectionHandle>>,
}

impl EntityRegistry {
    /// Create a builder.
    pub fn builder() -> EntityRegistryBuilder {
        EntityRegistryBuilder::default()
    }

    /// Resolve an entity, failing with [`QueryError::ModelNotFound`].
    pub fn resolve(&self, entity: &str) -> QueryResult<&CollectionHandle> {
        self.entities
            .get(entity)
            .map(Arc::as_ref)
            .ok_or_else(|| QueryError::model_not_found(entity))
    }

    /// Check whether an entity is registered.
    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Builder for [`EntityRegistry`].
#[derive(Debug, Default)]
pub struct EntityRegistryBuilder {
    handles: Vec<CollectionHandleBuilder>,
}

impl EntityRegistryBuilder {
    /// Register an entity with default settings.
    pub fn register(self, entity: &str) -> Self {
        self.register_with(entity, |handle| handle)
    }

    /// Register an entity, customizing its handle.
    pub fn register_with(
        mut self,
        entity: &str,
        configure: impl FnOnce(CollectionHandleBuilder) -> CollectionHandleBuilder,
    ) -> Self {
        self.handles
            .push(configure(CollectionHandleBuilder::new(entity)));
        self
    }

    /// Build the registry.
    ///
    /// Fails when an entity is registered twice or a relation targets an
    /// entity that is not registered.
    pub fn build(self) -> QueryResult<EntityRegistry> {
        let mut entities = HashMap::with_capacity(self.handles.len());
        for builder in self.handles {
            let handle = builder.build();
            let name = handle.entity.clone();
            if entities.insert(name.clone(), Arc::new(handle)).is_some() {
                return Err(QueryError::config(format!(
                    "entity {} registered twice",
                    name
                )));
            }
        }

        for handle in entities.values() {
            for (path, target) in &handle.relations {
                if !entities.contains_key(target) {
                    return Err(QueryError::config(format!(
                        "relation {}.{} targets unregistered entity {}",
                        handle.entity, path, target
                    )));
                }
            }
        }

        Ok(EntityRegistry { entities })
    }
}
