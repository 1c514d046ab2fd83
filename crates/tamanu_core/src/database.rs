//! Database facade.

use crate::catalog;
use crate::config::Config;
use crate::direction::SyncDirection;
use crate::error::CoreResult;
use crate::facts::{LocalSystemFacts, SyncTicks};
use crate::lock::TypeLocks;
use crate::model::Model;
use crate::schema::SchemaRegistry;
use std::fmt;
use std::sync::Arc;
use tamanu_storage::RecordStore;

struct Inner {
    store: Arc<dyn RecordStore>,
    registry: SchemaRegistry,
    locks: TypeLocks,
    config: Config,
    facts: LocalSystemFacts,
}

/// The main sync metadata handle.
///
/// `SyncDatabase` ties together:
/// - The storage collaborator rows are read from and written to
/// - The registry of entity schemas
/// - One exclusive lock per entity type
/// - The device-local facts table (current sync tick, pull cursors)
///
/// Handles are cheap to clone; clones share locks and store.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use tamanu_core::{SyncDatabase, SyncableRecord, UploadQuery};
/// use tamanu_storage::InMemoryStore;
///
/// let db = SyncDatabase::with_catalog(Arc::new(InMemoryStore::new())).unwrap();
/// let encounters = db.model("encounters").unwrap();
///
/// let mut encounter = SyncableRecord::new().with("encounterType", "clinic");
/// encounters.create(&mut encounter).unwrap();
///
/// let page = encounters.find_marked_for_upload(&UploadQuery::new("encounter")).unwrap();
/// assert_eq!(page.len(), 1);
/// ```
#[derive(Clone)]
pub struct SyncDatabase {
    inner: Arc<Inner>,
}

impl fmt::Debug for SyncDatabase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncDatabase")
            .field("types", &self.inner.registry.len())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SyncDatabase {
    /// Creates a database over `store` with the given schemas.
    pub fn new(store: Arc<dyn RecordStore>, registry: SchemaRegistry, config: Config) -> Self {
        let facts = LocalSystemFacts::new(Arc::clone(&store));
        Self {
            inner: Arc::new(Inner {
                store,
                registry,
                locks: TypeLocks::new(),
                config,
                facts,
            }),
        }
    }

    /// Creates a database over `store` with the Tamanu catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if a catalog schema is inconsistent.
    pub fn with_catalog(store: Arc<dyn RecordStore>) -> CoreResult<Self> {
        Ok(Self::new(store, catalog::tamanu_catalog()?, Config::default()))
    }

    /// Returns the model of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::UnknownEntityType`](crate::CoreError::UnknownEntityType)
    /// if no schema is registered for it.
    pub fn model(&self, table: &str) -> CoreResult<Model> {
        let schema = self.inner.registry.require(table)?;
        Ok(Model::new(self.clone(), schema))
    }

    /// Returns every model, in table order.
    pub fn models(&self) -> Vec<Model> {
        self.inner
            .registry
            .iter()
            .map(|schema| Model::new(self.clone(), Arc::clone(schema)))
            .collect()
    }

    /// Returns the models taking part in a sync in `direction`.
    pub fn models_for_direction(&self, direction: SyncDirection) -> Vec<Model> {
        self.inner
            .registry
            .for_direction(direction)
            .into_iter()
            .map(|schema| Model::new(self.clone(), schema))
            .collect()
    }

    /// The storage collaborator.
    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.inner.store
    }

    /// The schema registry.
    pub fn registry(&self) -> &SchemaRegistry {
        &self.inner.registry
    }

    /// The per-type locks.
    pub fn locks(&self) -> &TypeLocks {
        &self.inner.locks
    }

    /// The configuration.
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// The device-local facts.
    pub fn facts(&self) -> &LocalSystemFacts {
        &self.inner.facts
    }

    /// The current sync tick.
    pub fn sync_ticks(&self) -> SyncTicks {
        SyncTicks::new(self.inner.facts.clone())
    }
}
