//! Plugin-based snapshot store registry
//!
//! The registry maps store type names to factories, so the daemon and
//! embedders create stores from configuration without hardcoded if-else
//! chains.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use bronn_core::registry::StoreRegistry;
//! use bronn_core::config::StoreConfig;
//!
//! let registry = StoreRegistry::with_builtin();
//! registry.register("postgres", Box::new(PostgresStoreFactory::new(pool)));
//!
//! let store = registry.create(&StoreConfig::Memory).await?;
//! ```

use dashmap::DashMap;
use std::sync::Arc;

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::store::{FileStoreFactory, MemoryStoreFactory};
use crate::traits::{SnapshotStore, SnapshotStoreFactory};

/// Registry of snapshot store factories
///
/// ## Thread Safety
///
/// Registration and creation may happen concurrently from any task.
#[derive(Default)]
pub struct StoreRegistry {
    factories: DashMap<String, Arc<dyn SnapshotStoreFactory>>,
}

impl StoreRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the `memory` and `file` stores registered
    pub fn with_builtin() -> Self {
        let registry = Self::new();
        registry.register("memory", Box::new(MemoryStoreFactory));
        registry.register("file", Box::new(FileStoreFactory));
        registry
    }

    /// Register a store factory, replacing any factory of the same name
    pub fn register(&self, name: impl Into<String>, factory: Box<dyn SnapshotStoreFactory>) {
        self.factories.insert(name.into(), Arc::from(factory));
    }

    /// Create a snapshot store from configuration
    ///
    /// # Returns
    ///
    /// - `Ok(Box<dyn SnapshotStore>)`: Created store instance
    /// - `Err(Error)`: If the store type is not registered or creation fails
    pub async fn create(&self, config: &StoreConfig) -> Result<Box<dyn SnapshotStore>> {
        config.validate()?;

        let store_type = config.type_name();
        // Clone the Arc out so no shard lock is held across the await
        let factory = self
            .factories
            .get(store_type)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::config(format!("Unknown store type: {}", store_type)))?;

        let config_json = match config {
            StoreConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        factory.create(&config_json).await
    }

    /// List all registered store types
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Check if a store type is registered
    pub fn has(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}
