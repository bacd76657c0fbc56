use crate::config::BackendConfig;
use dstore_core::{DatastoreError, Result};
use dstore_storage::{Datastore, MapDatastore, NullDatastore, RedbDatastore};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Builds one backend from its configuration
pub type BackendFactory = fn(&BackendConfig) -> Result<Arc<dyn Datastore>>;

/// Backend types a mount table may name, keyed by their `type` string
pub struct BackendRegistry {
    factories: BTreeMap<String, BackendFactory>,
}

impl BackendRegistry {
    /// Registry with no backend types
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registry with the built-in `memory`, `null` and `redb` backends
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", memory);
        registry.register("null", null);
        registry.register("redb", redb);
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: BackendFactory) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn build(&self, config: &BackendConfig) -> Result<Arc<dyn Datastore>> {
        let factory = self.factories.get(&config.kind).ok_or_else(|| {
            DatastoreError::configuration(
                format!("Unknown backend type '{}'", config.kind),
                format!(
                    "Use one of: {}",
                    self.kinds().collect::<Vec<_>>().join(", ")
                ),
            )
        })?;
        debug!("Building {} backend", config.kind);
        factory(config)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn memory(_config: &BackendConfig) -> Result<Arc<dyn Datastore>> {
    Ok(Arc::new(MapDatastore::new()))
}

fn null(_config: &BackendConfig) -> Result<Arc<dyn Datastore>> {
    Ok(Arc::new(NullDatastore::new()))
}

fn redb(config: &BackendConfig) -> Result<Arc<dyn Datastore>> {
    let path = config.path.as_ref().ok_or_else(|| {
        DatastoreError::configuration(
            "The redb backend needs a path",
            "Set backend.path to the database file",
        )
    })?;
    Ok(Arc::new(RedbDatastore::new(path)?))
}
