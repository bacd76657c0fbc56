use crate::{
    Batch, BatchOp, Batching, CheckedDatastore, Datastore, GcDatastore, PersistentDatastore,
    ScrubbedDatastore,
};
use bytes::Bytes;
use dstore_core::{DatastoreError, Key, Result};
use dstore_query::{naive_query_apply, Entry, Query, Results};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

type Map = Arc<RwLock<BTreeMap<Key, Bytes>>>;

/// Ordered in-memory datastore
///
/// Queries snapshot the matching subtree and evaluate the rest of the query
/// with the naive operators.
#[derive(Clone, Default)]
pub struct MapDatastore {
    values: Map,
}

impl MapDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.values.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.read().is_empty()
    }
}

/// Entry for `key`/`value` shaped by the query's keys-only and sizes flags
pub fn entry_for(query: &Query, key: &str, value: &Bytes) -> Entry {
    if query.keys_only {
        let entry = Entry::key_only(key);
        if query.returns_sizes {
            return entry.with_size(value.len() as i64);
        }
        return entry;
    }
    Entry::new(key, value.clone())
}

impl Datastore for MapDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        debug!("Putting key: {}", key);
        self.values.write().insert(key.clone(), value);
        Ok(())
    }

    fn get(&self, key: &Key) -> Result<Bytes> {
        self.values
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| DatastoreError::not_found(key.as_str()))
    }

    fn has(&self, key: &Key) -> Result<bool> {
        Ok(self.values.read().contains_key(key))
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        self.values
            .read()
            .get(key)
            .map(|v| v.len())
            .ok_or_else(|| DatastoreError::not_found(key.as_str()))
    }

    fn delete(&self, key: &Key) -> Result<()> {
        debug!("Deleting key: {}", key);
        self.values.write().remove(key);
        Ok(())
    }

    fn query(&self, query: Query) -> Result<Results> {
        debug!("Querying map datastore: {}", query);

        let prefix = query.prefix.as_str();
        let entries: Vec<Entry> = {
            let values = self.values.read();
            values
                .range(query.prefix.clone()..)
                .take_while(|(k, _)| k.as_str().starts_with(prefix))
                .filter(|(k, _)| k.is_descendant_of(&query.prefix))
                .map(|(k, v)| entry_for(&query, k.as_str(), v))
                .collect()
        };

        let results = Results::from_entries(query.clone(), entries);
        Ok(naive_query_apply(&query, results))
    }

    fn sync(&self, _prefix: &Key) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        Some(self)
    }
}

impl Batching for MapDatastore {
    fn batch(&self) -> Result<Box<dyn Batch>> {
        Ok(Box::new(MapBatch {
            values: Arc::clone(&self.values),
            ops: Mutex::new(Vec::new()),
        }))
    }
}

/// Buffers writes and applies them under one write lock
struct MapBatch {
    values: Map,
    ops: Mutex<Vec<BatchOp>>,
}

impl Batch for MapBatch {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        self.ops.lock().push(BatchOp::Put(key.clone(), value));
        Ok(())
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.ops.lock().push(BatchOp::Delete(key.clone()));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        let ops = std::mem::take(&mut *self.ops.lock());
        debug!("Committing map batch with {} ops", ops.len());

        let mut values = self.values.write();
        for op in ops {
            match op {
                BatchOp::Put(key, value) => {
                    values.insert(key, value);
                }
                BatchOp::Delete(key) => {
                    values.remove(&key);
                }
            }
        }
        Ok(())
    }
}

/// Datastore that stores nothing
///
/// Every optional contract is provided as a no-op.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDatastore;

impl NullDatastore {
    pub fn new() -> Self {
        Self
    }
}

impl Datastore for NullDatastore {
    fn put(&self, _key: &Key, _value: Bytes) -> Result<()> {
        Ok(())
    }

    fn get(&self, key: &Key) -> Result<Bytes> {
        Err(DatastoreError::not_found(key.as_str()))
    }

    fn has(&self, _key: &Key) -> Result<bool> {
        Ok(false)
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        Err(DatastoreError::not_found(key.as_str()))
    }

    fn delete(&self, _key: &Key) -> Result<()> {
        Ok(())
    }

    fn query(&self, query: Query) -> Result<Results> {
        Ok(Results::from_entries(query, Vec::new()))
    }

    fn sync(&self, _prefix: &Key) -> Result<()> {
        Ok(())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        Some(self)
    }

    fn as_checked(&self) -> Option<&dyn CheckedDatastore> {
        Some(self)
    }

    fn as_scrubbed(&self) -> Option<&dyn ScrubbedDatastore> {
        Some(self)
    }

    fn as_gc(&self) -> Option<&dyn GcDatastore> {
        Some(self)
    }

    fn as_persistent(&self) -> Option<&dyn PersistentDatastore> {
        Some(self)
    }
}

impl Batching for NullDatastore {
    fn batch(&self) -> Result<Box<dyn Batch>> {
        Ok(Box::new(NullDatastore))
    }
}

impl Batch for NullDatastore {
    fn put(&self, _key: &Key, _value: Bytes) -> Result<()> {
        Ok(())
    }

    fn delete(&self, _key: &Key) -> Result<()> {
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        Ok(())
    }
}

impl CheckedDatastore for NullDatastore {
    fn check(&self) -> Result<()> {
        Ok(())
    }
}

impl ScrubbedDatastore for NullDatastore {
    fn scrub(&self) -> Result<()> {
        Ok(())
    }
}

impl GcDatastore for NullDatastore {
    fn collect_garbage(&self) -> Result<()> {
        Ok(())
    }
}

impl PersistentDatastore for NullDatastore {
    fn disk_usage(&self) -> Result<u64> {
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_suite;
    use dstore_query::Order;

    #[test]
    fn test_map_conformance() {
        test_suite::run_all(&MapDatastore::new());
    }

    #[test]
    fn test_map_query_prefix_excludes_siblings() {
        let ds = MapDatastore::new();
        for k in ["/a", "/a/b", "/a/c", "/ab", "/b"] {
            ds.put(&Key::new(k), Bytes::from(k)).unwrap();
        }

        let q = Query::new().with_prefix("/a").order(Order::ByKey);
        let keys: Vec<String> = ds
            .query(q)
            .unwrap()
            .rest()
            .unwrap()
            .into_iter()
            .map(|e| e.key)
            .collect();
        assert_eq!(keys, vec!["/a/b", "/a/c"]);
    }

    #[test]
    fn test_map_keys_only_sizes() {
        let ds = MapDatastore::new();
        ds.put(&Key::new("/k"), Bytes::from("four")).unwrap();

        let entries = ds.query(Query::new().keys_only().with_sizes()).unwrap().rest().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].value.is_none());
        assert_eq!(entries[0].size, 4);

        let entries = ds.query(Query::new().keys_only()).unwrap().rest().unwrap();
        assert_eq!(entries[0].size, -1);
    }

    #[test]
    fn test_map_batch_is_invisible_until_commit() {
        let ds = MapDatastore::new();
        let batch = ds.batch().unwrap();
        batch.put(&Key::new("/x"), Bytes::from("1")).unwrap();
        assert!(!ds.has(&Key::new("/x")).unwrap());

        batch.commit().unwrap();
        assert!(ds.has(&Key::new("/x")).unwrap());
        assert_eq!(ds.len(), 1);
    }

    #[test]
    fn test_null_datastore() {
        let ds = NullDatastore::new();
        Datastore::put(&ds, &Key::new("/a"), Bytes::from("v")).unwrap();
        assert!(!ds.has(&Key::new("/a")).unwrap());
        assert!(ds.get(&Key::new("/a")).unwrap_err().is_not_found());
        assert!(ds.query(Query::new()).unwrap().rest().unwrap().is_empty());
        assert_eq!(ds.as_persistent().unwrap().disk_usage().unwrap(), 0);
        ds.as_checked().unwrap().check().unwrap();
    }
}
