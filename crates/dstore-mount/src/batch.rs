use crate::lookup::{lookup, Mount};
use bytes::Bytes;
use dstore_core::{DatastoreError, Key, Result};
use dstore_storage::Batch;
use parking_lot::Mutex;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// Batch spanning several mounts
///
/// Writes are grouped into one child batch per mount, opened on first use.
/// Commit walks the mounts in prefix order and stops at the first failure,
/// so a failed commit may leave earlier mounts committed.
pub(crate) struct MountBatch {
    mounts: Arc<[Mount]>,
    batches: Mutex<BTreeMap<Key, Box<dyn Batch>>>,
}

impl MountBatch {
    pub(crate) fn new(mounts: Arc<[Mount]>) -> Self {
        Self {
            mounts,
            batches: Mutex::new(BTreeMap::new()),
        }
    }

    fn with_child<F>(&self, key: &Key, op: F) -> Result<()>
    where
        F: FnOnce(&dyn Batch, &Key) -> Result<()>,
    {
        let (mount, rest) = lookup(&self.mounts, key)
            .ok_or_else(|| DatastoreError::no_mounted_datastore(key.as_str()))?;

        let mut batches = self.batches.lock();
        let batch = match batches.entry(mount.prefix.clone()) {
            Entry::Occupied(slot) => slot.into_mut(),
            Entry::Vacant(slot) => {
                let batching = mount
                    .datastore
                    .as_batching()
                    .ok_or_else(|| DatastoreError::batching_unsupported(mount.prefix.as_str()))?;
                debug!("Opening child batch at {}", mount.prefix);
                slot.insert(batching.batch()?)
            }
        };
        op(batch.as_ref(), &rest)
    }
}

impl Batch for MountBatch {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        self.with_child(key, |batch, rest| batch.put(rest, value))
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.with_child(key, |batch, rest| batch.delete(rest))
    }

    fn commit(&self) -> Result<()> {
        let mut batches = self.batches.lock();
        for (prefix, batch) in batches.iter() {
            batch
                .commit()
                .map_err(|e| e.at_mount("committing", prefix.as_str()))?;
        }
        batches.clear();
        Ok(())
    }
}
