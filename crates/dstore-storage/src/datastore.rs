use bytes::Bytes;
use dstore_core::{Key, Result};
use dstore_query::{Query, Results};

/// Uniform key/value storage contract
///
/// Every backend and every wrapper implements this trait. Optional
/// behavior is exposed through the `as_*` accessors, which return `None`
/// unless the implementation provides that contract.
pub trait Datastore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value
    fn put(&self, key: &Key, value: Bytes) -> Result<()>;

    /// Fetch the value under `key`; a miss is `DatastoreError::NotFound`
    fn get(&self, key: &Key) -> Result<Bytes>;

    /// Whether a value exists under `key`
    fn has(&self, key: &Key) -> Result<bool>;

    /// Byte length of the value under `key`; a miss is `DatastoreError::NotFound`
    fn get_size(&self, key: &Key) -> Result<usize>;

    /// Remove `key`; removing a missing key succeeds
    fn delete(&self, key: &Key) -> Result<()>;

    /// Run `query` and return a lazy stream over the matches
    fn query(&self, query: Query) -> Result<Results>;

    /// Flush anything buffered under `prefix` to durable storage
    fn sync(&self, prefix: &Key) -> Result<()>;

    /// Release resources; the datastore must not be used afterwards
    fn close(&self) -> Result<()>;

    fn as_batching(&self) -> Option<&dyn Batching> {
        None
    }

    fn as_checked(&self) -> Option<&dyn CheckedDatastore> {
        None
    }

    fn as_scrubbed(&self) -> Option<&dyn ScrubbedDatastore> {
        None
    }

    fn as_gc(&self) -> Option<&dyn GcDatastore> {
        None
    }

    fn as_persistent(&self) -> Option<&dyn PersistentDatastore> {
        None
    }
}

/// Group of writes applied together on `commit`
///
/// Writes staged in a batch are invisible until committed. Committing an
/// empty batch succeeds. Whether the commit is atomic is up to the backend.
pub trait Batch: Send + Sync {
    fn put(&self, key: &Key, value: Bytes) -> Result<()>;
    fn delete(&self, key: &Key) -> Result<()>;
    fn commit(&self) -> Result<()>;
}

/// Datastore that can hand out batches
pub trait Batching: Send + Sync {
    fn batch(&self) -> Result<Box<dyn Batch>>;
}

/// Datastore that can verify its own integrity
pub trait CheckedDatastore: Send + Sync {
    fn check(&self) -> Result<()>;
}

/// Datastore that can scan for and repair damaged entries
pub trait ScrubbedDatastore: Send + Sync {
    fn scrub(&self) -> Result<()>;
}

/// Datastore that can reclaim space left by deleted entries
pub trait GcDatastore: Send + Sync {
    fn collect_garbage(&self) -> Result<()>;
}

/// Datastore that knows how much disk it occupies
pub trait PersistentDatastore: Send + Sync {
    /// Bytes used on disk
    fn disk_usage(&self) -> Result<u64>;
}

/// Staged write held by buffering batch implementations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put(Key, Bytes),
    Delete(Key),
}

impl BatchOp {
    pub fn key(&self) -> &Key {
        match self {
            BatchOp::Put(key, _) | BatchOp::Delete(key) => key,
        }
    }
}
