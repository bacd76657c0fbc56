use crate::memory::entry_for;
use crate::{
    Batch, BatchOp, Batching, CheckedDatastore, Datastore, GcDatastore, PersistentDatastore,
};
use bytes::Bytes;
use dstore_core::{DatastoreError, Key, Result};
use dstore_query::{naive_query_apply, Order, Producer, Query, ResultBuilder, Results};
use parking_lot::{Mutex, RwLock};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

// Table definitions
const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");

/// redb-based datastore
///
/// Keys are stored as their string form in a single table, so a prefix
/// query is a range scan. Scans run on a producer thread and stream entries
/// as they are read.
pub struct RedbDatastore {
    db: Arc<RwLock<Database>>,
    path: PathBuf,
}

impl RedbDatastore {
    /// Open or create the database file at `path`
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening redb database at: {}", path.as_ref().display());

        let db = Database::create(path.as_ref()).map_err(|e| {
            DatastoreError::backend(
                format!("Failed to create database: {}", e),
                Some(Box::new(e)),
            )
        })?;

        // Create the table if it doesn't exist
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(ENTRIES_TABLE)?;
        }
        write_txn.commit()?;

        info!("redb database initialized successfully");

        Ok(Self {
            db: Arc::new(RwLock::new(db)),
            path: path.as_ref().to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_ops(&self, ops: &[BatchOp]) -> Result<()> {
        let write_txn = self.db.read().begin_write()?;
        {
            let mut table = write_txn.open_table(ENTRIES_TABLE)?;
            for op in ops {
                match op {
                    BatchOp::Put(key, value) => {
                        table.insert(key.as_str(), &value[..])?;
                    }
                    BatchOp::Delete(key) => {
                        table.remove(key.as_str())?;
                    }
                }
            }
        }
        write_txn.commit()?;
        Ok(())
    }

    fn read_value(&self, key: &Key) -> Result<Option<Bytes>> {
        let read_txn = self.db.read().begin_read()?;
        let table = read_txn.open_table(ENTRIES_TABLE)?;

        match table.get(key.as_str())? {
            Some(value) => Ok(Some(Bytes::copy_from_slice(value.value()))),
            None => Ok(None),
        }
    }
}

/// Whether the range scan alone yields the requested page in order
fn scan_satisfies_paging(query: &Query) -> bool {
    query.filters.is_empty() && query.orders.iter().all(|o| matches!(o, Order::ByKey))
}

fn scan(db: &RwLock<Database>, query: &Query, paged: bool, producer: &Producer) -> Result<()> {
    let read_txn = db.read().begin_read()?;
    let table = read_txn.open_table(ENTRIES_TABLE)?;

    let start = if query.prefix.is_root() {
        "/".to_string()
    } else {
        format!("{}/", query.prefix)
    };
    let mut to_skip = if paged { query.offset } else { 0 };
    let mut remaining = (paged && query.limit > 0).then_some(query.limit);

    for item in table.range(start.as_str()..)? {
        if producer.is_cancelled() || remaining == Some(0) {
            break;
        }
        let (key, value) = item?;
        let key = key.value();
        if !key.starts_with(&start) {
            break;
        }
        if key == start {
            continue;
        }
        if to_skip > 0 {
            to_skip -= 1;
            continue;
        }

        let value = Bytes::copy_from_slice(value.value());
        if !producer.send(Ok(entry_for(query, key, &value))) {
            break;
        }
        if let Some(n) = remaining.as_mut() {
            *n -= 1;
        }
    }
    Ok(())
}

impl Datastore for RedbDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        debug!("Putting key: {}", key);
        self.write_ops(&[BatchOp::Put(key.clone(), value)])
    }

    fn get(&self, key: &Key) -> Result<Bytes> {
        debug!("Getting key: {}", key);
        self.read_value(key)?
            .ok_or_else(|| DatastoreError::not_found(key.as_str()))
    }

    fn has(&self, key: &Key) -> Result<bool> {
        Ok(self.read_value(key)?.is_some())
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        self.read_value(key)?
            .map(|v| v.len())
            .ok_or_else(|| DatastoreError::not_found(key.as_str()))
    }

    fn delete(&self, key: &Key) -> Result<()> {
        debug!("Deleting key: {}", key);
        self.write_ops(&[BatchOp::Delete(key.clone())])
    }

    fn query(&self, query: Query) -> Result<Results> {
        debug!("Querying redb datastore: {}", query);

        let paged = scan_satisfies_paging(&query);
        let db = Arc::clone(&self.db);
        let scan_query = query.clone();

        let scanned = ResultBuilder::new(query.clone()).spawn(move |producer| {
            if let Err(e) = scan(&db, &scan_query, paged, &producer) {
                producer.send(Err(e));
            }
        })?;

        let mut residual = query.clone();
        if paged {
            residual.orders.clear();
            residual.offset = 0;
            residual.limit = 0;
        }
        Ok(naive_query_apply(&residual, scanned).with_query(query))
    }

    fn sync(&self, _prefix: &Key) -> Result<()> {
        // Commits are durable when they return
        Ok(())
    }

    fn close(&self) -> Result<()> {
        info!("Closing redb database at: {}", self.path.display());
        Ok(())
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        Some(self)
    }

    fn as_checked(&self) -> Option<&dyn CheckedDatastore> {
        Some(self)
    }

    fn as_gc(&self) -> Option<&dyn GcDatastore> {
        Some(self)
    }

    fn as_persistent(&self) -> Option<&dyn PersistentDatastore> {
        Some(self)
    }
}

impl Batching for RedbDatastore {
    fn batch(&self) -> Result<Box<dyn Batch>> {
        Ok(Box::new(RedbBatch {
            datastore: RedbDatastore {
                db: Arc::clone(&self.db),
                path: self.path.clone(),
            },
            ops: Mutex::new(Vec::new()),
        }))
    }
}

/// Buffers writes and applies them in a single write transaction
struct RedbBatch {
    datastore: RedbDatastore,
    ops: Mutex<Vec<BatchOp>>,
}

impl Batch for RedbBatch {
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
        debug!("Committing redb batch with {} ops", ops.len());
        self.datastore.write_ops(&ops)
    }
}

impl CheckedDatastore for RedbDatastore {
    fn check(&self) -> Result<()> {
        if !self.db.write().check_integrity()? {
            warn!("redb database at {} was repaired", self.path.display());
        }
        Ok(())
    }
}

impl GcDatastore for RedbDatastore {
    fn collect_garbage(&self) -> Result<()> {
        let compacted = self.db.write().compact()?;
        debug!("Compaction of {} ran: {}", self.path.display(), compacted);
        Ok(())
    }
}

impl PersistentDatastore for RedbDatastore {
    fn disk_usage(&self) -> Result<u64> {
        Ok(std::fs::metadata(&self.path)?.len())
    }
}
