use crate::batch::MountBatch;
use crate::lookup::{lookup, lookup_all, sort_mounts, Mount};
use crate::merge::QuerySet;
use bytes::Bytes;
use dstore_core::{DatastoreError, Key, Result};
use dstore_query::{naive_query_apply, Filter, Query, ResultSource, Results};
use dstore_storage::{
    Batch, Batching, CheckedDatastore, Datastore, GcDatastore, PersistentDatastore,
    ScrubbedDatastore,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Datastore composed of child datastores mounted at key prefixes
///
/// A key belongs to the mount with the longest prefix that is an ancestor
/// of, or equal to, the key; the child sees the key with that prefix
/// removed. Queries fan out to every mount intersecting the query prefix
/// and merge the child streams back into one ordered stream.
#[derive(Clone)]
pub struct MountDatastore {
    mounts: Arc<[Mount]>,
}

impl MountDatastore {
    /// Build a mount table
    ///
    /// Fails with a configuration error when two mounts share a prefix.
    pub fn new(mut mounts: Vec<Mount>) -> Result<Self> {
        sort_mounts(&mut mounts);
        if let Some(pair) = mounts.windows(2).find(|w| w[0].prefix == w[1].prefix) {
            return Err(DatastoreError::configuration(
                format!("Duplicate mount prefix {}", pair[0].prefix),
                "Give every mount a distinct prefix",
            ));
        }

        for mount in &mounts {
            info!(
                "Mounted datastore at {} with capabilities {}",
                mount.prefix,
                mount.capabilities()
            );
        }
        Ok(Self {
            mounts: mounts.into(),
        })
    }

    /// Mounts, most specific prefix first
    pub fn mounts(&self) -> &[Mount] {
        &self.mounts
    }

    fn route(&self, key: &Key) -> Option<(&Mount, Key)> {
        lookup(&self.mounts, key)
    }
}

impl fmt::Debug for MountDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MountDatastore")
            .field("mounts", &self.mounts)
            .finish()
    }
}

/// Report child misses under the caller's key; annotate everything else
fn child_error(err: DatastoreError, operation: &str, mount: &Mount, key: &Key) -> DatastoreError {
    if err.is_not_found() {
        DatastoreError::not_found(key.as_str())
    } else {
        err.at_mount(operation, mount.prefix.as_str())
    }
}

impl Datastore for MountDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        let (mount, rest) = self
            .route(key)
            .ok_or_else(|| DatastoreError::no_mounted_datastore(key.as_str()))?;
        mount
            .datastore
            .put(&rest, value)
            .map_err(|e| e.at_mount("writing to", mount.prefix.as_str()))
    }

    fn get(&self, key: &Key) -> Result<Bytes> {
        let (mount, rest) = self
            .route(key)
            .ok_or_else(|| DatastoreError::not_found(key.as_str()))?;
        mount
            .datastore
            .get(&rest)
            .map_err(|e| child_error(e, "reading from", mount, key))
    }

    fn has(&self, key: &Key) -> Result<bool> {
        match self.route(key) {
            Some((mount, rest)) => mount
                .datastore
                .has(&rest)
                .map_err(|e| e.at_mount("reading from", mount.prefix.as_str())),
            None => Ok(false),
        }
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        let (mount, rest) = self
            .route(key)
            .ok_or_else(|| DatastoreError::not_found(key.as_str()))?;
        mount
            .datastore
            .get_size(&rest)
            .map_err(|e| child_error(e, "reading from", mount, key))
    }

    fn delete(&self, key: &Key) -> Result<()> {
        let (mount, rest) = self
            .route(key)
            .ok_or_else(|| DatastoreError::no_mounted_datastore(key.as_str()))?;
        mount
            .datastore
            .delete(&rest)
            .map_err(|e| e.at_mount("deleting from", mount.prefix.as_str()))
    }

    fn query(&self, query: Query) -> Result<Results> {
        let targets = lookup_all(&self.mounts, &query.prefix);
        debug!("Query {} spans {} mount(s)", query, targets.len());

        // key filters see mount-relative keys in the children, so they run after the merge
        let (pushed, merged_filters): (Vec<Filter>, Vec<Filter>) = query
            .filters
            .iter()
            .cloned()
            .partition(Filter::is_key_independent);

        let mut set = QuerySet::new(&query.orders);
        for (mount, rest) in targets {
            let child_query = Query {
                prefix: rest,
                filters: pushed.clone(),
                orders: set.orders().to_vec(),
                keys_only: query.keys_only,
                return_expirations: query.return_expirations,
                returns_sizes: query.returns_sizes,
                ..Query::default()
            };
            match mount.datastore.query(child_query) {
                Ok(results) => set.add(mount.prefix.clone(), results),
                Err(err) => {
                    if let Err(close_err) = set.close() {
                        warn!("Failed to close sibling queries: {}", close_err);
                    }
                    return Err(err.at_mount("querying", mount.prefix.as_str()));
                }
            }
        }

        let merged = Results::new(query.clone(), set);
        let residual = Query {
            filters: merged_filters,
            offset: query.offset,
            limit: query.limit,
            ..Query::default()
        };
        Ok(naive_query_apply(&residual, merged).with_query(query))
    }

    fn sync(&self, prefix: &Key) -> Result<()> {
        let mut first: Option<DatastoreError> = None;
        for (mount, rest) in lookup_all(&self.mounts, prefix) {
            if let Err(e) = mount.datastore.sync(&rest) {
                let e = e.at_mount("syncing", mount.prefix.as_str());
                warn!("{}", e);
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn close(&self) -> Result<()> {
        let mut first: Option<DatastoreError> = None;
        for mount in self.mounts.iter() {
            if let Err(e) = mount.datastore.close() {
                let e = e.at_mount("closing", mount.prefix.as_str());
                warn!("{}", e);
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
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

impl Batching for MountDatastore {
    fn batch(&self) -> Result<Box<dyn Batch>> {
        Ok(Box::new(MountBatch::new(Arc::clone(&self.mounts))))
    }
}

impl CheckedDatastore for MountDatastore {
    fn check(&self) -> Result<()> {
        for mount in self.mounts.iter() {
            if let Some(checked) = mount.datastore.as_checked() {
                checked
                    .check()
                    .map_err(|e| e.at_mount("checking", mount.prefix.as_str()))?;
            }
        }
        Ok(())
    }
}

impl ScrubbedDatastore for MountDatastore {
    fn scrub(&self) -> Result<()> {
        for mount in self.mounts.iter() {
            if let Some(scrubbed) = mount.datastore.as_scrubbed() {
                scrubbed
                    .scrub()
                    .map_err(|e| e.at_mount("scrubbing", mount.prefix.as_str()))?;
            }
        }
        Ok(())
    }
}

impl GcDatastore for MountDatastore {
    fn collect_garbage(&self) -> Result<()> {
        for mount in self.mounts.iter() {
            if let Some(gc) = mount.datastore.as_gc() {
                gc.collect_garbage()
                    .map_err(|e| e.at_mount("gc on", mount.prefix.as_str()))?;
            }
        }
        Ok(())
    }
}

impl PersistentDatastore for MountDatastore {
    fn disk_usage(&self) -> Result<u64> {
        let mut total = 0;
        for mount in self.mounts.iter() {
            if let Some(persistent) = mount.datastore.as_persistent() {
                total += persistent
                    .disk_usage()
                    .map_err(|e| e.at_mount("measuring", mount.prefix.as_str()))?;
            }
        }
        Ok(total)
    }
}
