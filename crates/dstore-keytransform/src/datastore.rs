use crate::{split_query, KeyTransform};
use bytes::Bytes;
use dstore_core::{DatastoreError, Key, Result};
use dstore_query::{naive_query_apply, Query, QueryResult, ResultSource, Results};
use dstore_storage::{
    Batch, Batching, CheckedDatastore, Datastore, GcDatastore, PersistentDatastore,
    ScrubbedDatastore,
};
use std::sync::Arc;
use tracing::debug;

/// Datastore that rewrites every key before handing it to a child
///
/// Optional contracts are available exactly when the child provides them.
#[derive(Clone)]
pub struct TransformDatastore {
    child: Arc<dyn Datastore>,
    transform: Arc<dyn KeyTransform>,
}

impl TransformDatastore {
    pub fn new(child: Arc<dyn Datastore>, transform: Arc<dyn KeyTransform>) -> Self {
        Self { child, transform }
    }

    pub fn child(&self) -> &Arc<dyn Datastore> {
        &self.child
    }

    pub fn transform(&self) -> &dyn KeyTransform {
        self.transform.as_ref()
    }

    fn convert(&self, key: &Key) -> Key {
        self.transform.convert_key(key)
    }
}

/// Inverts the key of every entry coming back from the child
struct InvertSource {
    input: Results,
    transform: Arc<dyn KeyTransform>,
}

impl ResultSource for InvertSource {
    fn next_result(&mut self) -> Option<QueryResult> {
        let result = self.input.next()?;
        Some(result.map(|mut entry| {
            entry.key = self.transform.invert_key(&Key::raw(entry.key)).into();
            entry
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.input.close()
    }
}

impl Datastore for TransformDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        self.child.put(&self.convert(key), value)
    }

    fn get(&self, key: &Key) -> Result<Bytes> {
        self.child.get(&self.convert(key))
    }

    fn has(&self, key: &Key) -> Result<bool> {
        self.child.has(&self.convert(key))
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        self.child.get_size(&self.convert(key))
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.child.delete(&self.convert(key))
    }

    fn query(&self, query: Query) -> Result<Results> {
        let split = split_query(self.transform.as_ref(), &query);
        debug!("Split query {} into child {} and naive {}", query, split.child, split.naive);

        let child_results = self.child.query(split.child)?;
        let inverted = Results::new(
            query.clone(),
            InvertSource {
                input: child_results,
                transform: Arc::clone(&self.transform),
            },
        );
        Ok(naive_query_apply(&split.naive, inverted).with_query(query))
    }

    fn sync(&self, prefix: &Key) -> Result<()> {
        self.child.sync(&self.convert(prefix))
    }

    fn close(&self) -> Result<()> {
        self.child.close()
    }

    fn as_batching(&self) -> Option<&dyn Batching> {
        self.child.as_batching().map(|_| self as &dyn Batching)
    }

    fn as_checked(&self) -> Option<&dyn CheckedDatastore> {
        self.child.as_checked().map(|_| self as &dyn CheckedDatastore)
    }

    fn as_scrubbed(&self) -> Option<&dyn ScrubbedDatastore> {
        self.child.as_scrubbed().map(|_| self as &dyn ScrubbedDatastore)
    }

    fn as_gc(&self) -> Option<&dyn GcDatastore> {
        self.child.as_gc().map(|_| self as &dyn GcDatastore)
    }

    fn as_persistent(&self) -> Option<&dyn PersistentDatastore> {
        self.child.as_persistent().map(|_| self as &dyn PersistentDatastore)
    }
}

impl Batching for TransformDatastore {
    fn batch(&self) -> Result<Box<dyn Batch>> {
        let batching = self
            .child
            .as_batching()
            .ok_or_else(|| DatastoreError::batching_unsupported(self.convert(&Key::root()).as_str()))?;
        Ok(Box::new(TransformBatch {
            inner: batching.batch()?,
            transform: Arc::clone(&self.transform),
        }))
    }
}

/// Child batch with keys converted on the way in
struct TransformBatch {
    inner: Box<dyn Batch>,
    transform: Arc<dyn KeyTransform>,
}

impl Batch for TransformBatch {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        self.inner.put(&self.transform.convert_key(key), value)
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.inner.delete(&self.transform.convert_key(key))
    }

    fn commit(&self) -> Result<()> {
        self.inner.commit()
    }
}

impl CheckedDatastore for TransformDatastore {
    fn check(&self) -> Result<()> {
        match self.child.as_checked() {
            Some(checked) => checked.check(),
            None => Ok(()),
        }
    }
}

impl ScrubbedDatastore for TransformDatastore {
    fn scrub(&self) -> Result<()> {
        match self.child.as_scrubbed() {
            Some(scrubbed) => scrubbed.scrub(),
            None => Ok(()),
        }
    }
}

impl GcDatastore for TransformDatastore {
    fn collect_garbage(&self) -> Result<()> {
        match self.child.as_gc() {
            Some(gc) => gc.collect_garbage(),
            None => Ok(()),
        }
    }
}

impl PersistentDatastore for TransformDatastore {
    fn disk_usage(&self) -> Result<u64> {
        match self.child.as_persistent() {
            Some(persistent) => persistent.disk_usage(),
            None => Ok(0),
        }
    }
}
