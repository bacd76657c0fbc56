//! Conformance checks every `Datastore` implementation should pass
//!
//! Each check leaves the datastore empty when it returns, so checks can be
//! chained against one instance. Failures panic with a description of the
//! offending operation.

use crate::{
    Batch, Batching, CheckedDatastore, Datastore, GcDatastore, MapDatastore, PersistentDatastore,
    ScrubbedDatastore,
};
use bytes::Bytes;
use dstore_core::{DatastoreError, Key, Result};
use dstore_query::{naive_query_apply, order, Entry, Filter, Op, Order, Query, Results};

/// Entries per key group written by the query checks
pub const ELEM_COUNT: usize = 40;

/// Run every check, including the batch checks when the datastore batches
pub fn run_all(ds: &dyn Datastore) {
    basic_put_get(ds);
    not_founds(ds);
    prefix(ds);
    orders(ds);
    limit_offset(ds);
    filters(ds);
    returns_sizes(ds);
    close_before_drain(ds);
    basic_sync(ds);

    if let Some(batching) = ds.as_batching() {
        batch_put(ds, batching);
        batch_put_and_delete(ds, batching);
    }
}

fn value_for(n: usize) -> Bytes {
    // Distinct for every n below the modulus, scattered so value order differs from key order
    Bytes::from(format!("{:09}", (n * 2_654_435_761) % 100_000_007))
}

pub fn basic_put_get(ds: &dyn Datastore) {
    let k = Key::new("foo");
    let val = Bytes::from("Hello Datastore!");

    ds.put(&k, val.clone())
        .unwrap_or_else(|e| panic!("error putting to datastore: {}", e));
    assert!(ds.has(&k).unwrap(), "should have key foo after put");
    assert_eq!(ds.get_size(&k).unwrap(), val.len(), "incorrect size");
    assert_eq!(ds.get(&k).unwrap(), val, "value received on get wasn't what we expected");

    ds.delete(&k).unwrap_or_else(|e| panic!("error calling delete: {}", e));
    assert!(!ds.has(&k).unwrap(), "should not have key foo after delete");
    let err = ds.get_size(&k).expect_err("expected error getting size after delete");
    assert!(err.is_not_found(), "wrong error getting size after delete: {}", err);
}

pub fn not_founds(ds: &dyn Datastore) {
    let badk = Key::new("notreal");

    let err = ds.get(&badk).expect_err("get on a missing key succeeded");
    assert!(err.is_not_found(), "expected not found, got: {}", err);
    assert!(!ds.has(&badk).unwrap(), "has returned true for key we don't have");
    let err = ds.get_size(&badk).expect_err("get_size on a missing key succeeded");
    assert!(err.is_not_found(), "expected not found, got: {}", err);

    ds.delete(&badk)
        .unwrap_or_else(|e| panic!("error calling delete on not found key: {}", e));
}

pub fn prefix(ds: &dyn Datastore) {
    for p in ["", "/", "/./", "/.././/", "/prefix/../", "/prefix", "/prefix/", "/prefix/sub/", "/0/", "/bad/"] {
        check_query(ds, Query::new().with_prefix(Key::new(p)), ELEM_COUNT);
    }
}

pub fn orders(ds: &dyn Datastore) {
    let cases = vec![
        vec![Order::ByKey],
        vec![Order::ByKeyDescending],
        vec![Order::ByValue],
        vec![Order::ByValueDescending],
        vec![Order::ByValue, Order::ByKey],
        vec![Order::custom("value", |a: &Entry, b: &Entry| {
            a.value_bytes().cmp(b.value_bytes())
        })],
    ];
    for orders in cases {
        let mut q = Query::new();
        q.orders = orders;
        check_query(ds, q, ELEM_COUNT);
    }
}

pub fn limit_offset(ds: &dyn Datastore) {
    let n = ELEM_COUNT;
    let cases = [
        (0, n / 10),
        (0, 0),
        (n / 10, 0),
        (n / 10, n / 10),
        (n / 10, n / 5),
        (n / 2, n / 5),
        (n - 1, n / 5),
        (n * 2, n / 5),
        (n * 2, 0),
        (n - 1, 0),
        (n - 5, 0),
    ];
    for (offset, limit) in cases {
        let q = Query::new()
            .order(Order::ByKey)
            .with_offset(offset)
            .with_limit(limit)
            .keys_only();
        check_query(ds, q, n);
    }
}

pub fn filters(ds: &dyn Datastore) {
    let cases = vec![
        Filter::key_compare(Op::Equal, "/0key0"),
        Filter::key_compare(Op::LessThan, "/2"),
        Filter::key_prefix("/0key0"),
        Filter::value_compare(Op::LessThan, value_for(7)),
        Filter::custom("even-length", |e: &Entry| e.key.len() % 2 == 0),
    ];
    for filter in cases {
        check_query(ds, Query::new().filter(filter), ELEM_COUNT);
    }
}

pub fn returns_sizes(ds: &dyn Datastore) {
    check_query(ds, Query::new().keys_only().with_sizes(), ELEM_COUNT);
}

/// Closing a partially consumed stream is clean and repeatable
pub fn close_before_drain(ds: &dyn Datastore) {
    let input = populate(ds, 5);

    let mut results = ds.query(Query::new()).unwrap();
    assert!(results.next().is_some(), "expected at least one result");
    results
        .close()
        .unwrap_or_else(|e| panic!("close after partial read failed: {}", e));
    results.close().unwrap_or_else(|e| panic!("second close failed: {}", e));
    assert!(results.next().is_none(), "closed results yielded an item");

    let untouched = ds.query(Query::new()).unwrap();
    drop(untouched);

    clear(ds, &input);
}

pub fn basic_sync(ds: &dyn Datastore) {
    ds.sync(&Key::new("prefix")).unwrap();
    ds.put(&Key::new("/prefix"), Bytes::from("foo")).unwrap();
    ds.sync(&Key::new("/prefix")).unwrap();
    ds.put(&Key::new("/prefix/sub"), Bytes::from("bar")).unwrap();
    ds.sync(&Key::new("/prefix")).unwrap();
    ds.sync(&Key::new("/prefix/sub")).unwrap();
    ds.sync(&Key::new("")).unwrap();

    ds.delete(&Key::new("/prefix")).unwrap();
    ds.delete(&Key::new("/prefix/sub")).unwrap();
}

pub fn batch_put(ds: &dyn Datastore, batching: &dyn Batching) {
    let batch = batching.batch().unwrap();

    let mut keys = Vec::new();
    for i in 0..20 {
        let key = Key::new(format!("/batch/{:02}", i));
        batch.put(&key, value_for(i)).unwrap();
        keys.push(key);
    }

    for k in &keys {
        assert!(ds.get(k).is_err(), "should not have found {} before commit", k);
    }

    batch.commit().unwrap_or_else(|e| panic!("batch commit failed: {}", e));

    for (i, k) in keys.iter().enumerate() {
        assert_eq!(ds.get(k).unwrap(), value_for(i), "blocks not correct");
        ds.delete(k).unwrap();
    }
}

pub fn batch_put_and_delete(ds: &dyn Datastore, batching: &dyn Batching) {
    let batch = batching.batch().unwrap();
    let ka = Key::new("/a");
    let kb = Key::new("/b");

    batch.put(&ka, Bytes::from_static(&[1])).unwrap();
    batch.put(&kb, Bytes::from_static(&[2])).unwrap();
    batch.delete(&ka).unwrap();
    batch.delete(&kb).unwrap();
    batch.put(&kb, Bytes::from_static(&[3])).unwrap();
    batch.commit().unwrap();

    assert!(!ds.has(&ka).unwrap(), "/a should have been deleted");
    assert_eq!(ds.get(&kb).unwrap(), Bytes::from_static(&[3]));
    ds.delete(&kb).unwrap();
}

fn populate(ds: &dyn Datastore, count: usize) -> Vec<Entry> {
    let groups = ["/{i}key{i}", "/prefix/{i}key{i}", "/prefix/sub/{i}key{i}", "/capital/{i}KEY{i}"];

    let mut input = Vec::new();
    for (g, pattern) in groups.iter().enumerate() {
        for i in 0..count {
            let key = Key::new(pattern.replace("{i}", &i.to_string()));
            let value = value_for(g * count + i);
            input.push(Entry::new(key.as_str(), value));
        }
    }

    for (i, e) in input.iter().enumerate() {
        let value = e.value.clone().unwrap_or_default();
        ds.put(&Key::raw(e.key.as_str()), value)
            .unwrap_or_else(|err| panic!("error on put[{}]: {}", i, err));
    }
    for (i, e) in input.iter().enumerate() {
        let got = ds
            .get(&Key::raw(e.key.as_str()))
            .unwrap_or_else(|err| panic!("error on get[{}]: {}", i, err));
        assert_eq!(Some(&got), e.value.as_ref(), "input value didn't match get");
    }
    input
}

fn clear(ds: &dyn Datastore, input: &[Entry]) {
    for e in input {
        ds.delete(&Key::raw(e.key.as_str()))
            .unwrap_or_else(|err| panic!("error deleting {}: {}", e.key, err));
    }
}

/// Compare `ds`'s answer to `query` against the naive evaluation over the same input
fn check_query(ds: &dyn Datastore, query: Query, count: usize) {
    let input = populate(ds, count);

    let results = ds
        .query(query.clone())
        .unwrap_or_else(|e| panic!("calling query {}: {}", query, e));
    assert_eq!(
        results.query().to_string(),
        query.to_string(),
        "returned query differs from the one issued"
    );
    let mut actual = results
        .rest()
        .unwrap_or_else(|e| panic!("query result error for {}: {}", query, e));

    let mut expected = naive_query_apply(&query, Results::from_entries(query.clone(), input.clone()))
        .rest()
        .unwrap_or_else(|e| panic!("naive query error: {}", e));

    assert_eq!(
        actual.len(),
        expected.len(),
        "wrong number of results for {}",
        query
    );

    if query.orders.is_empty() {
        order::sort(&[Order::ByKey], &mut actual);
        order::sort(&[Order::ByKey], &mut expected);
    }

    for (i, (a, e)) in actual.iter().zip(&expected).enumerate() {
        assert_eq!(a.key, e.key, "key mismatch for result {} of {}", i, query);
        if !query.keys_only {
            assert_eq!(a.value, e.value, "value mismatch for result {} (key={})", i, e.key);
        }
        if query.returns_sizes {
            assert!(a.size > 0, "expected size > 0 for result {} of {}", i, query);
        }
    }

    clear(ds, &input);
}

/// Message carried by the maintenance failures of [`TestDatastore`]
pub const TEST_ERROR: &str = "test error";

/// In-memory datastore providing every optional contract
///
/// With `test_errors` set, check, scrub and garbage collection fail with
/// [`TEST_ERROR`], which lets wrappers verify they forward maintenance calls.
#[derive(Clone, Default)]
pub struct TestDatastore {
    inner: MapDatastore,
    test_errors: bool,
}

impl TestDatastore {
    pub fn new(test_errors: bool) -> Self {
        Self {
            inner: MapDatastore::new(),
            test_errors,
        }
    }

    fn maintenance(&self) -> Result<()> {
        if self.test_errors {
            return Err(DatastoreError::internal(TEST_ERROR));
        }
        Ok(())
    }
}

/// Whether `err` is (or wraps) the [`TestDatastore`] maintenance failure
pub fn is_test_error(err: &DatastoreError) -> bool {
    match err {
        DatastoreError::Internal { message } => message == TEST_ERROR,
        DatastoreError::Mount { source, .. } => is_test_error(source),
        _ => false,
    }
}

impl Datastore for TestDatastore {
    fn put(&self, key: &Key, value: Bytes) -> Result<()> {
        self.inner.put(key, value)
    }

    fn get(&self, key: &Key) -> Result<Bytes> {
        self.inner.get(key)
    }

    fn has(&self, key: &Key) -> Result<bool> {
        self.inner.has(key)
    }

    fn get_size(&self, key: &Key) -> Result<usize> {
        self.inner.get_size(key)
    }

    fn delete(&self, key: &Key) -> Result<()> {
        self.inner.delete(key)
    }

    fn query(&self, query: Query) -> Result<Results> {
        self.inner.query(query)
    }

    fn sync(&self, prefix: &Key) -> Result<()> {
        self.inner.sync(prefix)
    }

    fn close(&self) -> Result<()> {
        self.inner.close()
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

impl Batching for TestDatastore {
    fn batch(&self) -> Result<Box<dyn Batch>> {
        self.inner.batch()
    }
}

impl CheckedDatastore for TestDatastore {
    fn check(&self) -> Result<()> {
        self.maintenance()
    }
}

impl ScrubbedDatastore for TestDatastore {
    fn scrub(&self) -> Result<()> {
        self.maintenance()
    }
}

impl GcDatastore for TestDatastore {
    fn collect_garbage(&self) -> Result<()> {
        self.maintenance()
    }
}

impl PersistentDatastore for TestDatastore {
    fn disk_usage(&self) -> Result<u64> {
        Ok(self.inner.len() as u64)
    }
}
