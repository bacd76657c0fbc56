//! Namespaced views of a datastore

use crate::{PrefixTransform, TransformDatastore};
use dstore_core::Key;
use dstore_storage::Datastore;
use std::sync::Arc;

/// Present the subtree of `child` under `prefix` as a datastore of its own
///
/// `wrap(child, "/foo")` stores `/bar` as `/foo/bar` in `child`, and its
/// queries see only keys under `/foo`, with the prefix removed.
pub fn wrap(child: Arc<dyn Datastore>, prefix: impl Into<Key>) -> TransformDatastore {
    TransformDatastore::new(child, Arc::new(PrefixTransform::new(prefix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use dstore_query::{Entry, Query};
    use dstore_storage::test_suite::{self, is_test_error, TestDatastore};
    use dstore_storage::{
        CheckedDatastore, GcDatastore, MapDatastore, ScrubbedDatastore,
    };
    use crate::KeyTransform;

    const KEYS: [&str; 6] = [
        "foo",
        "foo/bar",
        "foo/bar/baz",
        "foo/barb",
        "foo/bar/bazb",
        "foo/bar/baz/barb",
    ];

    fn sorted_keys(entries: Vec<Entry>) -> Vec<Key> {
        let mut keys: Vec<Key> = entries.into_iter().map(|e| Key::raw(e.key)).collect();
        keys.sort();
        keys
    }

    fn check_basic(prefix: &str) {
        let mpds = Arc::new(MapDatastore::new());
        let nsds = wrap(mpds.clone(), Key::new(prefix));

        for k in KEYS.map(Key::new) {
            nsds.put(&k, Bytes::from(k.to_string())).unwrap();
        }
        for k in KEYS.map(Key::new) {
            assert_eq!(nsds.get(&k).unwrap(), Bytes::from(k.to_string()));
            assert_eq!(
                mpds.get(&Key::new(prefix).child(&k)).unwrap(),
                Bytes::from(k.to_string())
            );
        }

        let list_a = sorted_keys(mpds.query(Query::new()).unwrap().rest().unwrap());
        let list_b = sorted_keys(nsds.query(Query::new()).unwrap().rest().unwrap());
        assert_eq!(list_a.len(), list_b.len());
        for (ka, kb) in list_a.iter().zip(&list_b) {
            assert_eq!(&nsds.transform().invert_key(ka), kb);
            assert_eq!(ka, &nsds.transform().convert_key(kb));
        }
    }

    #[test]
    fn test_basic() {
        check_basic("abc");
        check_basic("");
    }

    #[test]
    fn test_query() {
        let mpds = Arc::new(TestDatastore::new(true));
        let nsds = wrap(mpds.clone(), "/foo");

        for k in ["abc/foo", "bar/foo", "foo/bar", "foo/bar/baz", "foo/baz/abc", "xyz/foo"] {
            let k = Key::new(k);
            mpds.put(&k, Bytes::from(k.to_string())).unwrap();
        }

        let mut results = nsds.query(Query::new()).unwrap().rest().unwrap();
        results.sort_by(|a, b| a.key.cmp(&b.key));
        let got: Vec<(&str, &[u8])> = results.iter().map(|e| (e.key.as_str(), e.value_bytes())).collect();
        assert_eq!(
            got,
            vec![
                ("/bar", b"/foo/bar".as_slice()),
                ("/bar/baz", b"/foo/bar/baz".as_slice()),
                ("/baz/abc", b"/foo/baz/abc".as_slice()),
            ]
        );

        let results = nsds.query(Query::new().with_prefix("bar")).unwrap().rest().unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "/bar/baz");
        assert_eq!(results[0].value_bytes(), b"/foo/bar/baz");

        assert!(is_test_error(&nsds.check().unwrap_err()));
        assert!(is_test_error(&nsds.collect_garbage().unwrap_err()));
        assert!(is_test_error(&nsds.scrub().unwrap_err()));
    }

    #[test]
    fn test_suite() {
        let nsds = wrap(Arc::new(TestDatastore::new(true)), "/foo");
        test_suite::run_all(&nsds);
    }
}
