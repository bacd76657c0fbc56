use bytes::Bytes;
use dstore_core::Key;
use dstore_mount::{Mount, MountDatastore};
use dstore_query::{naive_query_apply, Order, Query, Results};
use dstore_storage::{Datastore, MapDatastore};
use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;

const PREFIXES: [&str; 4] = ["/", "/a", "/a/b", "/c"];

fn mounted() -> MountDatastore {
    MountDatastore::new(
        PREFIXES
            .iter()
            .map(|p| Mount::new(Key::new(p), Arc::new(MapDatastore::new())))
            .collect(),
    )
    .unwrap()
}

fn key_strategy() -> impl Strategy<Value = String> {
    (prop::sample::select(vec!["", "/a", "/a/b", "/c", "/d"]), "[d-g]{1,3}")
        .prop_map(|(parent, leaf)| format!("{}/{}", parent, leaf))
}

fn contents() -> impl Strategy<Value = BTreeMap<String, Vec<u8>>> {
    prop::collection::btree_map(key_strategy(), prop::collection::vec(any::<u8>(), 0..4), 0..30)
}

fn order_strategy() -> impl Strategy<Value = Vec<Order>> {
    prop::sample::select(vec![
        vec![],
        vec![Order::ByKey],
        vec![Order::ByKeyDescending],
        vec![Order::ByValue, Order::ByKey],
        vec![Order::ByValueDescending, Order::ByKeyDescending],
    ])
}

fn load(ds: &MountDatastore, data: &BTreeMap<String, Vec<u8>>) {
    for (k, v) in data {
        ds.put(&Key::new(k), Bytes::from(v.clone())).unwrap();
    }
}

fn keys(results: Results) -> Vec<String> {
    results.rest().unwrap().into_iter().map(|e| e.key).collect()
}

proptest! {
    #[test]
    fn merged_query_matches_naive_evaluation(
        data in contents(),
        orders in order_strategy(),
        prefix in prop::sample::select(vec!["/", "/a", "/a/b", "/c", "/d"]),
        offset in 0usize..5,
        limit in 0usize..5,
    ) {
        let ds = mounted();
        load(&ds, &data);

        let mut q = Query::new().with_prefix(prefix).with_offset(offset).with_limit(limit);
        q.orders = if orders.is_empty() { vec![Order::ByKey] } else { orders };

        let entries = data
            .iter()
            .map(|(k, v)| dstore_query::Entry::new(Key::new(k).as_str(), v.clone()))
            .collect();
        let expected = keys(naive_query_apply(&q, Results::from_entries(q.clone(), entries)));
        let actual = keys(ds.query(q).unwrap());
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn pages_concatenate_to_full_listing(data in contents(), page in 1usize..6) {
        let ds = mounted();
        load(&ds, &data);

        let all = keys(ds.query(Query::new().order(Order::ByKey)).unwrap());
        let mut paged = Vec::new();
        let mut offset = 0;
        loop {
            let q = Query::new().order(Order::ByKey).with_offset(offset).with_limit(page);
            let chunk = keys(ds.query(q).unwrap());
            if chunk.is_empty() {
                break;
            }
            offset += chunk.len();
            paged.extend(chunk);
        }
        prop_assert_eq!(paged, all);
    }
}
