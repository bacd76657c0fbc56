use crate::KeyTransform;
use dstore_core::Key;
use dstore_query::{Filter, Op, Order, Query};

/// A query divided between the wrapped datastore and the naive operators
#[derive(Debug, Clone)]
pub struct QuerySplit {
    /// Runs on the wrapped datastore, in its key space
    pub child: Query,
    /// Applied to the child results after their keys are inverted
    pub naive: Query,
}

/// Decide which parts of `query` the wrapped datastore can evaluate
///
/// The prefix is always converted and pushed down. Orders are pushed down
/// while each criterion is by value, or by key under an order-preserving
/// transform; the first criterion that is neither sends the whole order
/// list to the naive stage. Filters are pushed down in sequence until the
/// first one the child cannot evaluate in its key space; that filter and
/// all later ones stay naive. Offset and limit go wherever the last
/// stage runs.
pub fn split_query(transform: &dyn KeyTransform, query: &Query) -> QuerySplit {
    let mut child = Query {
        prefix: transform.convert_key(&query.prefix),
        keys_only: query.keys_only,
        return_expirations: query.return_expirations,
        returns_sizes: query.returns_sizes,
        ..Query::default()
    };
    let mut naive = Query::default();
    let order_preserving = transform.is_order_preserving();

    for order in &query.orders {
        match order {
            Order::ByValue | Order::ByValueDescending => child.orders.push(order.clone()),
            Order::ByKey | Order::ByKeyDescending if order_preserving => {
                child.orders.push(order.clone());
                // keys are unique, later criteria never decide
                break;
            }
            _ => {
                child.orders.clear();
                naive.orders = query.orders.clone();
                break;
            }
        }
    }

    for (i, filter) in query.filters.iter().enumerate() {
        match convert_filter(transform, filter) {
            Some(converted) => child.filters.push(converted),
            None => {
                naive.filters = query.filters[i..].to_vec();
                break;
            }
        }
    }

    if naive.orders.is_empty() && naive.filters.is_empty() {
        child.offset = query.offset;
        child.limit = query.limit;
    } else {
        naive.offset = query.offset;
        naive.limit = query.limit;
    }

    QuerySplit { child, naive }
}

/// Filter rewritten for the child key space, if the child can evaluate it there
fn convert_filter(transform: &dyn KeyTransform, filter: &Filter) -> Option<Filter> {
    match filter {
        Filter::ValueCompare { .. } => Some(filter.clone()),
        // equality survives any bijective conversion; ordering needs more
        Filter::KeyCompare { op, key }
            if transform.is_order_preserving() || matches!(op, Op::Equal | Op::NotEqual) =>
        {
            Some(Filter::KeyCompare {
                op: *op,
                key: convert_raw(transform, key),
            })
        }
        Filter::KeyPrefix { prefix } if transform.is_order_preserving() => {
            Some(Filter::KeyPrefix {
                prefix: convert_raw(transform, prefix),
            })
        }
        _ => None,
    }
}

fn convert_raw(transform: &dyn KeyTransform, s: &str) -> String {
    let converted = transform.convert_key(&Key::raw(s)).to_string();
    // Keep a trailing slash: "/a/" as a prefix must not match "/ab"
    if s.len() > 1 && s.ends_with('/') && !converted.ends_with('/') {
        format!("{}/", converted)
    } else {
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Pair, PrefixTransform};

    fn prefix() -> PrefixTransform {
        PrefixTransform::new("/ns")
    }

    fn opaque() -> Pair {
        Pair::new(
            |k: &Key| Key::new("/ns").child(k),
            |k: &Key| k.strip_ancestor(&Key::new("/ns")).unwrap_or_else(|| k.clone()),
        )
    }

    #[test]
    fn test_prefix_always_converted() {
        let q = Query::new().with_prefix("/a");
        let split = split_query(&opaque(), &q);
        assert_eq!(split.child.prefix, Key::new("/ns/a"));
        assert!(split.naive.prefix.is_root());

        let split = split_query(&prefix(), &Query::new());
        assert_eq!(split.child.prefix, Key::new("/ns"));
    }

    #[test]
    fn test_everything_pushed_for_order_preserving() {
        let q = Query::new()
            .order(Order::ByKeyDescending)
            .filter(Filter::key_compare(Op::GreaterThan, "/b"))
            .filter(Filter::key_prefix("/b/"))
            .filter(Filter::value_compare(Op::Equal, "x"))
            .with_offset(3)
            .with_limit(2)
            .keys_only();
        let split = split_query(&prefix(), &q);

        assert_eq!(split.child.orders.len(), 1);
        assert_eq!(
            split.child.filters.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
            vec![
                r#"KEY > "/ns/b""#.to_string(),
                r#"PREFIX("/ns/b/")"#.to_string(),
                r#"VALUE == "x""#.to_string(),
            ]
        );
        assert_eq!(split.child.offset, 3);
        assert_eq!(split.child.limit, 2);
        assert!(split.child.keys_only);

        assert!(split.naive.orders.is_empty());
        assert!(split.naive.filters.is_empty());
        assert_eq!(split.naive.offset, 0);
        assert_eq!(split.naive.limit, 0);
    }

    #[test]
    fn test_key_order_stops_scan() {
        let q = Query::new()
            .order(Order::ByValue)
            .order(Order::ByKey)
            .order(Order::custom("never", |_, _| std::cmp::Ordering::Equal));
        let split = split_query(&prefix(), &q);
        assert_eq!(split.child.orders.len(), 2);
        assert!(split.naive.orders.is_empty());
    }

    #[test]
    fn test_key_order_on_opaque_transform_falls_back() {
        let q = Query::new()
            .order(Order::ByValue)
            .order(Order::ByKey)
            .with_limit(5);
        let split = split_query(&opaque(), &q);

        assert!(split.child.orders.is_empty());
        assert_eq!(split.naive.orders.len(), 2);
        assert_eq!(split.naive.limit, 5);
        assert_eq!(split.child.limit, 0);
    }

    #[test]
    fn test_custom_order_falls_back_with_whole_list() {
        let q = Query::new()
            .order(Order::ByValueDescending)
            .order(Order::custom("len", |a, b| a.key.len().cmp(&b.key.len())))
            .with_offset(1);
        let split = split_query(&prefix(), &q);

        assert!(split.child.orders.is_empty());
        assert_eq!(split.naive.orders.len(), 2);
        assert_eq!(split.naive.offset, 1);
    }

    #[test]
    fn test_filters_cascade_from_first_unrecognized() {
        let q = Query::new()
            .filter(Filter::value_compare(Op::NotEqual, "a"))
            .filter(Filter::custom("any", |_| true))
            .filter(Filter::value_compare(Op::NotEqual, "b"))
            .with_limit(4);
        let split = split_query(&prefix(), &q);

        assert_eq!(split.child.filters.len(), 1);
        assert_eq!(split.naive.filters.len(), 2);
        assert_eq!(split.naive.filters[0].to_string(), "FN(any)");
        assert_eq!(split.naive.limit, 4);
        assert_eq!(split.child.limit, 0);
    }

    #[test]
    fn test_key_filters_stay_naive_on_opaque_transform() {
        let q = Query::new()
            .filter(Filter::value_compare(Op::Equal, "v"))
            .filter(Filter::key_compare(Op::LessThan, "/m"));
        let split = split_query(&opaque(), &q);

        assert_eq!(split.child.filters.len(), 1);
        assert_eq!(split.naive.filters[0].to_string(), r#"KEY < "/m""#);

        let q = Query::new().filter(Filter::key_prefix("/m/"));
        let split = split_query(&opaque(), &q);
        assert!(split.child.filters.is_empty());
        assert_eq!(split.naive.filters.len(), 1);
    }

    #[test]
    fn test_key_equality_pushed_on_opaque_transform() {
        let q = Query::new()
            .filter(Filter::key_compare(Op::Equal, "/m"))
            .filter(Filter::key_compare(Op::NotEqual, "/n"))
            .with_limit(1);
        let split = split_query(&opaque(), &q);

        assert_eq!(
            split.child.filters.iter().map(|f| f.to_string()).collect::<Vec<_>>(),
            vec![r#"KEY == "/ns/m""#.to_string(), r#"KEY != "/ns/n""#.to_string()]
        );
        assert!(split.naive.filters.is_empty());
        assert_eq!(split.child.limit, 1);
    }
}
