use crate::Entry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Caller-supplied entry comparator
pub type Comparator = Arc<dyn Fn(&Entry, &Entry) -> Ordering + Send + Sync>;

/// Ordering criterion
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Order {
    ByKey,
    ByKeyDescending,
    ByValue,
    ByValueDescending,
    /// Arbitrary comparator; never serialized
    #[serde(skip)]
    Custom { name: String, compare: Comparator },
}

impl Order {
    pub fn custom<F>(name: impl Into<String>, compare: F) -> Self
    where
        F: Fn(&Entry, &Entry) -> Ordering + Send + Sync + 'static,
    {
        Order::Custom {
            name: name.into(),
            compare: Arc::new(compare),
        }
    }

    /// Compare two entries under this single criterion
    pub fn compare(&self, a: &Entry, b: &Entry) -> Ordering {
        match self {
            Order::ByKey => a.key.cmp(&b.key),
            Order::ByKeyDescending => b.key.cmp(&a.key),
            Order::ByValue => a.value_bytes().cmp(b.value_bytes()),
            Order::ByValueDescending => b.value_bytes().cmp(a.value_bytes()),
            Order::Custom { compare, .. } => compare(a, b),
        }
    }

    pub fn is_by_key(&self) -> bool {
        matches!(self, Order::ByKey | Order::ByKeyDescending)
    }

    pub fn is_by_value(&self) -> bool {
        matches!(self, Order::ByValue | Order::ByValueDescending)
    }
}

/// Composite comparison: first criterion decides, ties fall through to the next
pub fn compare(orders: &[Order], a: &Entry, b: &Entry) -> Ordering {
    for order in orders {
        match order.compare(a, b) {
            Ordering::Equal => continue,
            decided => return decided,
        }
    }
    Ordering::Equal
}

/// Stable in-place sort under the composite comparator
pub fn sort(orders: &[Order], entries: &mut [Entry]) {
    entries.sort_by(|a, b| compare(orders, a, b));
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Order::ByKey => f.write_str("KEY"),
            Order::ByKeyDescending => f.write_str("desc(KEY)"),
            Order::ByValue => f.write_str("VALUE"),
            Order::ByValueDescending => f.write_str("desc(VALUE)"),
            Order::Custom { name, .. } => write!(f, "FN({})", name),
        }
    }
}

impl fmt::Debug for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Order({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(pairs: &[(&str, &str)]) -> Vec<Entry> {
        pairs.iter().map(|(k, v)| Entry::new(*k, v.to_string())).collect()
    }

    fn keys(entries: &[Entry]) -> Vec<&str> {
        entries.iter().map(|e| e.key.as_str()).collect()
    }

    #[test]
    fn test_single_orders() {
        let mut e = entries(&[("/b", "1"), ("/a", "3"), ("/c", "2")]);

        sort(&[Order::ByKey], &mut e);
        assert_eq!(keys(&e), vec!["/a", "/b", "/c"]);

        sort(&[Order::ByKeyDescending], &mut e);
        assert_eq!(keys(&e), vec!["/c", "/b", "/a"]);

        sort(&[Order::ByValue], &mut e);
        assert_eq!(keys(&e), vec!["/b", "/c", "/a"]);

        sort(&[Order::ByValueDescending], &mut e);
        assert_eq!(keys(&e), vec!["/a", "/c", "/b"]);
    }

    #[test]
    fn test_composite_tie_break() {
        let mut e = entries(&[("/b", "x"), ("/c", "a"), ("/a", "x")]);
        sort(&[Order::ByValue, Order::ByKeyDescending], &mut e);
        assert_eq!(keys(&e), vec!["/c", "/b", "/a"]);
    }

    #[test]
    fn test_sort_is_stable_without_criteria() {
        let mut e = entries(&[("/z", "1"), ("/a", "1"), ("/m", "1")]);
        sort(&[Order::ByValue], &mut e);
        assert_eq!(keys(&e), vec!["/z", "/a", "/m"]);
    }

    #[test]
    fn test_custom_comparator() {
        let by_len = Order::custom("key-len", |a: &Entry, b: &Entry| a.key.len().cmp(&b.key.len()));
        let mut e = entries(&[("/ccc", ""), ("/a", ""), ("/bb", "")]);
        sort(&[by_len], &mut e);
        assert_eq!(keys(&e), vec!["/a", "/bb", "/ccc"]);
    }

    #[test]
    fn test_display() {
        let rendered: Vec<String> = [Order::ByValue, Order::ByKeyDescending]
            .iter()
            .map(|o| o.to_string())
            .collect();
        assert_eq!(rendered, vec!["VALUE", "desc(KEY)"]);
    }
}
