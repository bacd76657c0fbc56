use crate::Entry;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Comparison operator used by key and value filters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Op {
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
}

impl Op {
    /// Whether `ordering` (actual compared to reference) satisfies this operator
    pub fn matches(self, ordering: Ordering) -> bool {
        match self {
            Op::Equal => ordering == Ordering::Equal,
            Op::NotEqual => ordering != Ordering::Equal,
            Op::GreaterThan => ordering == Ordering::Greater,
            Op::GreaterThanOrEqual => ordering != Ordering::Less,
            Op::LessThan => ordering == Ordering::Less,
            Op::LessThanOrEqual => ordering != Ordering::Greater,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Op::Equal => "==",
            Op::NotEqual => "!=",
            Op::GreaterThan => ">",
            Op::GreaterThanOrEqual => ">=",
            Op::LessThan => "<",
            Op::LessThanOrEqual => "<=",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Caller-supplied entry predicate
pub type Predicate = Arc<dyn Fn(&Entry) -> bool + Send + Sync>;

/// Query filter
///
/// The variant set is closed; code that can only evaluate some kinds
/// natively matches on the discriminant and hands the rest to the naive
/// operators.
#[derive(Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Compare the entry key against `key`
    KeyCompare { op: Op, key: String },
    /// Keep entries whose key string starts with `prefix`
    KeyPrefix { prefix: String },
    /// Compare the entry value bytes against `value`
    ValueCompare { op: Op, value: Bytes },
    /// Arbitrary predicate; never serialized
    #[serde(skip)]
    Custom { name: String, predicate: Predicate },
}

impl Filter {
    pub fn key_compare(op: Op, key: impl Into<String>) -> Self {
        Filter::KeyCompare {
            op,
            key: key.into(),
        }
    }

    pub fn key_prefix(prefix: impl Into<String>) -> Self {
        Filter::KeyPrefix {
            prefix: prefix.into(),
        }
    }

    pub fn value_compare(op: Op, value: impl Into<Bytes>) -> Self {
        Filter::ValueCompare {
            op,
            value: value.into(),
        }
    }

    pub fn custom<F>(name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Entry) -> bool + Send + Sync + 'static,
    {
        Filter::Custom {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the filter against an entry
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Filter::KeyCompare { op, key } => op.matches(entry.key.as_str().cmp(key.as_str())),
            Filter::KeyPrefix { prefix } => entry.key.starts_with(prefix.as_str()),
            Filter::ValueCompare { op, value } => {
                op.matches(entry.value_bytes().cmp(value.as_ref()))
            }
            Filter::Custom { predicate, .. } => predicate(entry),
        }
    }

    /// Whether the filter outcome depends only on the value, never the key
    pub fn is_key_independent(&self) -> bool {
        matches!(self, Filter::ValueCompare { .. })
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::KeyCompare { op, key } => write!(f, "KEY {} {:?}", op, key),
            Filter::KeyPrefix { prefix } => write!(f, "PREFIX({:?})", prefix),
            Filter::ValueCompare { op, value } => {
                write!(f, "VALUE {} {:?}", op, String::from_utf8_lossy(value))
            }
            Filter::Custom { name, .. } => write!(f, "FN({})", name),
        }
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Filter({})", self)
    }
}
