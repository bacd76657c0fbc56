use crate::{Filter, Order};
use dstore_core::Key;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Declarative description of a read
///
/// A query is plain data. A datastore may satisfy any part of it natively
/// and leave the rest to [`crate::naive::naive_query_apply`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Query {
    /// Restrict results to the subtree under this key; root means everything
    pub prefix: Key,
    /// Predicates every entry must satisfy
    pub filters: Vec<Filter>,
    /// Ordering criteria, most significant first
    pub orders: Vec<Order>,
    /// Maximum number of entries; 0 is unbounded
    pub limit: usize,
    /// Number of leading entries to skip
    pub offset: usize,
    /// Suppress value material
    pub keys_only: bool,
    pub return_expirations: bool,
    pub returns_sizes: bool,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(mut self, prefix: impl Into<Key>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order(mut self, order: Order) -> Self {
        self.orders.push(order);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    pub fn keys_only(mut self) -> Self {
        self.keys_only = true;
        self
    }

    pub fn with_expirations(mut self) -> Self {
        self.return_expirations = true;
        self
    }

    pub fn with_sizes(mut self) -> Self {
        self.returns_sizes = true;
        self
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SELECT keys")?;
        if !self.keys_only {
            f.write_str(",vals")?;
        }
        if self.return_expirations {
            f.write_str(",exps")?;
        }
        if !self.prefix.is_root() {
            write!(f, " FROM {:?}", self.prefix.as_str())?;
        }
        if !self.filters.is_empty() {
            let filters: Vec<String> = self.filters.iter().map(|x| x.to_string()).collect();
            write!(f, " FILTER [{}]", filters.join(", "))?;
        }
        if !self.orders.is_empty() {
            let orders: Vec<String> = self.orders.iter().map(|x| x.to_string()).collect();
            write!(f, " ORDER [{}]", orders.join(", "))?;
        }
        if self.offset > 0 {
            write!(f, " OFFSET {}", self.offset)?;
        }
        if self.limit > 0 {
            write!(f, " LIMIT {}", self.limit)?;
        }
        Ok(())
    }
}
