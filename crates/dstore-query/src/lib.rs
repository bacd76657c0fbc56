//! Dstore Query - Query model and lazy results streams
//!
//! This crate provides:
//! - `Query` with filters, orders, limit and offset
//! - `Results`, a closeable consume-once stream of entries
//! - Producer-backed results with cancellation (`ResultBuilder`)
//! - An async push view of any stream (`ResultStream`)
//! - Naive operators that evaluate any part of a query in memory

pub mod builder;
pub mod entry;
pub mod filter;
pub mod naive;
pub mod order;
pub mod query;
pub mod results;
pub mod stream;

// Re-export commonly used types
pub use builder::{Producer, ResultBuilder};
pub use entry::{Entry, QueryResult};
pub use filter::{Filter, Op, Predicate};
pub use naive::{naive_filter, naive_limit, naive_offset, naive_order, naive_query_apply};
pub use order::{Comparator, Order};
pub use query::Query;
pub use results::{RestError, ResultSource, Results, ResultsIterator};
pub use stream::ResultStream;
