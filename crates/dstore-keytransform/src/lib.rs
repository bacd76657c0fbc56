//! Dstore Keytransform - Key-rewriting datastore wrappers
//!
//! This crate provides:
//! - The `KeyTransform` contract with `Pair` and `PrefixTransform`
//! - A query splitter deciding what a wrapped datastore evaluates natively
//! - `TransformDatastore`, which applies a transform to a child datastore
//! - Namespaced views built on the prefix transform

pub mod datastore;
pub mod namespace;
pub mod split;
pub mod transform;

// Re-export commonly used types
pub use datastore::TransformDatastore;
pub use split::{split_query, QuerySplit};
pub use transform::{KeyMapping, KeyTransform, Pair, PrefixTransform};
