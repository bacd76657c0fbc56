//! Dstore Storage - Datastore contract and concrete backends
//!
//! This crate provides:
//! - The `Datastore` trait and its optional contracts
//! - A capability table probed once per backend instance
//! - In-memory `MapDatastore` and no-op `NullDatastore`
//! - redb-based `RedbDatastore`
//! - A reusable conformance suite (feature `test-suite`)

pub mod capability;
pub mod datastore;
pub mod memory;
pub mod redb_backend;
#[cfg(any(test, feature = "test-suite"))]
pub mod test_suite;

// Re-export commonly used types
pub use capability::{capability_by_name, Capability, CapabilityDescriptor, CapabilitySet, CAPABILITIES};
pub use datastore::{
    Batch, BatchOp, Batching, CheckedDatastore, Datastore, GcDatastore, PersistentDatastore,
    ScrubbedDatastore,
};
pub use memory::{MapDatastore, NullDatastore};
pub use redb_backend::RedbDatastore;
