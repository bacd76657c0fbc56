//! Mount datastore: one keyspace assembled from child datastores
//!
//! Each child is mounted at a key prefix. Point operations go to the
//! mount with the longest matching prefix; queries fan out to every
//! mount under the query prefix and are merged back into a single
//! ordered stream.

mod batch;
pub mod lookup;
mod merge;
pub mod mount;

pub use lookup::Mount;
pub use mount::MountDatastore;
