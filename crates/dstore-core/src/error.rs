// Allow unused assignments for diagnostic fields - they're used by the macros
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Core error type for datastore operations
#[derive(Error, Debug, Diagnostic)]
pub enum DatastoreError {
    /// Key not found
    #[error("Key not found: {key}")]
    #[diagnostic(
        code(dstore::not_found),
        help("Verify the key exists in the datastore it routes to")
    )]
    NotFound {
        #[allow(unused)]
        key: String,
    },

    /// Backend rejected the value shape
    #[error("Invalid value type for {key}: {reason}")]
    #[diagnostic(
        code(dstore::invalid_value_type),
        help("Convert or serialize the value into the form this backend accepts")
    )]
    InvalidValueType {
        #[allow(unused)]
        key: String,
        #[allow(unused)]
        reason: String,
    },

    /// Write or delete outside every mounted subtree
    #[error("No datastore mounted for key: {key}")]
    #[diagnostic(
        code(dstore::no_mounted_datastore),
        help("Mount a datastore at an ancestor of this key, or at \"/\" to catch everything")
    )]
    NoMountedDatastore {
        #[allow(unused)]
        key: String,
    },

    /// Batch requested on a child that cannot batch
    #[error("Batching is not supported by the datastore at {prefix}")]
    #[diagnostic(
        code(dstore::batching_unsupported),
        help("Use point operations against this datastore, or mount a batching backend")
    )]
    BatchingUnsupported {
        #[allow(unused)]
        prefix: String,
    },

    /// Error raised by the datastore mounted at a prefix
    #[error("{operation} datastore at {prefix}: {source}")]
    #[diagnostic(
        code(dstore::mount_error),
        help("Inspect the backend mounted at {prefix}")
    )]
    Mount {
        #[allow(unused)]
        operation: String,
        #[allow(unused)]
        prefix: String,
        #[source]
        #[allow(unused)]
        source: Box<DatastoreError>,
    },

    /// Opaque backend error
    #[error("Backend error: {message}")]
    #[diagnostic(
        code(dstore::backend_error),
        help("Check backend logs and ensure the data directory is accessible and not corrupted")
    )]
    Backend {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Transaction error
    #[error("Transaction error: {message}")]
    #[diagnostic(
        code(dstore::transaction_error),
        help("Ensure the batch is not already committed")
    )]
    Transaction {
        #[allow(unused)]
        message: String,
    },

    /// I/O error
    #[error("I/O error: {message}")]
    #[diagnostic(
        code(dstore::io_error),
        help("Check filesystem permissions and available disk space")
    )]
    Io {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(
        code(dstore::serialization_error),
        help("Ensure the document is valid JSON or YAML")
    )]
    Serialization {
        #[allow(unused)]
        message: String,
        #[source]
        #[allow(unused)]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid configuration
    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(dstore::configuration), help("{suggestion}"))]
    Configuration {
        #[allow(unused)]
        message: String,
        #[allow(unused)]
        suggestion: String,
    },

    /// Production was cancelled before the stream was exhausted
    #[error("Query cancelled before completion")]
    #[diagnostic(
        code(dstore::cancelled),
        help("The results are truncated; re-run the query if the full set is needed")
    )]
    Cancelled,

    /// Operation on a closed datastore or stream
    #[error("Datastore closed")]
    #[diagnostic(code(dstore::closed), help("Open a new handle to continue"))]
    Closed,

    /// Internal error
    #[error("Internal error: {message}")]
    #[diagnostic(
        code(dstore::internal_error),
        help("This is likely a bug. Please report it with the full error details")
    )]
    Internal {
        #[allow(unused)]
        message: String,
    },
}

/// Result type alias for datastore operations
pub type Result<T> = std::result::Result<T, DatastoreError>;

impl DatastoreError {
    /// Create a NotFound error
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    /// Create an InvalidValueType error
    pub fn invalid_value_type(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValueType {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a NoMountedDatastore error
    pub fn no_mounted_datastore(key: impl Into<String>) -> Self {
        Self::NoMountedDatastore { key: key.into() }
    }

    /// Create a BatchingUnsupported error
    pub fn batching_unsupported(prefix: impl Into<String>) -> Self {
        Self::BatchingUnsupported {
            prefix: prefix.into(),
        }
    }

    /// Create a Backend error
    pub fn backend(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            message: message.into(),
            source,
        }
    }

    /// Create a Transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
        }
    }

    /// Create an Io error
    pub fn io(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a Serialization error
    pub fn serialization(
        message: impl Into<String>,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Self::Serialization {
            message: message.into(),
            source,
        }
    }

    /// Create a Configuration error
    pub fn configuration(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an Internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Annotate this error with the mount prefix and the operation that failed there.
    ///
    /// `operation` reads as a verb phrase, e.g. "checking" or "querying".
    pub fn at_mount(self, operation: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::Mount {
            operation: operation.into(),
            prefix: prefix.into(),
            source: Box::new(self),
        }
    }

    /// Whether this is a point miss, looking through mount annotations.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound { .. } => true,
            Self::Mount { source, .. } => source.is_not_found(),
            _ => false,
        }
    }
}

impl From<redb::Error> for DatastoreError {
    fn from(err: redb::Error) -> Self {
        match err {
            redb::Error::TableDoesNotExist(_) => {
                DatastoreError::backend("Table does not exist", Some(Box::new(err)))
            }
            _ => DatastoreError::backend(format!("redb error: {}", err), Some(Box::new(err))),
        }
    }
}

impl From<redb::DatabaseError> for DatastoreError {
    fn from(err: redb::DatabaseError) -> Self {
        DatastoreError::backend(format!("Database error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::TransactionError> for DatastoreError {
    fn from(err: redb::TransactionError) -> Self {
        DatastoreError::transaction(format!("Transaction error: {}", err))
    }
}

impl From<redb::StorageError> for DatastoreError {
    fn from(err: redb::StorageError) -> Self {
        DatastoreError::backend(format!("Storage error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::TableError> for DatastoreError {
    fn from(err: redb::TableError) -> Self {
        DatastoreError::backend(format!("Table error: {}", err), Some(Box::new(err)))
    }
}

impl From<redb::CommitError> for DatastoreError {
    fn from(err: redb::CommitError) -> Self {
        DatastoreError::transaction(format!("Commit error: {}", err))
    }
}

impl From<redb::CompactionError> for DatastoreError {
    fn from(err: redb::CompactionError) -> Self {
        DatastoreError::backend(format!("Compaction error: {}", err), Some(Box::new(err)))
    }
}

impl From<serde_json::Error> for DatastoreError {
    fn from(err: serde_json::Error) -> Self {
        DatastoreError::serialization(format!("JSON error: {}", err), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for DatastoreError {
    fn from(err: serde_yaml::Error) -> Self {
        DatastoreError::serialization(format!("YAML error: {}", err), Some(Box::new(err)))
    }
}

impl From<std::io::Error> for DatastoreError {
    fn from(err: std::io::Error) -> Self {
        DatastoreError::io(format!("I/O error: {}", err), Some(Box::new(err)))
    }
}
