use bytes::Bytes;
use chrono::{DateTime, Utc};
use dstore_core::DatastoreError;
use serde::{Deserialize, Serialize};

/// One key/value pair produced by a query
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Entry {
    /// Key in string form
    pub key: String,
    /// Value bytes, absent for keys-only queries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Bytes>,
    /// Value length in bytes, -1 when unknown
    pub size: i64,
    /// Expiration, when the backend tracks one and it was requested
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

impl Entry {
    /// Entry with a value; size is taken from the value length
    pub fn new(key: impl Into<String>, value: impl Into<Bytes>) -> Self {
        let value = value.into();
        Self {
            key: key.into(),
            size: value.len() as i64,
            value: Some(value),
            expiration: None,
        }
    }

    /// Entry without value material
    pub fn key_only(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
            size: -1,
            expiration: None,
        }
    }

    pub fn with_size(mut self, size: i64) -> Self {
        self.size = size;
        self
    }

    pub fn with_expiration(mut self, expiration: DateTime<Utc>) -> Self {
        self.expiration = Some(expiration);
        self
    }

    /// Value bytes, empty when absent
    pub fn value_bytes(&self) -> &[u8] {
        self.value.as_deref().unwrap_or(&[])
    }
}

/// A single item of a results stream: an entry or the error that ended its production
pub type QueryResult = std::result::Result<Entry, DatastoreError>;
