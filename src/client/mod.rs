//! The remote table-store contract consumed by [`TableStore`](crate::store::table::TableStore).
//!
//! A table service addresses every record by a (partition key, row key) pair and
//! keeps its own last-modified `Timestamp` on each entity. This module describes the
//! five operations the session store needs from such a service; a concrete client
//! (an HTTP client for the managed service, or the in-memory [`MemoryTableClient`])
//! implements [`TableClient`].

#[cfg(feature = "memory-client")]
pub mod memory;
pub mod retry;

#[cfg(feature = "memory-client")]
pub use memory::{MemoryError, MemoryTableClient, Operation};
pub use retry::{LinearRetry, WithRetry};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

/// The two-part address of an entity.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
    pub partition_key: String,
    pub row_key: String,
}

impl EntityKey {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
        }
    }

    /// The key a session is stored under: the sanitized id as both partition and row key.
    ///
    /// Ids that only differ in characters outside `[0-9A-Za-z]` map to the same key.
    pub fn for_session(session_id: &str) -> Self {
        let clean = crate::store::sanitize(session_id);
        Self {
            partition_key: clean.clone(),
            row_key: clean,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.partition_key, self.row_key)
    }
}

/// An entity as written by the session store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub key: EntityKey,
    /// The serialized session payload.
    pub data: String,
}

/// An entity as returned by the table service.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub key: EntityKey,
    pub data: Option<String>,
    /// Last-modified time, maintained by the service on every write.
    pub timestamp: DateTime<Utc>,
}

/// Acknowledgement of a write or delete.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Ack {
    pub etag: Option<String>,
}

/// A query predicate understood by the table service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Filter {
    /// Entities whose `Timestamp` is strictly before the given instant.
    TimestampBefore(DateTime<Utc>),
}

impl Filter {
    pub fn matches(&self, entity: &StoredEntity) -> bool {
        match self {
            Filter::TimestampBefore(cutoff) => entity.timestamp < *cutoff,
        }
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::TimestampBefore(cutoff) => write!(
                f,
                "Timestamp lt datetime'{}'",
                cutoff.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
        }
    }
}

/// Marks where the next page of a query starts.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinuationToken {
    pub next_partition_key: String,
    pub next_row_key: String,
}

impl From<&EntityKey> for ContinuationToken {
    fn from(key: &EntityKey) -> Self {
        Self {
            next_partition_key: key.partition_key.clone(),
            next_row_key: key.row_key.clone(),
        }
    }
}

/// One page of query results.
#[derive(Clone, Debug, Default)]
pub struct QueryPage {
    pub entries: Vec<StoredEntity>,
    pub continuation: Option<ContinuationToken>,
}

/// Operations a table service client must provide.
pub trait TableClient: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Creates `table` if absent. Returns `true` if it was created by this call.
    fn create_table_if_not_exists(
        &self,
        table: &str,
    ) -> impl Future<Output = Result<bool, Self::Error>> + Send;

    /// Point read. `Ok(None)` when no entity exists under `key`.
    fn retrieve_entity(
        &self,
        table: &str,
        key: &EntityKey,
    ) -> impl Future<Output = Result<Option<StoredEntity>, Self::Error>> + Send;

    fn insert_or_replace_entity(
        &self,
        table: &str,
        entity: &Entity,
    ) -> impl Future<Output = Result<Ack, Self::Error>> + Send;

    fn delete_entity(
        &self,
        table: &str,
        key: &EntityKey,
    ) -> impl Future<Output = Result<Ack, Self::Error>> + Send;

    /// Returns one page of entities matching `filter`, starting at `continuation`.
    fn query_entities(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> impl Future<Output = Result<QueryPage, Self::Error>> + Send;

    /// Whether a failed call may succeed if issued again.
    fn is_retryable(&self, _error: &Self::Error) -> bool {
        true
    }
}
