use crate::client::{
    Ack, ContinuationToken, Entity, EntityKey, Filter, QueryPage, StoredEntity, TableClient,
};
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::ops::Bound;

/// The remote service's cap on entities per query page.
const DEFAULT_PAGE_SIZE: usize = 1000;

/// A table client operation, used to target injected failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateTable,
    Retrieve,
    Upsert,
    Delete,
    Query,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::CreateTable => "create table",
            Operation::Retrieve => "retrieve",
            Operation::Upsert => "upsert",
            Operation::Delete => "delete",
            Operation::Query => "query",
        };
        f.write_str(name)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    #[error("table `{0}` does not exist")]
    TableNotFound(String),

    #[error("injected {0} failure")]
    Injected(Operation),
}

#[derive(Debug, Default)]
struct Faults {
    pending: HashMap<Operation, usize>,
    poisoned_deletes: HashSet<EntityKey>,
}

/// An in-memory table client.
///
/// Entities are kept per table in key order, stamped with the current time on
/// every write, and returned from queries in pages of `page_size`. Failures can
/// be injected per operation or per key.
///
/// ### Note
///
/// Do not use this in a production environment.
#[derive(Debug)]
pub struct MemoryTableClient {
    tables: DashMap<String, BTreeMap<EntityKey, StoredEntity>>,
    page_size: usize,
    faults: Mutex<Faults>,
}

impl Default for MemoryTableClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTableClient {
    pub fn new() -> Self {
        Self {
            tables: DashMap::new(),
            page_size: DEFAULT_PAGE_SIZE,
            faults: Mutex::new(Faults::default()),
        }
    }

    /// Sets how many entities a query returns per page. Values below 1 are raised to 1.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Makes the next `times` calls of `operation` fail.
    pub fn fail_next(&self, operation: Operation, times: usize) {
        *self.faults.lock().pending.entry(operation).or_default() += times;
    }

    /// Makes every delete of `key` fail until [`clear_faults`](Self::clear_faults) is called.
    pub fn fail_deletes_of(&self, key: EntityKey) {
        self.faults.lock().poisoned_deletes.insert(key);
    }

    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Number of entities in `table`, or `None` if the table does not exist.
    pub fn len(&self, table: &str) -> Option<usize> {
        self.tables.get(table).map(|entities| entities.len())
    }

    pub fn contains(&self, table: &str, key: &EntityKey) -> bool {
        self.tables
            .get(table)
            .map(|entities| entities.contains_key(key))
            .unwrap_or(false)
    }

    fn check(&self, operation: Operation) -> Result<(), MemoryError> {
        let mut faults = self.faults.lock();
        if let Some(remaining) = faults.pending.get_mut(&operation) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(MemoryError::Injected(operation));
            }
        }
        Ok(())
    }

    fn check_delete(&self, key: &EntityKey) -> Result<(), MemoryError> {
        self.check(Operation::Delete)?;
        if self.faults.lock().poisoned_deletes.contains(key) {
            return Err(MemoryError::Injected(Operation::Delete));
        }
        Ok(())
    }
}

impl TableClient for MemoryTableClient {
    type Error = MemoryError;

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, MemoryError> {
        self.check(Operation::CreateTable)?;

        match self.tables.entry(table.to_string()) {
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(BTreeMap::new());
                Ok(true)
            }
        }
    }

    async fn retrieve_entity(
        &self,
        table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredEntity>, MemoryError> {
        self.check(Operation::Retrieve)?;

        let entities = self
            .tables
            .get(table)
            .ok_or_else(|| MemoryError::TableNotFound(table.to_string()))?;
        Ok(entities.get(key).cloned())
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Ack, MemoryError> {
        self.check(Operation::Upsert)?;

        let mut entities = self
            .tables
            .get_mut(table)
            .ok_or_else(|| MemoryError::TableNotFound(table.to_string()))?;

        let timestamp = Utc::now();
        entities.insert(
            entity.key.clone(),
            StoredEntity {
                key: entity.key.clone(),
                data: Some(entity.data.clone()),
                timestamp,
            },
        );

        Ok(Ack {
            etag: Some(format!("W/\"datetime'{}'\"", timestamp.to_rfc3339())),
        })
    }

    async fn delete_entity(&self, table: &str, key: &EntityKey) -> Result<Ack, MemoryError> {
        self.check_delete(key)?;

        let mut entities = self
            .tables
            .get_mut(table)
            .ok_or_else(|| MemoryError::TableNotFound(table.to_string()))?;
        entities.remove(key);

        Ok(Ack::default())
    }

    async fn query_entities(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<QueryPage, MemoryError> {
        self.check(Operation::Query)?;

        let entities = self
            .tables
            .get(table)
            .ok_or_else(|| MemoryError::TableNotFound(table.to_string()))?;

        let start = match continuation {
            Some(token) => Bound::Included(EntityKey::new(
                token.next_partition_key.clone(),
                token.next_row_key.clone(),
            )),
            None => Bound::Unbounded,
        };

        let mut entries: Vec<StoredEntity> = entities
            .range((start, Bound::Unbounded))
            .map(|(_, entity)| entity)
            .filter(|entity| filter.matches(entity))
            .take(self.page_size + 1)
            .cloned()
            .collect();

        let continuation = if entries.len() > self.page_size {
            entries.pop().map(|next| ContinuationToken::from(&next.key))
        } else {
            None
        };

        Ok(QueryPage {
            entries,
            continuation,
        })
    }
}
