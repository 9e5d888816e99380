#![allow(dead_code)]

use ruts_tables::client::{
    Ack, ContinuationToken, Entity, EntityKey, Filter, LinearRetry, MemoryTableClient, QueryPage,
    StoredEntity, TableClient,
};
use ruts_tables::store::table::{TableStore, TableStoreBuilder};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub(crate) struct TestUser {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TestSession {
    pub user: TestUser,
    pub preferences: TestPreferences,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub(crate) struct TestPreferences {
    pub theme: String,
    pub language: String,
}

pub fn create_test_session() -> TestSession {
    TestSession {
        user: TestUser {
            id: 1,
            name: "Test User".to_string(),
        },
        preferences: TestPreferences {
            theme: "dark".to_string(),
            language: "en".to_string(),
        },
    }
}

pub const TABLE: &str = "table";

/// Retries immediately so failure tests don't wait.
pub fn fast_retry() -> LinearRetry {
    LinearRetry::new(3, Duration::ZERO)
}

pub async fn setup_store(client: MemoryTableClient) -> TableStore<MemoryTableClient> {
    TableStoreBuilder::new(client)
        .table_name(TABLE)
        .retry_policy(fast_retry())
        .build()
        .await
        .unwrap()
}

pub fn session_entity(id: &str) -> Entity {
    Entity {
        key: EntityKey::for_session(id),
        data: "{}".to_string(),
    }
}

/// A [`MemoryTableClient`] that remembers the arguments of every query.
#[derive(Debug, Default)]
pub struct RecordingClient {
    pub inner: MemoryTableClient,
    queries: Mutex<Vec<(Filter, Option<ContinuationToken>)>>,
}

impl RecordingClient {
    pub fn new(inner: MemoryTableClient) -> Self {
        Self {
            inner,
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<(Filter, Option<ContinuationToken>)> {
        self.queries.lock().clone()
    }
}

impl TableClient for RecordingClient {
    type Error = <MemoryTableClient as TableClient>::Error;

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, Self::Error> {
        self.inner.create_table_if_not_exists(table).await
    }

    async fn retrieve_entity(
        &self,
        table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredEntity>, Self::Error> {
        self.inner.retrieve_entity(table, key).await
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Ack, Self::Error> {
        self.inner.insert_or_replace_entity(table, entity).await
    }

    async fn delete_entity(&self, table: &str, key: &EntityKey) -> Result<Ack, Self::Error> {
        self.inner.delete_entity(table, key).await
    }

    async fn query_entities(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<QueryPage, Self::Error> {
        self.queries.lock().push((*filter, continuation.cloned()));
        self.inner.query_entities(table, filter, continuation).await
    }
}

/// Counters shared between a [`SlowQueryClient`] and the test observing it.
#[derive(Debug, Default)]
pub struct QueryStats {
    started: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl QueryStats {
    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a QueryStats);

impl<'a> InFlight<'a> {
    fn enter(stats: &'a QueryStats) -> Self {
        stats.started.fetch_add(1, Ordering::SeqCst);
        let now = stats.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        stats.max_in_flight.fetch_max(now, Ordering::SeqCst);
        Self(stats)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`MemoryTableClient`] whose queries take `delay` to answer.
#[derive(Debug)]
pub struct SlowQueryClient {
    pub inner: MemoryTableClient,
    delay: Duration,
    stats: Arc<QueryStats>,
}

impl SlowQueryClient {
    pub fn new(delay: Duration) -> (Self, Arc<QueryStats>) {
        let stats = Arc::new(QueryStats::default());
        let client = Self {
            inner: MemoryTableClient::new(),
            delay,
            stats: Arc::clone(&stats),
        };
        (client, stats)
    }
}

impl TableClient for SlowQueryClient {
    type Error = <MemoryTableClient as TableClient>::Error;

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, Self::Error> {
        self.inner.create_table_if_not_exists(table).await
    }

    async fn retrieve_entity(
        &self,
        table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredEntity>, Self::Error> {
        self.inner.retrieve_entity(table, key).await
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Ack, Self::Error> {
        self.inner.insert_or_replace_entity(table, entity).await
    }

    async fn delete_entity(&self, table: &str, key: &EntityKey) -> Result<Ack, Self::Error> {
        self.inner.delete_entity(table, key).await
    }

    async fn query_entities(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<QueryPage, Self::Error> {
        let _in_flight = InFlight::enter(&self.stats);
        tokio::time::sleep(self.delay).await;
        self.inner.query_entities(table, filter, continuation).await
    }
}
