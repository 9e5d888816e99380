use crate::client::{
    Ack, ContinuationToken, Entity, EntityKey, Filter, QueryPage, StoredEntity, TableClient,
};
use std::future::Future;
use std::time::Duration;

/// Retries a failed call a fixed number of times with a fixed pause in between.
///
/// `attempts` counts every try, the first one included. With the default of
/// 3 attempts spaced 3 seconds apart a call that keeps failing gives up after
/// roughly 6 seconds plus the time spent in the three calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearRetry {
    attempts: u32,
    interval: Duration,
}

impl Default for LinearRetry {
    fn default() -> Self {
        Self {
            attempts: 3,
            interval: Duration::from_millis(3000),
        }
    }
}

impl LinearRetry {
    /// Creates a policy. An `attempts` of 0 is treated as 1.
    pub fn new(attempts: u32, interval: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            interval,
        }
    }

    /// A policy that tries once and never waits.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Runs `call` until it succeeds, the attempts are used up, or `client`
    /// reports the error as not retryable. The last error is returned as is.
    pub async fn run<C, T, F, Fut>(
        &self,
        client: &C,
        operation: &'static str,
        mut call: F,
    ) -> Result<T, C::Error>
    where
        C: TableClient,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, C::Error>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < self.attempts && client.is_retryable(&err) => {
                    tracing::warn!(
                        operation,
                        attempt,
                        err = %err,
                        "table operation failed, retrying in {:?}",
                        self.interval
                    );
                    tokio::time::sleep(self.interval).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// A [`TableClient`] that runs every call of the wrapped client through a [`LinearRetry`].
#[derive(Debug)]
pub struct WithRetry<C> {
    inner: C,
    policy: LinearRetry,
}

impl<C: TableClient> WithRetry<C> {
    pub fn new(inner: C, policy: LinearRetry) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> LinearRetry {
        self.policy
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C: TableClient> TableClient for WithRetry<C> {
    type Error = C::Error;

    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool, Self::Error> {
        let inner = &self.inner;
        self.policy
            .run(inner, "create_table", || inner.create_table_if_not_exists(table))
            .await
    }

    async fn retrieve_entity(
        &self,
        table: &str,
        key: &EntityKey,
    ) -> Result<Option<StoredEntity>, Self::Error> {
        let inner = &self.inner;
        self.policy
            .run(inner, "retrieve_entity", || inner.retrieve_entity(table, key))
            .await
    }

    async fn insert_or_replace_entity(&self, table: &str, entity: &Entity) -> Result<Ack, Self::Error> {
        let inner = &self.inner;
        self.policy
            .run(inner, "insert_or_replace_entity", || {
                inner.insert_or_replace_entity(table, entity)
            })
            .await
    }

    async fn delete_entity(&self, table: &str, key: &EntityKey) -> Result<Ack, Self::Error> {
        let inner = &self.inner;
        self.policy
            .run(inner, "delete_entity", || inner.delete_entity(table, key))
            .await
    }

    async fn query_entities(
        &self,
        table: &str,
        filter: &Filter,
        continuation: Option<&ContinuationToken>,
    ) -> Result<QueryPage, Self::Error> {
        let inner = &self.inner;
        self.policy
            .run(inner, "query_entities", || {
                inner.query_entities(table, filter, continuation)
            })
            .await
    }

    fn is_retryable(&self, error: &Self::Error) -> bool {
        self.inner.is_retryable(error)
    }
}
