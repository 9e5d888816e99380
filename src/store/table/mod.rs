mod sweeper;

pub use sweeper::{ExpirySweeper, SweepReport, SweeperHandle, parse_schedule};

use crate::client::{Ack, Entity, EntityKey, LinearRetry, StoredEntity, TableClient, WithRetry};
use crate::config::StoreConfig;
use crate::store::{Error, SessionStore, deserialize_value, serialize_value};
use serde::{Serialize, de::DeserializeOwned};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Table used when none is configured.
pub const DEFAULT_TABLE: &str = "ConnectAzureTablesSessions";

/// Default cleanup schedule: second 59 of every minute.
pub const DEFAULT_CLEANUP_CRON: &str = "59 * * * * *";

/// A builder for creating a `TableStore`.
///
/// This allows for customizing the table name, the retry policy and the
/// expired-session cleanup.
#[derive(Debug)]
pub struct TableStoreBuilder<C> {
    client: C,
    table_name: String,
    session_timeout: Option<Duration>,
    cleanup_cron: String,
    retry_policy: LinearRetry,
}

impl<C: TableClient> TableStoreBuilder<C> {
    /// Creates a new builder around a table client with default settings.
    ///
    /// Without a session timeout no cleanup runs.
    pub fn new(client: C) -> Self {
        Self {
            client,
            table_name: DEFAULT_TABLE.to_string(),
            session_timeout: None,
            cleanup_cron: DEFAULT_CLEANUP_CRON.to_string(),
            retry_policy: LinearRetry::default(),
        }
    }

    /// Creates a builder from a resolved [`StoreConfig`].
    pub fn from_config(client: C, config: &StoreConfig) -> Self {
        let mut builder = Self::new(client);
        if let Some(table) = &config.table {
            builder.table_name = table.clone();
        }
        if let Some(cron) = &config.override_cron {
            builder.cleanup_cron = cron.clone();
        }
        builder.session_timeout = config.session_timeout();
        builder
    }

    /// Sets a custom table name for the session store. Defaults to "ConnectAzureTablesSessions".
    pub fn table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = table_name.into();
        self
    }

    /// Sets the age after which a session is removed by the cleanup task.
    ///
    /// A zero timeout disables the cleanup.
    pub fn session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = Some(timeout);
        self
    }

    /// Sets the cron pattern (seconds first) the cleanup task runs on.
    ///
    /// Defaults to `59 * * * * *`.
    pub fn cleanup_cron(mut self, pattern: impl Into<String>) -> Self {
        self.cleanup_cron = pattern.into();
        self
    }

    /// Sets the retry policy applied to every table call. Defaults to 3 attempts, 3 seconds apart.
    pub fn retry_policy(mut self, policy: LinearRetry) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Builds the `TableStore`, creating the table if it doesn't exist and
    /// starting the cleanup task when a session timeout is set.
    ///
    /// Fails if the table cannot be created.
    pub async fn build(self) -> Result<TableStore<C>, Error> {
        let schedule = match self.session_timeout {
            Some(timeout) if !timeout.is_zero() => Some(parse_schedule(&self.cleanup_cron)?),
            _ => None,
        };

        let client = Arc::new(WithRetry::new(self.client, self.retry_policy));
        let table: Arc<str> = Arc::from(self.table_name);

        let created = client
            .create_table_if_not_exists(&table)
            .await
            .map_err(|err| {
                tracing::error!(table = %table, err = %err, "failed to create session table");
                Error::TableCreation {
                    table: table.to_string(),
                    source: Box::new(err),
                }
            })?;

        if created {
            tracing::info!(table = %table, "created session table");
        }

        let sweeper = match (schedule, self.session_timeout) {
            (Some(schedule), Some(timeout)) => {
                ExpirySweeper::new(Arc::clone(&client), Arc::clone(&table), timeout).map(|sweeper| {
                    tracing::info!(
                        table = %table,
                        timeout = ?timeout,
                        cron = %self.cleanup_cron,
                        "starting session cleanup"
                    );
                    Arc::new(sweeper.spawn(schedule))
                })
            }
            _ => None,
        };

        Ok(TableStore {
            client,
            table,
            session_timeout: self.session_timeout,
            sweeper,
        })
    }
}

/// A session store backed by a remote table service.
///
/// Each session is one entity keyed by its sanitized id (see
/// [`sanitize`](crate::store::sanitize)), holding the JSON payload in a `data`
/// attribute. The table service's own `Timestamp` tracks when a session was
/// last written, which is what the cleanup task compares against.
pub struct TableStore<C: TableClient> {
    client: Arc<WithRetry<C>>,
    table: Arc<str>,
    session_timeout: Option<Duration>,
    sweeper: Option<Arc<SweeperHandle>>,
}

impl<C: TableClient> Clone for TableStore<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            table: Arc::clone(&self.table),
            session_timeout: self.session_timeout,
            sweeper: self.sweeper.clone(),
        }
    }
}

impl<C: TableClient> fmt::Debug for TableStore<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableStore")
            .field("table", &self.table)
            .field("retry_policy", &self.client.policy())
            .field("session_timeout", &self.session_timeout)
            .field("sweeping", &self.is_sweeping())
            .finish()
    }
}

impl<C: TableClient> TableStore<C> {
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// The underlying table client, without the retry wrapper.
    pub fn client(&self) -> &C {
        self.client.inner()
    }

    /// Whether the scheduled cleanup task is running.
    pub fn is_sweeping(&self) -> bool {
        self.sweeper.as_ref().is_some_and(|handle| !handle.is_finished())
    }

    /// A sweeper over this store's table for running a cleanup cycle by hand.
    ///
    /// `None` when no session timeout is configured.
    pub fn sweeper(&self) -> Option<ExpirySweeper<WithRetry<C>>> {
        ExpirySweeper::new(
            Arc::clone(&self.client),
            Arc::clone(&self.table),
            self.session_timeout?,
        )
    }

    async fn update<T>(&self, method: &'static str, session_id: &str, payload: &T) -> Result<Ack, Error>
    where
        T: Serialize + Send + Sync + ?Sized,
    {
        tracing::info!(operation = method, session_id, "session store called");

        let entity = Entity {
            key: EntityKey::for_session(session_id),
            data: serialize_value(payload)?,
        };

        self.client
            .insert_or_replace_entity(&self.table, &entity)
            .await
            .map_err(|err| {
                tracing::error!(operation = method, err = %err, "failed to write session to store");
                Error::backend(err)
            })
    }
}

impl<C: TableClient> SessionStore for TableStore<C> {
    async fn get<T>(&self, session_id: &str) -> Result<Option<T>, Error>
    where
        T: DeserializeOwned + Send,
    {
        tracing::info!(operation = "GET", session_id, "session store called");

        let key = EntityKey::for_session(session_id);
        let entity = self
            .client
            .retrieve_entity(&self.table, &key)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to get session from store");
                Error::backend(err)
            })?;

        match entity {
            Some(StoredEntity { data: Some(data), .. }) => Ok(Some(deserialize_value(&data)?)),
            Some(_) => Err(Error::Decode(format!("session entity {key} has no data"))),
            None => Ok(None),
        }
    }

    async fn set<T>(&self, session_id: &str, payload: &T) -> Result<Ack, Error>
    where
        T: Serialize + Send + Sync + ?Sized,
    {
        self.update("SET", session_id, payload).await
    }

    async fn destroy(&self, session_id: &str) -> Result<Ack, Error> {
        tracing::info!(operation = "DESTROY", session_id, "session store called");

        let key = EntityKey::for_session(session_id);
        self.client
            .delete_entity(&self.table, &key)
            .await
            .map_err(|err| {
                tracing::error!(err = %err, "failed to delete session from store");
                Error::backend(err)
            })
    }

    async fn touch<T>(&self, session_id: &str, payload: &T) -> Result<Ack, Error>
    where
        T: Serialize + Send + Sync + ?Sized,
    {
        self.update("TOUCH", session_id, payload).await
    }
}
