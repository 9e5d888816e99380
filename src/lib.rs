//! # Ruts Tables: a table-storage session store
//!
//! `ruts-tables` persists web sessions in a managed key-attribute table service
//! (partition key, row key, attributes, and a service-maintained `Timestamp`).
//! It exposes the `get`/`set`/`destroy`/`touch` contract a session middleware
//! needs, retries every remote call with a linear policy, and can sweep expired
//! sessions out of the table on a cron schedule.
//!
//! # Quick Start
//!
//! The store is generic over a [`TableClient`](client::TableClient). The in-memory
//! client (`memory-client` feature, enabled by default) is enough to try it out:
//!
//! ```rust,no_run
//! use ruts_tables::client::MemoryTableClient;
//! use ruts_tables::store::SessionStore;
//! use ruts_tables::store::table::TableStoreBuilder;
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize, Deserialize)]
//! struct Cart {
//!     items: Vec<u32>,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), ruts_tables::store::Error> {
//!     let store = TableStoreBuilder::new(MemoryTableClient::new())
//!         .table_name("WebSessions")
//!         // Sessions not written for 30 minutes are deleted...
//!         .session_timeout(Duration::from_secs(30 * 60))
//!         // ...by a sweep that runs at second 59 of every minute.
//!         .cleanup_cron("59 * * * * *")
//!         .build()
//!         .await?;
//!
//!     store.set("sid", &Cart { items: vec![1, 2] }).await?;
//!     let cart: Option<Cart> = store.get("sid").await?;
//!     assert_eq!(cart.map(|c| c.items.len()), Some(2));
//!
//!     store.destroy("sid").await?;
//!     Ok(())
//! }
//! ```
//!
//! # Session Keys
//!
//! Table keys only allow a restricted alphabet, so every character outside
//! `[0-9A-Za-z]` is stripped from a session id before it is used as partition
//! and row key. Ids that differ only in stripped characters (`a-b` and `ab`)
//! address the same session.
//!
//! # Retries
//!
//! Every table call, including the sweep's queries and deletes, goes through a
//! [`LinearRetry`](client::LinearRetry): 3 attempts, 3 seconds apart, unless
//! overridden with `TableStoreBuilder::retry_policy`. Which errors are worth
//! retrying is up to the client's [`is_retryable`](client::TableClient::is_retryable).
//!
//! # Expiry Sweeping
//!
//! With a non-zero session timeout, building the store starts a background task
//! that, on every fire time of the cron pattern, deletes each session whose
//! `Timestamp` is older than the timeout. A cycle pages through the whole result
//! set with one fixed cutoff, and keeps going past failed deletes; failed work is
//! picked up again by the next cycle. Cycles never overlap. The task stops when
//! the last clone of the store is dropped.
//!
//! # Configuration
//!
//! [`config::StoreConfig`] deserializes the recognized options and resolves
//! storage credentials from the environment at startup. The store itself never
//! reads the environment.

pub mod client;
pub mod config;
pub mod store;

mod completion;
pub use completion::detach;
