//! Configuration resolved once, at startup, before a store is built.
//!
//! [`TableStore`](crate::store::table::TableStore) never looks at the environment
//! itself. The host reads a [`StoreConfig`], resolves [`Credentials`] with it, builds
//! a table client from those credentials, and hands both to
//! [`TableStoreBuilder::from_config`](crate::store::table::TableStoreBuilder::from_config).

use crate::store::Error;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;

pub const CONNECTION_STRING_VAR: &str = "AZURE_STORAGE_CONNECTION_STRING";
pub const ACCOUNT_VAR: &str = "AZURE_STORAGE_ACCOUNT";
pub const ACCESS_KEY_VAR: &str = "AZURE_STORAGE_ACCESS_KEY";

/// Store options, in the shape they appear in a JSON or TOML config document.
///
/// ```
/// use ruts_tables::config::StoreConfig;
///
/// let config: StoreConfig = serde_json::from_str(
///     r#"{ "table": "WebSessions", "sessionTimeOut": 30, "overrideCron": "0 */5 * * * *" }"#,
/// ).unwrap();
/// assert_eq!(config.session_timeout(), Some(std::time::Duration::from_secs(30 * 60)));
/// ```
#[derive(Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub storage_account: Option<String>,
    pub access_key: Option<String>,
    pub table: Option<String>,
    /// Minutes without a write after which a session is swept. Unset or 0 disables sweeping.
    #[serde(rename = "sessionTimeOut")]
    pub session_timeout_minutes: Option<u64>,
    pub override_cron: Option<String>,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("storage_account", &self.storage_account)
            .field("access_key", &self.access_key.as_ref().map(|_| "<redacted>"))
            .field("table", &self.table)
            .field("session_timeout_minutes", &self.session_timeout_minutes)
            .field("override_cron", &self.override_cron)
            .finish()
    }
}

impl StoreConfig {
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_minutes
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs(minutes.saturating_mul(60)))
    }

    /// Resolves credentials from the process environment, falling back to this config.
    pub fn resolve_credentials(&self) -> Result<Credentials, Error> {
        self.resolve_credentials_with(|name| std::env::var(name).ok())
    }

    /// Resolves credentials using `lookup` as the environment.
    ///
    /// A connection string wins. Otherwise the account and key are each taken from
    /// the environment first and this config second.
    pub fn resolve_credentials_with<F>(&self, lookup: F) -> Result<Credentials, Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(connection_string) = lookup(CONNECTION_STRING_VAR) {
            return Ok(Credentials::ConnectionString(connection_string));
        }

        let account = lookup(ACCOUNT_VAR).or_else(|| non_empty(&self.storage_account));
        let key = lookup(ACCESS_KEY_VAR).or_else(|| non_empty(&self.access_key));

        match (account, key) {
            (Some(account), Some(key)) => Ok(Credentials::SharedKey { account, key }),
            _ => Err(Error::MissingCredentials),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|value| !value.is_empty()).cloned()
}

/// How a table client authenticates against the storage account.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    ConnectionString(String),
    SharedKey { account: String, key: String },
}

impl Credentials {
    /// The storage account name, when it is known without parsing a connection string.
    pub fn account(&self) -> Option<&str> {
        match self {
            Credentials::SharedKey { account, .. } => Some(account.as_str()),
            Credentials::ConnectionString(_) => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::ConnectionString(_) => f
                .debug_tuple("ConnectionString")
                .field(&"<redacted>")
                .finish(),
            Credentials::SharedKey { account, .. } => f
                .debug_struct("SharedKey")
                .field("account", account)
                .field("key", &"<redacted>")
                .finish(),
        }
    }
}
