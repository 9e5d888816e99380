pub mod table;

use serde::{Serialize, de::DeserializeOwned};
use std::future::Future;

pub use crate::client::Ack;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("Encoding failed with: {0}")]
    Encode(String),

    #[error("Decoding failed with: {0}")]
    Decode(String),

    /// An error reported by the table client, passed through untouched.
    #[error(transparent)]
    Backend(BoxError),

    #[error("failed to create table `{table}`: {source}")]
    TableCreation { table: String, source: BoxError },

    #[error("invalid cleanup schedule `{pattern}`: {reason}")]
    Schedule { pattern: String, reason: String },

    #[error(
        "no storage credentials: set AZURE_STORAGE_CONNECTION_STRING, or an account and access key"
    )]
    MissingCredentials,
}

impl Error {
    pub(crate) fn backend<E: std::error::Error + Send + Sync + 'static>(err: E) -> Self {
        Error::Backend(Box::new(err))
    }

    /// Returns the table client's error of type `E` behind an [`Error::Backend`]
    /// or an [`Error::TableCreation`].
    pub fn backend_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Error::Backend(inner) | Error::TableCreation { source: inner, .. } => {
                inner.downcast_ref::<E>()
            }
            _ => None,
        }
    }
}

pub(crate) fn serialize_value<T: Serialize + ?Sized>(value: &T) -> Result<String, Error> {
    serde_json::to_string(value).map_err(|e| Error::Encode(e.to_string()))
}

pub(crate) fn deserialize_value<T: DeserializeOwned>(value: &str) -> Result<T, Error> {
    serde_json::from_str(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Strips every character outside `[0-9A-Za-z]` so an id can be used as a table key.
///
/// Distinct ids that only differ in stripped characters end up under the same key.
pub fn sanitize(session_id: &str) -> String {
    session_id
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect()
}

/// The capability set a session middleware needs from its store.
///
/// A missing session is `Ok(None)`, never an error.
pub trait SessionStore: Clone + Send + Sync + 'static {
    /// Gets the payload stored at `session_id`.
    fn get<T>(&self, session_id: &str) -> impl Future<Output = Result<Option<T>, Error>> + Send
    where
        T: DeserializeOwned + Send;

    /// Stores `payload` at `session_id`, replacing whatever was there.
    fn set<T>(
        &self,
        session_id: &str,
        payload: &T,
    ) -> impl Future<Output = Result<Ack, Error>> + Send
    where
        T: Serialize + Send + Sync + ?Sized;

    /// Removes the session. Succeeds whether or not it existed.
    fn destroy(&self, session_id: &str) -> impl Future<Output = Result<Ack, Error>> + Send;

    /// Refreshes the session's last-modified time.
    ///
    /// Stores without a separate refresh path rewrite the payload.
    fn touch<T>(
        &self,
        session_id: &str,
        payload: &T,
    ) -> impl Future<Output = Result<Ack, Error>> + Send
    where
        T: Serialize + Send + Sync + ?Sized,
    {
        self.set(session_id, payload)
    }
}
