use crate::store::Error;
use std::future::Future;
use tokio::task::JoinHandle;

/// Runs a store operation in the background and discards its result.
///
/// For callers that do not need to wait for persistence. The operation still runs
/// to completion; its result is dropped, and a failure is only logged at `debug`.
/// Awaiting the returned handle waits for the operation without observing its result.
///
/// ```no_run
/// use ruts_tables::client::MemoryTableClient;
/// use ruts_tables::store::SessionStore;
/// use ruts_tables::store::table::TableStoreBuilder;
///
/// # async fn run() -> Result<(), ruts_tables::store::Error> {
/// let store = TableStoreBuilder::new(MemoryTableClient::new()).build().await?;
///
/// let detached = store.clone();
/// ruts_tables::detach("SET", async move {
///     detached.set("sid", &serde_json::json!({ "cart": [1, 2] })).await
/// });
/// # Ok(())
/// # }
/// ```
pub fn detach<F, T>(operation: &'static str, future: F) -> JoinHandle<()>
where
    F: Future<Output = Result<T, Error>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = future.await {
            tracing::debug!(operation, err = %err, "discarding failed session operation");
        }
    })
}
