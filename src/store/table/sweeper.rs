//! Scheduled removal of sessions that have not been written for longer than the
//! session timeout.
//!
//! A cycle computes its cutoff once, then walks every page of the
//! `Timestamp lt cutoff` query, deleting each page's entities before following the
//! continuation token. Failures never escape a cycle: a failed query ends it early,
//! a failed delete is counted and skipped. Whatever was missed still matches the
//! filter on the next cycle.

use crate::client::{ContinuationToken, Filter, StoredEntity, TableClient};
use crate::store::Error;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

/// Parses a six-field, seconds-first cron pattern such as `59 * * * * *`.
pub fn parse_schedule(pattern: &str) -> Result<Schedule, Error> {
    Schedule::from_str(pattern).map_err(|err| Error::Schedule {
        pattern: pattern.to_string(),
        reason: err.to_string(),
    })
}

/// Outcome of one sweep cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Query pages fetched.
    pub pages: usize,
    pub deleted: usize,
    pub failed: usize,
    /// `false` if a query failed and the cycle stopped early.
    pub completed: bool,
}

/// Deletes sessions older than a timeout from a table.
pub struct ExpirySweeper<C> {
    client: Arc<C>,
    table: Arc<str>,
    timeout: Duration,
}

impl<C> Clone for ExpirySweeper<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            table: Arc::clone(&self.table),
            timeout: self.timeout,
        }
    }
}

impl<C> std::fmt::Debug for ExpirySweeper<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpirySweeper")
            .field("table", &self.table)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl<C: TableClient> ExpirySweeper<C> {
    /// Returns `None` for a zero timeout, which means sessions never expire.
    pub fn new(client: Arc<C>, table: impl Into<Arc<str>>, timeout: Duration) -> Option<Self> {
        if timeout.is_zero() {
            return None;
        }

        Some(Self {
            client,
            table: table.into(),
            timeout,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The instant before which a session counts as expired, given the current time.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.timeout)
            .ok()
            .and_then(|timeout| now.checked_sub_signed(timeout))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Runs one cycle against the current time.
    pub async fn sweep(&self) -> SweepReport {
        let cutoff = self.cutoff(Utc::now());
        tracing::info!(
            table = %self.table,
            timeout = ?self.timeout,
            %cutoff,
            "cleaning up expired sessions"
        );
        self.sweep_before(cutoff).await
    }

    /// Runs one cycle deleting every entity last written strictly before `cutoff`.
    ///
    /// The same filter is used for every page of the cycle.
    pub async fn sweep_before(&self, cutoff: DateTime<Utc>) -> SweepReport {
        let filter = Filter::TimestampBefore(cutoff);
        let mut report = SweepReport::default();
        let mut continuation: Option<ContinuationToken> = None;

        loop {
            let page = match self
                .client
                .query_entities(&self.table, &filter, continuation.as_ref())
                .await
            {
                Ok(page) => page,
                Err(err) => {
                    tracing::error!(
                        table = %self.table,
                        err = %err,
                        "error when checking for expired sessions"
                    );
                    return report;
                }
            };

            report.pages += 1;
            self.delete_page(page.entries, &mut report).await;

            match page.continuation {
                Some(next) => continuation = Some(next),
                None => break,
            }
        }

        report.completed = true;
        tracing::info!(
            table = %self.table,
            pages = report.pages,
            deleted = report.deleted,
            failed = report.failed,
            "session cleanup finished"
        );
        report
    }

    async fn delete_page(&self, entries: Vec<StoredEntity>, report: &mut SweepReport) {
        let mut deletes = JoinSet::new();
        for entry in entries {
            let client = Arc::clone(&self.client);
            let table = Arc::clone(&self.table);
            deletes.spawn(async move {
                let result = client.delete_entity(&table, &entry.key).await;
                (entry.key, result)
            });
        }

        while let Some(joined) = deletes.join_next().await {
            match joined {
                Ok((key, Ok(_))) => {
                    report.deleted += 1;
                    tracing::debug!(session = %key.partition_key, "cleaned up session");
                }
                Ok((key, Err(err))) => {
                    report.failed += 1;
                    tracing::error!(session = %key.partition_key, err = %err, "error deleting session");
                }
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(err = %err, "session delete task failed");
                }
            }
        }
    }

    /// Runs a cycle at every fire time of `schedule` until the handle is dropped.
    ///
    /// Cycles never overlap: the next fire time is picked after the previous cycle
    /// ends, so fire times that pass during a long cycle are skipped.
    pub fn spawn(self, schedule: Schedule) -> SweeperHandle {
        let task = tokio::spawn(async move {
            let mut last_fire: Option<DateTime<Utc>> = None;
            loop {
                let now = Utc::now();
                let from = match last_fire {
                    Some(fired) if fired > now => fired,
                    _ => now,
                };

                let Some(next) = schedule.after(&from).next() else {
                    tracing::warn!(table = %self.table, "cleanup schedule has no upcoming runs");
                    break;
                };

                let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
                tokio::time::sleep(wait).await;

                self.sweep().await;
                last_fire = Some(next);
            }
        });

        SweeperHandle { task }
    }
}

/// Owns a running cleanup task. Dropping the handle stops the task.
#[derive(Debug)]
pub struct SweeperHandle {
    task: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
