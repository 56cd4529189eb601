//! Records whose deletion failed after their item was removed
//!
//! The item is already gone from memory, so a record left behind would be
//! reloaded (and its recipients possibly delivered again) after a restart.
//! Deletion is retried from the scheduler with `2^n` second backoff until it
//! succeeds or [`MAX_CLEANUP_ATTEMPTS`] is reached.

use std::time::{Duration, SystemTime};

use dashmap::DashMap;
use hermod_common::ItemId;
use hermod_spool::{BackingStore, SpoolError};
use tracing::{error, info, warn};

pub const MAX_CLEANUP_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
pub struct CleanupEntry {
    pub id: ItemId,
    pub attempt_count: u32,
    pub next_retry_at: SystemTime,
    pub first_failure: SystemTime,
}

#[derive(Debug, Default)]
pub struct CleanupQueue {
    entries: DashMap<ItemId, CleanupEntry>,
}

impl CleanupQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a record whose first deletion attempt just failed; it is
    /// retried on the next pass.
    pub fn add_failed_deletion(&self, id: ItemId, now: SystemTime) {
        self.entries.insert(
            id.clone(),
            CleanupEntry {
                id,
                attempt_count: 1,
                next_retry_at: now,
                first_failure: now,
            },
        );
    }

    pub fn ready_for_retry(&self, now: SystemTime) -> Vec<CleanupEntry> {
        self.entries
            .iter()
            .filter(|entry| entry.value().next_retry_at <= now)
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn schedule_retry(&self, id: &ItemId, next_retry_at: SystemTime) {
        if let Some(mut entry) = self.entries.get_mut(id) {
            entry.attempt_count += 1;
            entry.next_retry_at = next_retry_at;
        }
    }

    pub fn remove(&self, id: &ItemId) {
        self.entries.remove(id);
    }

    #[must_use]
    pub fn contains(&self, id: &ItemId) -> bool {
        self.entries.contains_key(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Retry every deletion that is due, returning how many records are now
    /// gone.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub async fn process(&self, store: &dyn BackingStore, now: SystemTime) -> usize {
        let ready = self.ready_for_retry(now);
        if ready.is_empty() {
            return 0;
        }

        info!(count = ready.len(), "Retrying failed record deletions");

        let mut cleaned = 0;
        for entry in ready {
            match store.delete(&entry.id).await {
                Ok(()) | Err(SpoolError::NotFound(_)) => {
                    info!(
                        id = %entry.id,
                        attempt = entry.attempt_count,
                        "Deleted record after retry"
                    );
                    self.remove(&entry.id);
                    cleaned += 1;
                }
                Err(e) if entry.attempt_count >= MAX_CLEANUP_ATTEMPTS => {
                    error!(
                        id = %entry.id,
                        attempts = entry.attempt_count,
                        first_failure = ?entry.first_failure,
                        error = %e,
                        "CRITICAL: Failed to delete record after {} attempts, manual removal required. \
                         It will be loaded again on restart.",
                        entry.attempt_count
                    );
                    self.remove(&entry.id);
                }
                Err(e) => {
                    let delay = Duration::from_secs(2u64.pow(entry.attempt_count));
                    self.schedule_retry(&entry.id, now + delay);

                    warn!(
                        id = %entry.id,
                        attempt = entry.attempt_count + 1,
                        next_retry_secs = delay.as_secs(),
                        error = %e,
                        "Failed to delete record, will retry"
                    );
                }
            }
        }

        cleaned
    }
}
