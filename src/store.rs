use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::{LedgerEntry, Placement};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Verdict of an atomic placement commit.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CommitOutcome {
    Committed,
    AlreadyOccupied,
    InsufficientBudget,
}

/// Durable per-user ledger of upstream readings.
pub trait LedgerStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<LedgerEntry>, StorageError>;

    /// Fold a fresh upstream reading into the ledger. The first reading
    /// ever recorded for a user becomes their permanent baseline.
    async fn record_reading(
        &self,
        user_id: &str,
        reported_total_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, StorageError>;
}

/// Durable, coordinate-keyed record of committed placements. The store,
/// not the caller, decides who won a race for a cell.
pub trait PlacementStore {
    /// Atomically re-validate the budget against committed spend and
    /// claim the cell. Either the placement is durable on return or the
    /// call had no effect.
    async fn try_commit(
        &self,
        placement: &Placement,
        gross_budget_seconds: u64,
        overwrite_allowed: bool,
    ) -> Result<CommitOutcome, StorageError>;

    async fn get(&self, x: u32, y: u32) -> Result<Option<Placement>, StorageError>;

    async fn list_all(&self) -> Result<Vec<Placement>, StorageError>;

    /// Live sum of `time_deducted_seconds` over the user's committed
    /// placements. This is the only definition of "spent".
    async fn spent_seconds(&self, user_id: &str) -> Result<u64, StorageError>;
}
