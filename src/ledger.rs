//! Budget ledger. A user's placement budget is derived on every
//! reconciliation from the upstream reading and the placements they
//! have already committed; nothing here stores a balance.
use chrono::Utc;
use tracing::warn;

use crate::{
    models::BudgetSnapshot,
    store::{LedgerStore, PlacementStore, StorageError},
};

pub struct BudgetLedger<S> {
    store: S,
    grant_seconds: u64,
}

impl<S> BudgetLedger<S>
where
    S: LedgerStore + PlacementStore,
{
    pub fn new(store: S, grant_seconds: u64) -> Self {
        Self {
            store,
            grant_seconds,
        }
    }

    /// Fold the latest upstream reading into the ledger and return the
    /// user's current budget.
    ///
    /// The first reading for a user becomes their permanent baseline,
    /// so a new user starts with exactly the signup grant no matter how
    /// much coding time they banked before joining. A reading below the
    /// previous one is an upstream anomaly: the delta clamps at zero
    /// and the decrease is logged.
    pub async fn reconcile(
        &self,
        user_id: &str,
        reported_total_seconds: u64,
    ) -> Result<BudgetSnapshot, StorageError> {
        if let Some(previous) = self.store.fetch(user_id).await? {
            if reported_total_seconds < previous.last_known_reported_seconds {
                warn!(
                    "Reported total for {user_id} decreased: {reported_total_seconds} < {}",
                    previous.last_known_reported_seconds
                );
            }
        }

        let entry = self
            .store
            .record_reading(user_id, reported_total_seconds, Utc::now())
            .await?;

        let delta = entry
            .last_known_reported_seconds
            .saturating_sub(entry.baseline_reported_seconds);
        let gross_seconds = self.grant_seconds + delta;
        let spent_seconds = self.store.spent_seconds(user_id).await?;

        if spent_seconds > gross_seconds {
            warn!("Spent budget for {user_id} exceeds gross: {spent_seconds} > {gross_seconds}");
        }

        Ok(BudgetSnapshot {
            gross_seconds,
            spent_seconds,
            available_seconds: gross_seconds.saturating_sub(spent_seconds),
        })
    }
}
