//! Admission control for pixel placement.
//!
//! Per request: validate, reconcile the budget against the upstream
//! reading, check sufficiency, then hand the claim to the store's
//! atomic commit. The store decides who won a race for a cell; a loser
//! spends nothing because spend is derived from committed placements
//! only.
use chrono::Utc;
use tracing::info;

use crate::{
    config::Config,
    error::AppError,
    hackatime::{TimeSource, TimeTotals},
    ledger::BudgetLedger,
    models::{BudgetSnapshot, PlacePixelRequest, Placement, PlacementEvent},
    notifier::Notifier,
    store::{CommitOutcome, LedgerStore, PlacementStore},
};

/// Canvas constants enforced server-side. Clients display the same
/// numbers, but this side is authoritative.
#[derive(Clone, Copy, Debug)]
pub struct CanvasRules {
    pub grid_size: u32,
    pub grant_seconds: u64,
    pub pixel_cost: u64,
    pub overwrite_allowed: bool,
}

impl From<&Config> for CanvasRules {
    fn from(config: &Config) -> Self {
        Self {
            grid_size: config.grid_size,
            grant_seconds: config.grant_seconds,
            pixel_cost: config.pixel_cost,
            overwrite_allowed: config.overwrite_allowed,
        }
    }
}

pub struct AdmissionController<T, S, N> {
    time: T,
    ledger: BudgetLedger<S>,
    store: S,
    notifier: N,
    rules: CanvasRules,
}

impl<T, S, N> AdmissionController<T, S, N>
where
    T: TimeSource,
    S: LedgerStore + PlacementStore + Clone,
    N: Notifier,
{
    pub fn new(time: T, store: S, notifier: N, rules: CanvasRules) -> Self {
        Self {
            time,
            ledger: BudgetLedger::new(store.clone(), rules.grant_seconds),
            store,
            notifier,
            rules,
        }
    }

    /// Current totals and budget for a user, reconciled against a fresh
    /// upstream reading. Fails closed when the upstream does.
    pub async fn budget_status(
        &self,
        user_id: &str,
    ) -> Result<(TimeTotals, BudgetSnapshot), AppError> {
        let totals = self.time.total_seconds_reported(user_id).await?;
        let budget = self.ledger.reconcile(user_id, totals.total_seconds).await?;

        Ok((totals, budget))
    }

    /// Admit and settle one placement request.
    pub async fn place(&self, request: &PlacePixelRequest) -> Result<Placement, AppError> {
        let (user_id, x, y, color) = self.validate(request)?;

        let (_, budget) = self.budget_status(&user_id).await?;
        if budget.available_seconds < self.rules.pixel_cost {
            return Err(AppError::InsufficientBudget);
        }

        let placement = Placement {
            x,
            y,
            color,
            user_id,
            time_deducted_seconds: self.rules.pixel_cost,
            placed_at: Utc::now(),
        };

        let outcome = self
            .store
            .try_commit(
                &placement,
                budget.gross_seconds,
                self.rules.overwrite_allowed,
            )
            .await?;

        match outcome {
            CommitOutcome::AlreadyOccupied => Err(AppError::Conflict),
            CommitOutcome::InsufficientBudget => Err(AppError::InsufficientBudget),
            CommitOutcome::Committed => {
                info!(
                    "Pixel placed at ({}, {}) by {}",
                    placement.x, placement.y, placement.user_id
                );

                self.notifier
                    .publish(&PlacementEvent::from(&placement))
                    .await;

                Ok(placement)
            }
        }
    }

    fn validate(
        &self,
        request: &PlacePixelRequest,
    ) -> Result<(String, u32, u32, String), AppError> {
        let x = request.x.ok_or_else(|| invalid("missing field x"))?;
        let y = request.y.ok_or_else(|| invalid("missing field y"))?;
        let color = request
            .color
            .clone()
            .ok_or_else(|| invalid("missing field color"))?;
        let user_id = request
            .user_id
            .clone()
            .ok_or_else(|| invalid("missing field user_id"))?;
        let claimed_cost = request
            .time_deducted_seconds
            .ok_or_else(|| invalid("missing field time_deducted_seconds"))?;

        if x >= self.rules.grid_size || y >= self.rules.grid_size {
            return Err(invalid("coordinate out of bounds"));
        }
        if color.trim().is_empty() {
            return Err(invalid("color must not be empty"));
        }
        if user_id.trim().is_empty() {
            return Err(invalid("user_id must not be empty"));
        }
        if claimed_cost != self.rules.pixel_cost {
            return Err(invalid("time_deducted_seconds does not match the server cost"));
        }

        Ok((user_id, x, y, color))
    }
}

fn invalid(message: &str) -> AppError {
    AppError::InvalidRequest(message.to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{AdmissionController, CanvasRules};
    use crate::{
        error::AppError,
        hackatime::{TimeSource, TimeTotals, UpstreamError},
        models::{PlacePixelRequest, PlacementEvent},
        notifier::Notifier,
        store::{PlacementStore, memory::MemoryStore},
        utils::format_seconds,
    };

    const RULES: CanvasRules = CanvasRules {
        grid_size: 100,
        grant_seconds: 3600,
        pixel_cost: 300,
        overwrite_allowed: false,
    };

    /// Time source reporting the same fixed total for every user.
    #[derive(Clone)]
    struct FixedTime(u64);

    impl TimeSource for FixedTime {
        async fn total_seconds_reported(&self, _user_id: &str) -> Result<TimeTotals, UpstreamError> {
            Ok(TimeTotals {
                total_seconds: self.0,
                human_readable_total: format_seconds(self.0),
            })
        }
    }

    /// Time source that is always down.
    #[derive(Clone)]
    struct DownTime;

    impl TimeSource for DownTime {
        async fn total_seconds_reported(&self, _user_id: &str) -> Result<TimeTotals, UpstreamError> {
            Err(UpstreamError::Malformed)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingNotifier {
        events: Arc<Mutex<Vec<PlacementEvent>>>,
    }

    impl Notifier for RecordingNotifier {
        async fn publish(&self, event: &PlacementEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    type TestController<T> = AdmissionController<T, MemoryStore, RecordingNotifier>;

    fn controller(rules: CanvasRules) -> (TestController<FixedTime>, MemoryStore, RecordingNotifier) {
        let store = MemoryStore::default();
        let notifier = RecordingNotifier::default();

        (
            AdmissionController::new(FixedTime(500), store.clone(), notifier.clone(), rules),
            store,
            notifier,
        )
    }

    fn request(x: u32, y: u32, user_id: &str) -> PlacePixelRequest {
        PlacePixelRequest {
            x: Some(x),
            y: Some(y),
            color: Some("#1d4ed8".to_string()),
            user_id: Some(user_id.to_string()),
            time_deducted_seconds: Some(RULES.pixel_cost),
        }
    }

    #[tokio::test]
    async fn test_commit_records_and_notifies() {
        let (controller, store, notifier) = controller(RULES);

        let placement = controller.place(&request(5, 5, "zach")).await.unwrap();

        assert_eq!(placement.time_deducted_seconds, RULES.pixel_cost);
        assert_eq!(store.get(5, 5).await.unwrap().unwrap(), placement);
        assert_eq!(notifier.events.lock().unwrap().len(), 1);

        let (totals, budget) = controller.budget_status("zach").await.unwrap();
        assert_eq!(totals.total_seconds, 500);
        assert_eq!(budget.available_seconds, 3300);
    }

    #[tokio::test]
    async fn test_missing_color_is_rejected_without_side_effects() {
        let (controller, store, notifier) = controller(RULES);

        let mut body = request(5, 5, "zach");
        body.color = None;

        let result = controller.place(&body).await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert!(store.list_all().await.unwrap().is_empty());
        assert!(notifier.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_out_of_bounds_is_rejected() {
        let (controller, _, _) = controller(RULES);

        let result = controller.place(&request(100, 0, "zach")).await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
    }

    #[tokio::test]
    async fn test_client_cost_mismatch_is_rejected() {
        let (controller, store, _) = controller(RULES);

        let mut body = request(5, 5, "zach");
        body.time_deducted_seconds = Some(1);

        let result = controller.place(&body).await;

        assert!(matches!(result, Err(AppError::InvalidRequest(_))));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_fails_closed() {
        let store = MemoryStore::default();
        let controller: TestController<DownTime> = AdmissionController::new(
            DownTime,
            store.clone(),
            RecordingNotifier::default(),
            RULES,
        );

        let result = controller.place(&request(5, 5, "zach")).await;

        assert!(matches!(result, Err(AppError::UpstreamUnavailable(_))));
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insufficient_budget_is_denied() {
        let rules = CanvasRules {
            grant_seconds: RULES.pixel_cost,
            ..RULES
        };
        let (controller, store, _) = controller(rules);

        controller.place(&request(1, 1, "zach")).await.unwrap();
        let result = controller.place(&request(2, 2, "zach")).await;

        assert!(matches!(result, Err(AppError::InsufficientBudget)));
        assert_eq!(store.list_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_conflict_loser_spends_nothing() {
        let (controller, store, _) = controller(RULES);

        controller.place(&request(5, 5, "winner")).await.unwrap();
        let result = controller.place(&request(5, 5, "loser")).await;

        assert!(matches!(result, Err(AppError::Conflict)));
        assert_eq!(store.get(5, 5).await.unwrap().unwrap().user_id, "winner");
        assert_eq!(store.spent_seconds("loser").await.unwrap(), 0);

        let (_, budget) = controller.budget_status("loser").await.unwrap();
        assert_eq!(budget.available_seconds, RULES.grant_seconds);
    }

    #[tokio::test]
    async fn test_overwrite_deployment_is_last_writer_wins() {
        let rules = CanvasRules {
            overwrite_allowed: true,
            ..RULES
        };
        let (controller, store, _) = controller(rules);

        controller.place(&request(5, 5, "first")).await.unwrap();
        controller.place(&request(5, 5, "second")).await.unwrap();

        let current = store.get(5, 5).await.unwrap().unwrap();
        assert_eq!(current.user_id, "second");
        // The displaced record is gone, so its spend is released.
        assert_eq!(store.spent_seconds("first").await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_same_cell_has_exactly_one_winner() {
        let (controller, store, notifier) = controller(RULES);
        let controller = Arc::new(controller);

        let mut handles = Vec::new();
        for i in 0..16 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                controller.place(&request(7, 7, &format!("user-{i}"))).await
            }));
        }

        let mut committed = 0;
        let mut conflicts = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => committed += 1,
                Err(AppError::Conflict) => conflicts += 1,
                Err(other) => panic!("unexpected outcome: {other}"),
            }
        }

        assert_eq!(committed, 1);
        assert_eq!(conflicts, 15);
        assert_eq!(store.list_all().await.unwrap().len(), 1);
        assert_eq!(notifier.events.lock().unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_spend_never_exceeds_gross() {
        // Budget covers two pixels; five concurrent requests for five
        // different cells race. The store-side re-validation caps the
        // user at two commits.
        let rules = CanvasRules {
            grant_seconds: 2 * RULES.pixel_cost,
            ..RULES
        };
        let (controller, store, _) = controller(rules);
        let controller = Arc::new(controller);

        let mut handles = Vec::new();
        for x in 0..5 {
            let controller = controller.clone();
            handles.push(tokio::spawn(async move {
                controller.place(&request(x, 0, "zach")).await
            }));
        }

        let mut committed = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                committed += 1;
            }
        }

        assert_eq!(committed, 2);
        assert_eq!(store.spent_seconds("zach").await.unwrap(), rules.grant_seconds);
    }
}
