//! # Redis
//!
//! Durable store for the canvas.
//!
//! ## Requirements
//!
//! - At most one writer per cell, enforced by the storage layer itself
//!   so that multiple backend replicas stay correct
//! - Full-grid hydration in one round trip
//! - Spend derived from committed placements, never a stored counter
//!
//! ## Implementation
//!
//! - Redis hash `pixels`: 1 big key, field `"x,y"` -> JSON placement
//! - Redis hash `ledger:{user_id}`: baseline + last known upstream
//!   reading, baseline written with `HSETNX` so it is set exactly once
//! - Commits run as one server-side script: recompute the user's spend
//!   from the hash, re-validate the budget, then `HSETNX` the cell
//! - A 100x100 grid is at most 10,000 fields, small enough that the
//!   script's full scan stays well under a millisecond
use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use redis::{
    AsyncCommands, Client, Script,
    aio::{ConnectionManager, ConnectionManagerConfig},
};

use crate::{
    models::{LedgerEntry, Placement},
    store::{CommitOutcome, LedgerStore, PlacementStore, StorageError},
};

pub const PIXELS_KEY: &str = "pixels";

const LEDGER_BASELINE: &str = "baseline_reported_seconds";
const LEDGER_LAST_KNOWN: &str = "last_known_reported_seconds";
const LEDGER_UPDATED_AT: &str = "last_updated_at";

/// Atomic admission commit.
///
/// KEYS[1] pixels hash; ARGV: field, placement JSON, user id, cost,
/// gross budget, overwrite flag. Spend is recomputed from committed
/// placements inside the script, so the sufficiency check and the claim
/// are one serialized step at the store.
const COMMIT_SCRIPT: &str = r#"
local spent = 0
local all = redis.call('HGETALL', KEYS[1])
for i = 2, #all, 2 do
    local record = cjson.decode(all[i])
    if record.user_id == ARGV[3] then
        spent = spent + record.time_deducted_seconds
    end
end
if spent + tonumber(ARGV[4]) > tonumber(ARGV[5]) then
    return 'insufficient'
end
if ARGV[6] == '1' then
    redis.call('HSET', KEYS[1], ARGV[1], ARGV[2])
else
    if redis.call('HSETNX', KEYS[1], ARGV[1], ARGV[2]) == 0 then
        return 'occupied'
    end
end
return 'committed'
"#;

pub async fn init_redis(redis_url: &str) -> ConnectionManager {
    let config = ConnectionManagerConfig::new()
        .set_number_of_retries(1)
        .set_connection_timeout(Duration::from_millis(100));

    let client = Client::open(redis_url).unwrap();
    let connection_manager = client
        .get_connection_manager_with_config(config)
        .await
        .unwrap();

    connection_manager
}

#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    commit: Arc<Script>,
}

impl RedisStore {
    pub fn new(connection: ConnectionManager) -> Self {
        Self {
            connection,
            commit: Arc::new(Script::new(COMMIT_SCRIPT)),
        }
    }

    fn field(x: u32, y: u32) -> String {
        format!("{x},{y}")
    }

    fn ledger_key(user_id: &str) -> String {
        format!("ledger:{user_id}")
    }
}

impl PlacementStore for RedisStore {
    async fn try_commit(
        &self,
        placement: &Placement,
        gross_budget_seconds: u64,
        overwrite_allowed: bool,
    ) -> Result<CommitOutcome, StorageError> {
        let mut connection = self.connection.clone();
        let payload =
            serde_json::to_string(placement).map_err(|e| StorageError::Corrupt(e.to_string()))?;

        let verdict: String = self
            .commit
            .key(PIXELS_KEY)
            .arg(Self::field(placement.x, placement.y))
            .arg(payload)
            .arg(&placement.user_id)
            .arg(placement.time_deducted_seconds)
            .arg(gross_budget_seconds)
            .arg(if overwrite_allowed { "1" } else { "0" })
            .invoke_async(&mut connection)
            .await?;

        #[cfg(feature = "verbose")]
        tracing::info!(
            "Commit verdict for ({}, {}): {verdict}",
            placement.x,
            placement.y
        );

        Ok(match verdict.as_str() {
            "occupied" => CommitOutcome::AlreadyOccupied,
            "insufficient" => CommitOutcome::InsufficientBudget,
            _ => CommitOutcome::Committed,
        })
    }

    async fn get(&self, x: u32, y: u32) -> Result<Option<Placement>, StorageError> {
        let mut connection = self.connection.clone();

        let raw: Option<String> = connection.hget(PIXELS_KEY, Self::field(x, y)).await?;

        raw.map(|value| serde_json::from_str(&value))
            .transpose()
            .map_err(|e| StorageError::Corrupt(e.to_string()))
    }

    async fn list_all(&self) -> Result<Vec<Placement>, StorageError> {
        let mut connection = self.connection.clone();

        let raw: HashMap<String, String> = connection.hgetall(PIXELS_KEY).await?;

        let mut placements = Vec::with_capacity(raw.len());
        for value in raw.into_values() {
            placements
                .push(serde_json::from_str(&value).map_err(|e| StorageError::Corrupt(e.to_string()))?);
        }

        Ok(placements)
    }

    async fn spent_seconds(&self, user_id: &str) -> Result<u64, StorageError> {
        Ok(self
            .list_all()
            .await?
            .iter()
            .filter(|p| p.user_id == user_id)
            .map(|p| p.time_deducted_seconds)
            .sum())
    }
}

impl LedgerStore for RedisStore {
    async fn fetch(&self, user_id: &str) -> Result<Option<LedgerEntry>, StorageError> {
        let mut connection = self.connection.clone();

        let raw: HashMap<String, String> = connection.hgetall(Self::ledger_key(user_id)).await?;
        if raw.is_empty() {
            return Ok(None);
        }

        Ok(Some(parse_entry(user_id, &raw)?))
    }

    async fn record_reading(
        &self,
        user_id: &str,
        reported_total_seconds: u64,
        now: DateTime<Utc>,
    ) -> Result<LedgerEntry, StorageError> {
        let mut connection = self.connection.clone();
        let key = Self::ledger_key(user_id);

        // HSETNX: only the first reading ever lands as the baseline.
        let _: bool = connection
            .hset_nx(&key, LEDGER_BASELINE, reported_total_seconds)
            .await?;
        let _: () = connection
            .hset_multiple(
                &key,
                &[
                    (LEDGER_LAST_KNOWN, reported_total_seconds.to_string()),
                    (LEDGER_UPDATED_AT, now.to_rfc3339()),
                ],
            )
            .await?;

        self.fetch(user_id).await?.ok_or_else(|| {
            StorageError::Corrupt(format!("ledger entry missing after write for {user_id}"))
        })
    }
}

fn parse_entry(user_id: &str, raw: &HashMap<String, String>) -> Result<LedgerEntry, StorageError> {
    let number = |field: &str| -> Result<u64, StorageError> {
        raw.get(field)
            .and_then(|value| value.parse().ok())
            .ok_or_else(|| StorageError::Corrupt(format!("ledger field {field} for {user_id}")))
    };

    let last_updated_at = raw
        .get(LEDGER_UPDATED_AT)
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|value| value.with_timezone(&Utc))
        .ok_or_else(|| {
            StorageError::Corrupt(format!("ledger field {LEDGER_UPDATED_AT} for {user_id}"))
        })?;

    Ok(LedgerEntry {
        baseline_reported_seconds: number(LEDGER_BASELINE)?,
        last_known_reported_seconds: number(LEDGER_LAST_KNOWN)?,
        last_updated_at,
    })
}
