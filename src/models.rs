use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One committed pixel. Never mutated or deleted once written; in
/// overwrite deployments a cell's record is replaced wholesale by the
/// next winner.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub user_id: String,
    pub time_deducted_seconds: u64,
    pub placed_at: DateTime<Utc>,
}

/// Per-user ledger row. `baseline_reported_seconds` is the upstream
/// total observed at the user's first reconciliation and never changes
/// afterwards.
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerEntry {
    pub baseline_reported_seconds: u64,
    pub last_known_reported_seconds: u64,
    pub last_updated_at: DateTime<Utc>,
}

/// Budget derived at reconciliation time. `available_seconds` is
/// clamped at zero for callers.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BudgetSnapshot {
    pub gross_seconds: u64,
    pub spent_seconds: u64,
    pub available_seconds: u64,
}

/// Broadcast payload for a committed placement.
#[derive(Clone, Debug, Serialize)]
pub struct PlacementEvent {
    pub x: u32,
    pub y: u32,
    pub color: String,
    pub user_id: String,
    pub placed_at: DateTime<Utc>,
}

impl From<&Placement> for PlacementEvent {
    fn from(placement: &Placement) -> Self {
        Self {
            x: placement.x,
            y: placement.y,
            color: placement.color.clone(),
            user_id: placement.user_id.clone(),
            placed_at: placement.placed_at,
        }
    }
}

/// `GET /pixels` item, the shape viewers hydrate from.
#[derive(Debug, Serialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
    pub color: String,
}

impl From<&Placement> for Pixel {
    fn from(placement: &Placement) -> Self {
        Self {
            x: placement.x,
            y: placement.y,
            color: placement.color.clone(),
        }
    }
}

/// `POST /pixels` body. Fields are optional so that presence is checked
/// explicitly and missing fields surface as a 400 instead of a decoder
/// rejection.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PlacePixelRequest {
    pub x: Option<u32>,
    pub y: Option<u32>,
    pub color: Option<String>,
    pub user_id: Option<String>,
    pub time_deducted_seconds: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct PlaceResponse {
    pub success: bool,
}

#[derive(Debug, Serialize)]
pub struct CodingTimeResponse {
    pub human_readable_total: String,
    pub total_seconds: u64,
    pub available_seconds: u64,
}

/// Hackatime stats envelope. Everything is optional on the wire; the
/// client decides what counts as malformed.
#[derive(Debug, Deserialize)]
pub struct StatsResponse {
    pub data: Option<Stats>,
}

#[derive(Debug, Deserialize)]
pub struct Stats {
    pub total_seconds: Option<f64>,
    pub human_readable_total: Option<String>,
}
