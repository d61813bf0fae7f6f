//! Hackatime stats client, the external source of truth for a user's
//! cumulative coding time. The reported total is monotone
//! non-decreasing by contract; anything else is handled upstream of
//! here as an anomaly, not an error.
use std::time::Duration;

use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::warn;

use crate::{
    models::StatsResponse,
    utils::format_seconds,
};

const USER_AGENT: &str = "canvas/1.0";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("malformed stats payload")]
    Malformed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TimeTotals {
    pub total_seconds: u64,
    pub human_readable_total: String,
}

pub trait TimeSource {
    /// Cumulative reported total for a user. Must fail rather than
    /// fabricate a value when the upstream is unreachable or returns
    /// something unparseable.
    async fn total_seconds_reported(&self, user_id: &str) -> Result<TimeTotals, UpstreamError>;
}

#[derive(Clone)]
pub struct Hackatime {
    client: Client,
    base_url: String,
}

impl Hackatime {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl TimeSource for Hackatime {
    async fn total_seconds_reported(&self, user_id: &str) -> Result<TimeTotals, UpstreamError> {
        let url = format!("{}/api/v1/users/{user_id}/stats", self.base_url);

        let response = self.client.get(&url).send().await?;

        let status = response.status();
        if !status.is_success() {
            warn!("Hackatime returned {status} for {url}");
            return Err(UpstreamError::Status(status));
        }

        let stats: StatsResponse = response.json().await.map_err(|e| {
            warn!("Unparseable Hackatime payload for {user_id}: {e}");
            UpstreamError::Malformed
        })?;

        TimeTotals::try_from(stats)
    }
}

impl TryFrom<StatsResponse> for TimeTotals {
    type Error = UpstreamError;

    fn try_from(response: StatsResponse) -> Result<Self, UpstreamError> {
        let stats = response.data.ok_or(UpstreamError::Malformed)?;
        let total = stats.total_seconds.ok_or(UpstreamError::Malformed)?;

        if !total.is_finite() || total < 0.0 {
            return Err(UpstreamError::Malformed);
        }

        // Hackatime reports fractional seconds; budgets are whole ones.
        let total_seconds = total.floor() as u64;

        Ok(Self {
            total_seconds,
            human_readable_total: stats
                .human_readable_total
                .unwrap_or_else(|| format_seconds(total_seconds)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{TimeTotals, UpstreamError};
    use crate::models::{Stats, StatsResponse};

    fn response(total_seconds: Option<f64>, human: Option<&str>) -> StatsResponse {
        StatsResponse {
            data: Some(Stats {
                total_seconds,
                human_readable_total: human.map(str::to_string),
            }),
        }
    }

    #[test]
    fn test_passthrough() {
        let totals = TimeTotals::try_from(response(Some(500.9), Some("0h 8m 20s"))).unwrap();

        assert_eq!(totals.total_seconds, 500);
        assert_eq!(totals.human_readable_total, "0h 8m 20s");
    }

    #[test]
    fn test_human_readable_fallback() {
        let totals = TimeTotals::try_from(response(Some(3930.0), None)).unwrap();

        assert_eq!(totals.human_readable_total, "1h 5m 30s");
    }

    #[test]
    fn test_missing_data_is_malformed() {
        let result = TimeTotals::try_from(StatsResponse { data: None });

        assert!(matches!(result, Err(UpstreamError::Malformed)));
    }

    #[test]
    fn test_missing_total_is_malformed() {
        let result = TimeTotals::try_from(response(None, Some("0h 0m 0s")));

        assert!(matches!(result, Err(UpstreamError::Malformed)));
    }

    #[test]
    fn test_negative_total_is_malformed() {
        let result = TimeTotals::try_from(response(Some(-1.0), None));

        assert!(matches!(result, Err(UpstreamError::Malformed)));
    }
}
