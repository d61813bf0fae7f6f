//! Broadcast channel for committed placements. Delivery is best-effort:
//! the placement is already durable by the time we publish, and a
//! viewer that misses an event re-hydrates from `GET /pixels`.
use redis::{AsyncCommands, aio::ConnectionManager};
use tracing::warn;

use crate::models::PlacementEvent;

/// Channel viewers subscribe to, named after the placement table.
pub const PLACEMENTS_CHANNEL: &str = "pixel_placements";

pub trait Notifier {
    /// Fire-and-forget. Failure must never roll back a committed
    /// placement, so this logs instead of returning an error.
    async fn publish(&self, event: &PlacementEvent);
}

#[derive(Clone)]
pub struct RedisNotifier {
    connection: ConnectionManager,
}

impl RedisNotifier {
    pub fn new(connection: ConnectionManager) -> Self {
        Self { connection }
    }
}

impl Notifier for RedisNotifier {
    async fn publish(&self, event: &PlacementEvent) {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Failed to encode placement event: {e}");
                return;
            }
        };

        let mut connection = self.connection.clone();
        if let Err(e) = connection
            .publish::<_, _, ()>(PLACEMENTS_CHANNEL, payload)
            .await
        {
            warn!("Failed to publish placement event: {e}");
        }
    }
}
