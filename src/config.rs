use std::{env, fmt::Display, str::FromStr};

use tracing::{info, warn};

/// Deployment configuration. The canvas constants are fixed per
/// deployment and authoritative over whatever the client displays.
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub hackatime_url: String,
    pub grid_size: u32,
    pub grant_seconds: u64,
    pub pixel_cost: u64,
    pub overwrite_allowed: bool,
}

impl Config {
    pub fn load() -> Self {
        Self {
            port: try_load("RUST_PORT", "1111"),
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379"),
            hackatime_url: try_load("HACKATIME_URL", "https://hackatime.hackclub.com"),
            grid_size: try_load("GRID_SIZE", "100"),
            grant_seconds: try_load("GRANT_SECONDS", "3600"),
            pixel_cost: try_load("PIXEL_COST", "300"),
            overwrite_allowed: try_load("OVERWRITE_ALLOWED", "false"),
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| {
            warn!("Invalid {key} value: {e}");
        })
        .expect("Environment misconfigured!")
}
