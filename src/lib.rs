//! Documentation of a collaborative pixel canvas backend.
//!
//! Users spend accrued coding time (reported by Hackatime) to place
//! colored pixels on a shared grid. Every placement is permanent: a
//! cell, once claimed, belongs to its placer.
//!
//!
//!
//! # General Infrastructure
//! - Frontend talks to this backend over three routes: `/coding-time`,
//!   `GET /pixels` and `POST /pixels`
//! - Sessions are issued by the identity layer in front of us; by the
//!   time a request lands here it carries a stable user id header
//! - Committed placements are broadcast on a Redis pub/sub channel so
//!   connected viewers repaint without polling
//! - A viewer that misses events simply re-hydrates from `GET /pixels`
//!
//!
//!
//! # Budget Accounting
//!
//! **Goal**: a user's remaining budget must never drift from reality,
//! no matter how many requests race.
//!
//! - There is no stored "remaining budget" counter anywhere
//! - Gross budget = signup grant + coding time accrued since the user's
//!   first reconciliation
//! - Spent budget = sum over the pixels the user actually committed
//! - Available = gross - spent, clamped at zero
//! - A commit and a deduction are the same atomic fact: if the pixel
//!   write lost the race, nothing was spent
//!
//!
//!
//! # Notes
//!
//! ## Redis
//! All durable state lives in Redis. The whole canvas is one hash, so a
//! full hydration is a single `HGETALL`, and cell ownership is decided
//! by `HSETNX` inside a server-side script. Running the budget
//! re-validation and the claim in one script means concurrent
//! placements serialize at the store, not in this process. Several
//! backend replicas can share one Redis without extra locking.
//!
//! ## Hackatime
//! Hackatime totals only ever grow. If the upstream is down or returns
//! something unparseable we deny placements instead of guessing: a
//! fabricated budget is worse than a temporary 502.
//!
//!
//!
//! # Setup
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! `````
//!
//! Run against a local Redis.
//! ```sh
//! REDIS_URL=redis://127.0.0.1:6379 cargo run
//! ```
#![allow(async_fn_in_trait)]

use std::time::Duration;

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod admission;
pub mod config;
pub mod database;
pub mod error;
pub mod hackatime;
pub mod ledger;
pub mod models;
pub mod notifier;
pub mod routes;
pub mod state;
pub mod store;
pub mod user;
pub mod utils;

use routes::{coding_time_handler, pixels_handler, place_pixel_handler};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Initializing state...");
    let state = AppState::new().await;

    info!("Starting server...");

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let app = Router::new()
        .route("/pixels", get(pixels_handler).post(place_pixel_handler))
        .route("/coding-time", get(coding_time_handler))
        .layer(cors)
        .with_state(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await.unwrap();
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    println!("Server shutting down...");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
