use std::sync::Arc;

use axum::{Json, extract::State};

use crate::{
    error::AppError,
    models::{CodingTimeResponse, Pixel, PlacePixelRequest, PlaceResponse},
    state::AppState,
    store::PlacementStore,
    user::AuthedUser,
};

/// Reconcile the caller's budget against a fresh Hackatime reading.
pub async fn coding_time_handler(
    State(state): State<Arc<AppState>>,
    AuthedUser(user_id): AuthedUser,
) -> Result<Json<CodingTimeResponse>, AppError> {
    let (totals, budget) = state.admission.budget_status(&user_id).await?;

    Ok(Json(CodingTimeResponse {
        human_readable_total: totals.human_readable_total,
        total_seconds: totals.total_seconds,
        available_seconds: budget.available_seconds,
    }))
}

/// Full grid hydration for viewers.
pub async fn pixels_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Pixel>>, AppError> {
    let placements = state.store.list_all().await?;

    Ok(Json(placements.iter().map(Pixel::from).collect()))
}

pub async fn place_pixel_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<PlacePixelRequest>,
) -> Result<Json<PlaceResponse>, AppError> {
    state.admission.place(&request).await?;

    Ok(Json(PlaceResponse { success: true }))
}
