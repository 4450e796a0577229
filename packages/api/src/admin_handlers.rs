// ABOUTME: Operational endpoints for the scheduler and service health
// ABOUTME: Status plus manual triggers for the reminder and expiry cycles

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json as ResponseJson};
use tracing::info;

use super::response::ApiResponse;
use super::state::AppState;

pub async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        ResponseJson(ApiResponse::success(serde_json::json!({"status": "ok"}))),
    )
}

pub async fn scheduler_status(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.scheduler.status().await;
    (StatusCode::OK, ResponseJson(ApiResponse::success(status)))
}

/// Kick a reminder cycle outside its schedule.
pub async fn run_reminders(State(state): State<AppState>) -> impl IntoResponse {
    info!("Manual reminder cycle triggered");
    let outcome = state.scheduler.run_reminder_cycle().await;
    (StatusCode::OK, ResponseJson(ApiResponse::success(outcome)))
}

/// Kick an expiry cycle outside its schedule.
pub async fn run_expiry(State(state): State<AppState>) -> impl IntoResponse {
    info!("Manual expiry cycle triggered");
    let outcome = state.scheduler.run_expiry_cycle().await;
    (StatusCode::OK, ResponseJson(ApiResponse::success(outcome)))
}
