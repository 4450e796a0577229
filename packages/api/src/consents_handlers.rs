// ABOUTME: HTTP request handlers for the consent lifecycle
// ABOUTME: Initiate, notice, submit, validate, withdraw and renewal endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use sammati_consents::{
    ArtifactStatus, BulkValidationItem, InitiateInput, InitiatedBy, RequestStatus, SubmitInput,
};

use super::response::{ApiError, ApiResponse};
use super::state::AppState;

#[derive(Deserialize)]
pub struct InitiateRequest {
    pub data_fiduciary_id: String,
    pub user_id: String,
    pub purposes: Vec<String>,
    /// Request TTL in minutes.
    pub duration: Option<i64>,
    pub language: Option<String>,
    pub redirect_url: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct InitiateResponse {
    pub cms_request_id: String,
    pub notice_url: String,
    pub status: RequestStatus,
    pub expires_at: DateTime<Utc>,
}

/// Open a consent request on behalf of a fiduciary.
pub async fn initiate(
    State(state): State<AppState>,
    Json(request): Json<InitiateRequest>,
) -> impl IntoResponse {
    info!(
        "Initiating consent request for fiduciary {} ({} purposes)",
        request.data_fiduciary_id,
        request.purposes.len()
    );

    let result = state
        .engine
        .initiate(InitiateInput {
            fiduciary_id: request.data_fiduciary_id,
            external_user_id: request.user_id,
            purpose_ids: request.purposes,
            ttl_minutes: request.duration,
            language: request.language,
            redirect_url: request.redirect_url,
            metadata: request.metadata,
        })
        .await;

    match result {
        Ok(initiated) => (
            StatusCode::CREATED,
            ResponseJson(ApiResponse::success(InitiateResponse {
                cms_request_id: initiated.request_id,
                notice_url: initiated.notice_url,
                status: initiated.status,
                expires_at: initiated.expires_at,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to initiate consent request: {}", e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct NoticeParams {
    pub language: Option<String>,
}

/// Render the notice for a request, marking it viewed on first read.
pub async fn get_notice(
    State(state): State<AppState>,
    Path(cms_request_id): Path<String>,
    Query(params): Query<NoticeParams>,
) -> impl IntoResponse {
    info!("Fetching notice for request {}", cms_request_id);

    match state.engine.notice(&cms_request_id, params.language).await {
        Ok(notice) => (StatusCode::OK, ResponseJson(ApiResponse::success(notice))).into_response(),
        Err(e) => {
            error!("Failed to assemble notice for {}: {}", cms_request_id, e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct SubmitRequest {
    pub cms_request_id: String,
    pub selected_purposes: Vec<String>,
    pub agree: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

/// Submit a consent decision and mint the artifact.
pub async fn submit(
    State(state): State<AppState>,
    Json(request): Json<SubmitRequest>,
) -> impl IntoResponse {
    info!("Submitting consent request {}", request.cms_request_id);

    let result = state
        .engine
        .submit(SubmitInput {
            request_id: request.cms_request_id,
            selected_purpose_ids: request.selected_purposes,
            agree: request.agree,
            email: request.email,
            phone: request.phone,
            metadata: request.metadata,
        })
        .await;

    match result {
        Ok(artifact) => {
            info!("Created consent artifact {}", artifact.artifact_id);
            (
                StatusCode::CREATED,
                ResponseJson(ApiResponse::success(artifact)),
            )
                .into_response()
        }
        Err(e) => {
            error!("Failed to submit consent: {}", e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ValidateParams {
    pub artifact_id: String,
    pub data_fiduciary_id: String,
    pub purpose_id: Option<String>,
}

/// Check whether an artifact currently authorizes processing.
pub async fn validate(
    State(state): State<AppState>,
    Query(params): Query<ValidateParams>,
) -> impl IntoResponse {
    let result = state
        .engine
        .validate(
            &params.artifact_id,
            &params.data_fiduciary_id,
            params.purpose_id.as_deref(),
        )
        .await;

    match result {
        Ok(validation) => {
            (StatusCode::OK, ResponseJson(ApiResponse::success(validation))).into_response()
        }
        Err(e) => {
            error!("Failed to validate artifact {}: {}", params.artifact_id, e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ValidateBulkRequest {
    pub data_fiduciary_id: String,
    pub validations: Vec<BulkValidationItem>,
}

/// Validate up to 100 artifacts; one bad item never fails the batch.
pub async fn validate_bulk(
    State(state): State<AppState>,
    Json(request): Json<ValidateBulkRequest>,
) -> impl IntoResponse {
    info!(
        "Bulk validation of {} items for fiduciary {}",
        request.validations.len(),
        request.data_fiduciary_id
    );

    let result = state
        .engine
        .validate_bulk(&request.data_fiduciary_id, request.validations)
        .await;

    match result {
        Ok(outcomes) => {
            (StatusCode::OK, ResponseJson(ApiResponse::success(outcomes))).into_response()
        }
        Err(e) => {
            error!("Bulk validation rejected: {}", e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct WithdrawRequest {
    pub reason: Option<String>,
    pub notes: Option<String>,
}

#[derive(Serialize)]
pub struct WithdrawResponse {
    pub artifact_id: String,
    pub status: ArtifactStatus,
    pub withdrawn_at: DateTime<Utc>,
}

/// Withdraw an ACTIVE artifact.
pub async fn withdraw(
    State(state): State<AppState>,
    Path((fiduciary_id, artifact_id)): Path<(String, String)>,
    Json(request): Json<WithdrawRequest>,
) -> impl IntoResponse {
    info!("Withdrawing artifact {} for {}", artifact_id, fiduciary_id);

    let reason = match (request.reason, request.notes) {
        (Some(reason), Some(notes)) => Some(format!("{} ({})", reason, notes)),
        (Some(reason), None) => Some(reason),
        (None, Some(notes)) => Some(notes),
        (None, None) => None,
    };

    match state.engine.withdraw(&artifact_id, &fiduciary_id, reason).await {
        Ok(outcome) => (
            StatusCode::OK,
            ResponseJson(ApiResponse::success(WithdrawResponse {
                artifact_id: outcome.artifact_id,
                status: outcome.status,
                withdrawn_at: outcome.withdrawn_at,
            })),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to withdraw artifact {}: {}", artifact_id, e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct RenewRequest {
    pub artifact_id: String,
    pub data_fiduciary_id: String,
    pub requested_extension_days: i64,
    pub initiated_by: InitiatedBy,
}

/// Create a renewal-pending marker; confirmation is a separate call.
pub async fn renew(
    State(state): State<AppState>,
    Json(request): Json<RenewRequest>,
) -> impl IntoResponse {
    info!(
        "Initiating renewal for artifact {} ({} days)",
        request.artifact_id, request.requested_extension_days
    );

    let result = state
        .engine
        .initiate_renewal(
            &request.artifact_id,
            &request.data_fiduciary_id,
            request.requested_extension_days,
            request.initiated_by,
        )
        .await;

    match result {
        Ok(renewal) => (
            StatusCode::CREATED,
            ResponseJson(ApiResponse::success(renewal)),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to initiate renewal: {}", e);
            ApiError(e).into_response()
        }
    }
}

#[derive(Deserialize)]
pub struct ConfirmRenewalRequest {
    pub agree: bool,
}

/// Confirm a pending renewal with the principal's explicit agreement.
pub async fn confirm_renewal(
    State(state): State<AppState>,
    Path(renewal_id): Path<String>,
    Json(request): Json<ConfirmRenewalRequest>,
) -> impl IntoResponse {
    info!("Confirming renewal {}", renewal_id);

    match state.engine.confirm_renewal(&renewal_id, request.agree).await {
        Ok(outcome) => {
            (StatusCode::OK, ResponseJson(ApiResponse::success(outcome))).into_response()
        }
        Err(e) => {
            error!("Failed to confirm renewal {}: {}", renewal_id, e);
            ApiError(e).into_response()
        }
    }
}
