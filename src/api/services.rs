use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use http_body_util::BodyExt;
use uuid::Uuid;

use super::{
    models::{
        BalanceResponse, HealthResponse, JobAcceptedResponse, LedgerItem, LedgerPageResponse,
        TopupRequest, TopupResponse,
    },
    state::AppState,
    utils::{idempotency_key, require_json, user_from_headers, validate_body_size},
};
use crate::api::error::ApiError;
use crate::jobs::{CreateJobRequest, JobStatus, JobView};
use crate::ledger::{LedgerStore, Page, User};

/// Room for the JSON envelope around a maximum-size document
const ENVELOPE_ALLOWANCE: usize = 64 * 1024;

/// Largest accepted top-up body
const MAX_TOPUP_BYTES: usize = 4 * 1024;

/// Job submission endpoint (POST /jobs)
///
/// ## Flow:
/// 1. Validate headers (Content-Type, X-Lingua-User, optional idempotency key)
/// 2. Read the body (gzip handled by middleware) and enforce size limits
/// 3. Hand the request to the orchestrator, which validates, prices,
///    reserves credits and starts the job
/// 4. Return 202 Accepted with the job id and status
///
/// ## Idempotency:
/// If X-Lingua-Idempotency-Key (or `idempotency_key` in the body) matches
/// an earlier job of the same user, that job is returned and nothing is
/// charged again.
pub async fn create_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;
    let user = user_from_headers(&headers)?;

    let max_document_bytes = state.config.server.max_document_bytes;
    let body_bytes = read_body(body, max_document_bytes + ENVELOPE_ALLOWANCE).await?;

    let mut request: CreateJobRequest = serde_json::from_slice(&body_bytes)?;
    if request.document.len() > max_document_bytes {
        return Err(ApiError::PayloadTooLarge(request.document.len()));
    }
    if let Some(key) = idempotency_key(&headers) {
        request.idempotency_key = Some(key);
    }

    let job = state.orchestrator.create_job(&user, request).await?;

    let response = JobAcceptedResponse {
        job_id: job.id.to_string(),
        status: job.status,
    };
    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Reads request body and validates size
async fn read_body(body: axum::body::Body, max_size: usize) -> Result<Vec<u8>, ApiError> {
    let data = body
        .collect()
        .await
        .map_err(|err| ApiError::Internal(err.to_string()))?
        .to_bytes()
        .to_vec();

    validate_body_size(&data, max_size)?;

    Ok(data)
}

fn parse_job_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("job {raw}")))
}

/// Job status endpoint (GET /jobs/{job_id})
pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_from_headers(&headers)?;
    let job_id = parse_job_id(&job_id)?;

    let job = state.orchestrator.get_job_for_user(&user, job_id).await?;
    Ok((StatusCode::OK, Json(JobView::from(&job))))
}

/// Cancel endpoint (POST /jobs/{job_id}/cancel)
///
/// Waits for in-flight chunks to be recorded before answering.
pub async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_from_headers(&headers)?;
    let job_id = parse_job_id(&job_id)?;

    // Ownership check before touching the job
    state.orchestrator.get_job_for_user(&user, job_id).await?;
    let job = state.orchestrator.cancel(job_id).await?;
    Ok((StatusCode::OK, Json(JobView::from(&job))))
}

/// Translated output (GET /jobs/{job_id}/output)
pub async fn download_output(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_from_headers(&headers)?;
    let job_id = parse_job_id(&job_id)?;

    let job = state.orchestrator.get_job_for_user(&user, job_id).await?;
    if job.status != JobStatus::Completed {
        return Err(ApiError::Conflict(format!(
            "job {job_id} is {}, output is available once COMPLETED",
            job.status
        )));
    }

    let (job, bytes) = state.orchestrator.download_output(&user, job_id).await?;
    let disposition = format!("attachment; filename=\"{}.txt\"", job.id);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}

/// Balance endpoint (GET /credits/balance)
pub async fn get_balance(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let user = User::new(user_from_headers(&headers)?);
    let balance = state.ledger.balance(&user.id).await?;

    Ok(Json(BalanceResponse {
        user: user.id,
        plan: user.plan,
        balance,
    }))
}

/// Ledger history (GET /credits/ledger?offset&limit), newest first
pub async fn get_ledger(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(page): Query<Page>,
) -> Result<impl IntoResponse, ApiError> {
    let user = user_from_headers(&headers)?;
    let entries = state.ledger.history(&user, page).await?;

    Ok(Json(LedgerPageResponse {
        items: entries.into_iter().map(LedgerItem::from).collect(),
        offset: page.offset,
        limit: page.effective_limit(),
    }))
}

/// Credit grant hook (POST /credits/topup)
///
/// Payment capture happens upstream; this only records the TOPUP entry.
pub async fn topup(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;
    let user = user_from_headers(&headers)?;
    let body_bytes = read_body(body, MAX_TOPUP_BYTES).await?;
    let request: TopupRequest = serde_json::from_slice(&body_bytes)?;

    // Ledger idempotency keys are global; scope the client's key to the user
    let key = idempotency_key(&headers).map(|key| format!("topup:{}:{}", user, key));
    let entry_id = state
        .ledger
        .topup(&user, request.amount, request.note, key)
        .await?;
    let balance = state.ledger.balance(&user).await?;

    Ok(Json(TopupResponse {
        entry_id: entry_id.to_string(),
        balance,
    }))
}

/// Health check endpoint (GET /health)
///
/// Reports component health, jobs with chunks in flight and counters.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    use std::collections::HashMap;

    let mut components = HashMap::new();
    components.insert("api".to_string(), "healthy".to_string());
    components.insert("fjall".to_string(), "healthy".to_string());
    components.insert("storage".to_string(), "healthy".to_string());
    components.insert("workers".to_string(), "healthy".to_string());

    let response = HealthResponse {
        status: "healthy".to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.orchestrator.active_jobs(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
