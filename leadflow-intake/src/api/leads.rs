//! Lead API handlers
//!
//! POST /leads, GET /leads/:id

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use leadflow_common::models::{Lead, LeadRequest};

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// Header carrying the client's idempotency token
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// POST /leads
///
/// 201 with the new lead on first use of a key, 200 with the byte-identical
/// stored body on replay, 409 if the key was used with a different body.
pub async fn create_lead(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<LeadRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| {
            ApiError::BadRequest(format!("{} header is required", IDEMPOTENCY_KEY_HEADER))
        })?;

    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;

    let creation = state.service.create_lead(&request, key).await?;

    let status = if creation.newly_created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    // Stored body is sent as-is so replays are byte-identical
    Ok((
        status,
        [(header::CONTENT_TYPE, "application/json")],
        creation.response_json,
    )
        .into_response())
}

/// GET /leads/:id
pub async fn get_lead(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
) -> ApiResult<Json<Lead>> {
    state
        .service
        .get_lead(&lead_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Lead not found: {}", lead_id)))
}

/// Build lead routes
pub fn lead_routes() -> Router<AppState> {
    Router::new()
        .route("/leads", post(create_lead))
        .route("/leads/:id", get(get_lead))
}
