//! GET /leads/:id/insight

use axum::{
    extract::{Path, State},
    Json,
};
use leadflow_common::db::insights;
use leadflow_common::models::Insight;

use crate::{
    error::{ApiError, ApiResult},
    AppState,
};

/// Latest insight for a lead; 404 until triage has processed it
pub async fn get_insight(
    State(state): State<AppState>,
    Path(lead_id): Path<String>,
) -> ApiResult<Json<Insight>> {
    insights::latest_for_lead(&state.db, &lead_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No insight for lead {}", lead_id)))
}
