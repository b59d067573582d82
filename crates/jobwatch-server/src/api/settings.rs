//! Digest send time. The scheduler picks up a change on its next poll and
//! moves the cleanup and reset triggers with it.

use axum::{extract::State, Extension, Json};
use chrono::NaiveTime;
use jobwatch_core::{digest_trigger_times, parse_time_of_day};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct DigestTimeRequest {
    pub digest_time: String,
}

#[derive(Debug, Serialize)]
pub(super) struct DigestTimeItem {
    digest_time: String,
    cleanup_time: String,
    reset_time: String,
}

fn hhmm(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

impl From<NaiveTime> for DigestTimeItem {
    fn from(time: NaiveTime) -> Self {
        let times = digest_trigger_times(time);
        Self {
            digest_time: hhmm(times.digest),
            cleanup_time: hhmm(times.cleanup),
            reset_time: hhmm(times.reset),
        }
    }
}

/// GET /api/v1/settings/digest-time
pub(super) async fn get_digest_time(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<DigestTimeItem>>, ApiError> {
    let time = jobwatch_db::get_digest_time(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: time.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PUT /api/v1/settings/digest-time: body `{"digest_time": "HH:MM"}`, UTC.
pub(super) async fn put_digest_time(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<DigestTimeRequest>,
) -> Result<Json<ApiResponse<DigestTimeItem>>, ApiError> {
    let time = parse_time_of_day(&body.digest_time)
        .map_err(|e| ApiError::new(&req_id.0, "validation_error", e.to_string()))?;

    jobwatch_db::set_digest_time(&state.pool, time)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(digest_time = %hhmm(time), "api: digest time updated");
    Ok(Json(ApiResponse {
        data: time.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}
