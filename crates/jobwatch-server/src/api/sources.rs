//! Source configuration handlers, manual runs and live postings.
//!
//! Edits take effect on the scheduler's next configuration poll.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use jobwatch_core::Schedule;
use jobwatch_db::{LivePostingRow, NewSource, SourceRow};
use serde::{Deserialize, Serialize};

use crate::middleware::RequestId;
use crate::pipeline::SourceTarget;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct SourceRequest {
    pub title: String,
    pub url: String,
    /// `HH:MM`, UTC.
    pub schedule_time: String,
    pub schedule_days: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Serialize)]
pub(super) struct SourceItem {
    id: i64,
    title: String,
    url: String,
    schedule_time: String,
    schedule_days: Vec<String>,
    /// `None` when the stored schedule no longer parses.
    cron: Option<String>,
    keywords: Vec<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SourceRow> for SourceItem {
    fn from(row: SourceRow) -> Self {
        let cron = Schedule::parse(&row.schedule_time, &row.schedule_days)
            .ok()
            .map(|s| s.cron_expression());
        Self {
            id: row.id,
            title: row.title,
            url: row.url,
            schedule_time: row.schedule_time,
            schedule_days: row.schedule_days,
            cron,
            keywords: row.keywords,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub(super) struct RunAccepted {
    source_id: i64,
    status: &'static str,
}

fn validate(req_id: &str, body: SourceRequest) -> Result<NewSource, ApiError> {
    let title = body.title.trim().to_owned();
    if title.is_empty() || title.len() > 200 {
        return Err(ApiError::new(
            req_id,
            "validation_error",
            "title must be 1-200 characters",
        ));
    }

    let url = body.url.trim().to_owned();
    match url::Url::parse(&url) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
        _ => {
            return Err(ApiError::new(
                req_id,
                "validation_error",
                format!("url must be an absolute http(s) URL, got '{url}'"),
            ))
        }
    }

    let schedule = Schedule::parse(&body.schedule_time, &body.schedule_days)
        .map_err(|e| ApiError::new(req_id, "validation_error", e.to_string()))?;

    let keywords = body
        .keywords
        .iter()
        .map(|k| k.trim())
        .filter(|k| !k.is_empty())
        .map(ToOwned::to_owned)
        .collect();

    Ok(NewSource {
        title,
        url,
        schedule,
        keywords,
    })
}

fn source_not_found(req_id: &str, id: i64) -> ApiError {
    ApiError::new(req_id, "not_found", format!("source {id} not found"))
}

/// GET /api/v1/sources
pub(super) async fn list_sources(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<SourceItem>>>, ApiError> {
    let rows = jobwatch_db::list_sources(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows.into_iter().map(SourceItem::from).collect(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/sources
pub(super) async fn create_source(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<SourceRequest>,
) -> Result<(StatusCode, Json<ApiResponse<SourceItem>>), ApiError> {
    let source = validate(&req_id.0, body)?;
    let row = jobwatch_db::create_source(&state.pool, &source)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    tracing::info!(source_id = row.id, url = %row.url, "api: source created");
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: row.into(),
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/sources/:id
pub(super) async fn get_source(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<SourceItem>>, ApiError> {
    let row = jobwatch_db::get_source(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| source_not_found(&req_id.0, id))?;

    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// PUT /api/v1/sources/:id: replace every field, keywords included.
pub(super) async fn replace_source(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
    Json(body): Json<SourceRequest>,
) -> Result<Json<ApiResponse<SourceItem>>, ApiError> {
    let source = validate(&req_id.0, body)?;
    let row = jobwatch_db::update_source(&state.pool, id, &source)
        .await
        .map_err(|e| match e {
            jobwatch_db::DbError::NotFound => source_not_found(&req_id.0, id),
            other => map_db_error(req_id.0.clone(), &other),
        })?;

    tracing::info!(source_id = id, "api: source replaced");
    Ok(Json(ApiResponse {
        data: row.into(),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// DELETE /api/v1/sources/:id: live postings go with it; tombstones and
/// failure records are kept.
pub(super) async fn delete_source(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    jobwatch_db::delete_source(&state.pool, id)
        .await
        .map_err(|e| match e {
            jobwatch_db::DbError::NotFound => source_not_found(&req_id.0, id),
            other => map_db_error(req_id.0.clone(), &other),
        })?;

    tracing::info!(source_id = id, "api: source deleted");
    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/sources/:id/run: start a run now. Obeys the same
/// one-run-per-source rule as scheduled firings.
pub(super) async fn run_source(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<ApiResponse<RunAccepted>>), ApiError> {
    let row = jobwatch_db::get_source(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .ok_or_else(|| source_not_found(&req_id.0, id))?;

    if state.runner.dispatch(SourceTarget::from(&row)).is_none() {
        return Err(ApiError::new(
            &req_id.0,
            "conflict",
            format!("a run for source {id} is already in progress"),
        ));
    }

    tracing::info!(source_id = id, "api: manual run started");
    Ok((
        StatusCode::ACCEPTED,
        Json(ApiResponse {
            data: RunAccepted {
                source_id: id,
                status: "started",
            },
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// GET /api/v1/sources/:id/postings
pub(super) async fn list_source_postings(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<Vec<LivePostingRow>>>, ApiError> {
    if jobwatch_db::get_source(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?
        .is_none()
    {
        return Err(source_not_found(&req_id.0, id));
    }

    let rows = jobwatch_db::list_live_postings(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows,
        meta: ResponseMeta::new(req_id.0),
    }))
}
