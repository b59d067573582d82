use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use jobwatch_db::RecipientRow;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct AddRecipientRequest {
    pub email: String,
}

/// GET /api/v1/recipients
pub(super) async fn list_recipients(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
) -> Result<Json<ApiResponse<Vec<RecipientRow>>>, ApiError> {
    let rows = jobwatch_db::list_recipients(&state.pool)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows,
        meta: ResponseMeta::new(req_id.0),
    }))
}

/// POST /api/v1/recipients: 409 when the address is already present.
pub(super) async fn add_recipient(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Json(body): Json<AddRecipientRequest>,
) -> Result<(StatusCode, Json<ApiResponse<RecipientRow>>), ApiError> {
    let email = jobwatch_notify::parse_recipient(&body.email).map_err(|_| {
        ApiError::new(
            &req_id.0,
            "validation_error",
            format!("'{}' is not an email address", body.email.trim()),
        )
    })?;

    let row = jobwatch_db::add_recipient(&state.pool, &email)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse {
            data: row,
            meta: ResponseMeta::new(req_id.0),
        }),
    ))
}

/// DELETE /api/v1/recipients/:id
pub(super) async fn delete_recipient(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Path(id): Path<i64>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    jobwatch_db::delete_recipient(&state.pool, id)
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: serde_json::json!({ "deleted": true }),
        meta: ResponseMeta::new(req_id.0),
    }))
}
