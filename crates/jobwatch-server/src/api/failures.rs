use axum::{
    extract::{Query, State},
    Extension, Json,
};
use jobwatch_db::FailureRow;
use serde::Deserialize;

use crate::middleware::RequestId;

use super::{map_db_error, normalize_limit, ApiError, ApiResponse, AppState, ResponseMeta};

#[derive(Debug, Deserialize)]
pub(super) struct FailuresQuery {
    pub limit: Option<i64>,
}

/// GET /api/v1/failures: most recent first.
pub(super) async fn list_failures(
    State(state): State<AppState>,
    Extension(req_id): Extension<RequestId>,
    Query(query): Query<FailuresQuery>,
) -> Result<Json<ApiResponse<Vec<FailureRow>>>, ApiError> {
    let rows = jobwatch_db::list_failures(&state.pool, normalize_limit(query.limit))
        .await
        .map_err(|e| map_db_error(req_id.0.clone(), &e))?;

    Ok(Json(ApiResponse {
        data: rows,
        meta: ResponseMeta::new(req_id.0),
    }))
}
