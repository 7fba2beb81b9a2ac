use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde_json::json;

use crate::state::ApiState;

/// Readiness probe: returns 200 if the database answers a trivial query,
/// 503 otherwise.
pub async fn ready(State(state): State<ApiState>) -> impl IntoResponse {
    let db_ok = state
        .db
        .with_conn(|conn| Ok(conn.query_row::<i64, _, _>("SELECT 1", [], |row| row.get(0))?))
        .await
        .is_ok();

    if db_ok {
        (
            StatusCode::OK,
            Json(json!({"status": "ok", "checks": {"db": "ok"}})),
        )
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"status": "error", "checks": {"db": "fail"}})),
        )
    }
}
