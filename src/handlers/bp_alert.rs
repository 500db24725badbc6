use axum::{
    extract::{rejection::JsonRejection, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use serde_json::Value;

use crate::errors::ServiceError;
use crate::metrics::BP_METRICS;
use crate::services::bp_alert::BpAlertRequest;
use crate::AppState;

/// Scores one reading and admits it into the rolling window.
async fn submit_reading(
    State(state): State<AppState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<impl IntoResponse, ServiceError> {
    let Json(body) = payload.map_err(|rejection| {
        BP_METRICS.record_invalid_request();
        ServiceError::BadRequest(rejection.body_text())
    })?;
    let request = BpAlertRequest::try_from(body).map_err(|err| {
        BP_METRICS.record_invalid_request();
        err
    })?;

    let evaluation = state.bp_alert.evaluate(request)?;
    Ok(Json(evaluation))
}

async fn detector_config(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bp_alert.config())
}

async fn window_snapshot(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.bp_alert.window())
}

pub fn bp_alert_routes() -> Router<AppState> {
    Router::new()
        .route("/bp_alert", post(submit_reading))
        .route("/bp_alert/config", get(detector_config))
        .route("/bp_alert/window", get(window_snapshot))
}
