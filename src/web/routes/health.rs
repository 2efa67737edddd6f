// Health check route handler

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;

use crate::web::models::{HealthResponse, SharedAppState, SERVICE_NAME};
use crate::web::response_helpers::json_response;

pub async fn handle(state: SharedAppState) -> Result<Response<Body>, Infallible> {
    let body = HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        model: state.config.model_id.clone(),
        estimator: state.estimator.kind(),
        worker_available: state.bridge.program().is_available(),
        active_workers: state.bridge.active_workers(),
        invocations: state.bridge.invocation_count(),
        training_in_progress: state.trainer.is_running(),
        uptime_secs: state.started_at.elapsed().as_secs(),
    };
    Ok(json_response(StatusCode::OK, &body))
}
