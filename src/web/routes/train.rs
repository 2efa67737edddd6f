// Training route handler

use hyper::{Body, Response, StatusCode};
use std::convert::Infallible;

use crate::web::models::{SharedAppState, TrainingResponse};
use crate::web::response_helpers::{bridge_error_response, json_response};

/// `POST /train`: run one train-mode worker to completion.
pub async fn handle(state: SharedAppState) -> Result<Response<Body>, Infallible> {
    match state.trainer.train().await {
        Ok(report) => Ok(json_response(
            StatusCode::OK,
            &TrainingResponse::from(report),
        )),
        Err(e) => Ok(bridge_error_response(&e)),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::web::config::EstimatorKind;
    use crate::web::routes::test_support::{body_json, state_with_script};

    #[tokio::test]
    async fn test_successful_training() {
        let state = state_with_script("echo 'Training...'; echo 'Model saved.'", EstimatorKind::Worker);
        let response = handle(state).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["message"], "Training completed successfully!");
        assert_eq!(body["progressLines"], 2);
        assert_eq!(body["summary"], "Model saved.");
        assert!(body["completedAt"].is_string());
    }

    #[tokio::test]
    async fn test_failed_training_is_500() {
        let state = state_with_script("echo 'dataset missing' >&2; exit 1", EstimatorKind::Worker);
        let response = handle(state).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["error"], "Training failed.");
        assert!(body["details"].as_str().unwrap().contains("dataset missing"));
    }
}
