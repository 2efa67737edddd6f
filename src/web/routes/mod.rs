// Route handler modules

pub mod health;
pub mod predict;
pub mod train;

use std::convert::Infallible;

use hyper::{Body, Method, Request, Response, StatusCode};

use crate::sys_debug;
use crate::web::models::SharedAppState;
use crate::web::response_helpers::{cors_preflight, json_error};

/// Route one request by `(method, path)`.
pub async fn handle_request(
    req: Request<Body>,
    state: SharedAppState,
) -> Result<Response<Body>, Infallible> {
    sys_debug!("[HTTP] {} {}", req.method(), req.uri().path());
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/health") => health::handle(state).await,
        (&Method::POST, "/predict") => predict::handle(req, state).await,
        (&Method::POST, "/train") => train::handle(state).await,
        (&Method::OPTIONS, _) => Ok(cors_preflight()),
        _ => Ok(json_error(StatusCode::NOT_FOUND, "not_found", "Not Found")),
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{body_json, state_with_script};
    use super::*;
    use crate::web::config::EstimatorKind;

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let state = state_with_script("exit 0", EstimatorKind::Worker);
        let req = Request::get("/nope").body(Body::empty()).unwrap();
        let response = handle_request(req, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["kind"], "not_found");
    }

    #[tokio::test]
    async fn test_preflight_is_answered() {
        let state = state_with_script("exit 0", EstimatorKind::Worker);
        let req = Request::builder()
            .method(Method::OPTIONS)
            .uri("/predict")
            .body(Body::empty())
            .unwrap();
        let response = handle_request(req, state).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_get_predict_is_not_routed() {
        let state = state_with_script("exit 0", EstimatorKind::Worker);
        let req = Request::get("/predict").body(Body::empty()).unwrap();
        let response = handle_request(req, state.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(state.bridge.invocation_count(), 0);
    }
}
