// Classification route handler

use hyper::{Body, Request, Response, StatusCode};
use std::convert::Infallible;

use fraud_bridge_types::TransactionFeatures;

use crate::web::models::{ClassificationResponse, SharedAppState};
use crate::web::request_parsing::parse_json_body;
use crate::web::response_helpers::{bridge_error_response, json_response};
use crate::{sys_info, sys_warn};

/// `POST /predict`: validate the transaction, then score it.
///
/// Input problems are answered with 400 before any worker is launched.
pub async fn handle(req: Request<Body>, state: SharedAppState) -> Result<Response<Body>, Infallible> {
    let features: TransactionFeatures = match parse_json_body(req.into_body()).await {
        Ok(features) => features,
        Err(e) => {
            sys_warn!("[PREDICT] rejected: {e}");
            return Ok(bridge_error_response(&e));
        }
    };

    match state.estimator.classify(&features).await {
        Ok(result) => {
            sys_info!(
                "[PREDICT] {} (p={:.2}) via {}",
                result.status(),
                result.fraud_probability(),
                state.estimator.kind()
            );
            let body = ClassificationResponse {
                result: &result,
                source: state.estimator.source(),
            };
            Ok(json_response(StatusCode::OK, &body))
        }
        Err(e) => Ok(bridge_error_response(&e)),
    }
}
