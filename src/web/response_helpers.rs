// HTTP response helper functions shared by the route handlers

use hyper::header::{
    HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE,
};
use hyper::{Body, Response, StatusCode};
use serde::Serialize;

use super::error::BridgeError;
use super::models::ErrorBody;

/// Standard CORS headers
const CORS_ORIGIN: &str = "*";
const CORS_METHODS: &str = "GET, POST, OPTIONS";
const CORS_HEADERS: &str = "content-type";

fn with_cors(mut response: Response<Body>) -> Response<Body> {
    let headers = response.headers_mut();
    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static(CORS_ORIGIN));
    headers.insert(ACCESS_CONTROL_ALLOW_METHODS, HeaderValue::from_static(CORS_METHODS));
    headers.insert(ACCESS_CONTROL_ALLOW_HEADERS, HeaderValue::from_static(CORS_HEADERS));
    response
}

/// Build a JSON response with CORS headers
pub fn json_response<T: Serialize>(status: StatusCode, body: &T) -> Response<Body> {
    let json = serde_json::to_string(body)
        .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string());
    let mut response = Response::new(Body::from(json));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    with_cors(response)
}

/// Build a JSON error response
pub fn json_error(status: StatusCode, kind: &'static str, message: &str) -> Response<Body> {
    json_response(
        status,
        &ErrorBody {
            error: message.to_string(),
            kind,
            details: None,
        },
    )
}

/// Failure response for a bridge error: `{error, kind, details?}`.
pub fn bridge_error_response(error: &BridgeError) -> Response<Body> {
    json_response(
        error.status_code(),
        &ErrorBody {
            error: error.public_message().to_string(),
            kind: error.kind(),
            details: error.details(),
        },
    )
}

/// Build an empty response with CORS headers
pub fn empty_response(status: StatusCode) -> Response<Body> {
    let mut response = Response::new(Body::empty());
    *response.status_mut() = status;
    with_cors(response)
}

/// CORS preflight response
pub fn cors_preflight() -> Response<Body> {
    empty_response(StatusCode::NO_CONTENT)
}
