// Request parsing utilities for HTTP handlers

use hyper::body::HttpBody;
use hyper::Body;
use serde::de::DeserializeOwned;

use super::error::BridgeError;
use crate::sys_debug;

/// Largest accepted request body.
pub const MAX_BODY_BYTES: usize = 16 * 1024;

/// Read and deserialize a JSON request body.
///
/// Oversized, empty and malformed bodies (including missing or ill-typed
/// fields) are all validation errors.
pub async fn parse_json_body<T: DeserializeOwned>(mut body: Body) -> Result<T, BridgeError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        let chunk = chunk
            .map_err(|e| BridgeError::Validation(format!("failed to read request body: {e}")))?;
        if bytes.len() + chunk.len() > MAX_BODY_BYTES {
            return Err(BridgeError::Validation(format!(
                "request body exceeds {MAX_BODY_BYTES} bytes"
            )));
        }
        bytes.extend_from_slice(&chunk);
    }

    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(BridgeError::Validation(
            "No transaction data provided".to_string(),
        ));
    }
    sys_debug!("[REQUEST] Body: {}", String::from_utf8_lossy(&bytes));

    serde_json::from_slice::<T>(&bytes).map_err(|e| BridgeError::Validation(e.to_string()))
}
