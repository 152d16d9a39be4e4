//! Response builders for JSON APIs

use http_body_util::Full;
use hyper::header::{HeaderValue, ALLOW, CONTENT_TYPE};
use hyper::{body::Bytes, Method, Response, StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::error;

pub type ApiResponse = Response<Full<Bytes>>;

const JSON: &str = "application/json";

/// Response with a raw body and content type
pub fn body_response(
    status: StatusCode,
    content_type: &'static str,
    body: impl Into<Bytes>,
) -> ApiResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

/// Serialize `body` as JSON
pub fn json_response<T: Serialize + ?Sized>(status: StatusCode, body: &T) -> ApiResponse {
    match serde_json::to_vec(body) {
        Ok(bytes) => body_response(status, JSON, bytes),
        Err(e) => {
            error!("Failed to serialize response body: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "failed to encode response")
        }
    }
}

/// Response with status only
pub fn empty_response(status: StatusCode) -> ApiResponse {
    let mut response = Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}

/// `{"error": <reason phrase>, "message": <message>}`
pub fn error_response(status: StatusCode, message: &str) -> ApiResponse {
    let body = json!({
        "error": status.canonical_reason().unwrap_or("Error"),
        "message": message,
    });
    match serde_json::to_vec(&body) {
        Ok(bytes) => body_response(status, JSON, bytes),
        Err(_) => empty_response(status),
    }
}

/// Create a 400 Bad Request response
pub fn bad_request_response(reason: &str) -> ApiResponse {
    error_response(StatusCode::BAD_REQUEST, reason)
}

/// Create a 404 Not Found response
pub fn not_found_response(reason: &str) -> ApiResponse {
    error_response(StatusCode::NOT_FOUND, reason)
}

/// Create a 503 Service Unavailable response
pub fn service_unavailable_response(reason: &str) -> ApiResponse {
    error_response(StatusCode::SERVICE_UNAVAILABLE, reason)
}

/// Create a 405 response listing the methods the path accepts
pub fn method_not_allowed_response(allowed: &[Method]) -> ApiResponse {
    let allow = allowed
        .iter()
        .map(Method::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut response = error_response(
        StatusCode::METHOD_NOT_ALLOWED,
        &format!("allowed methods: {}", allow),
    );
    if let Ok(value) = HeaderValue::from_str(&allow) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

/// `{"status": "UP"}` or `{"status": "DOWN"}`, always 200
pub fn health_response(up: bool) -> ApiResponse {
    let status = if up { "UP" } else { "DOWN" };
    json_response(StatusCode::OK, &json!({ "status": status }))
}
