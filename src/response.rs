use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// Uniform response envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse {
    pub status: &'static str,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

pub struct Envelope(StatusCode, ApiResponse);

impl ApiResponse {
    pub fn success<T: Serialize>(code: &str, message: &str, data: T) -> Envelope {
        Envelope(
            StatusCode::OK,
            ApiResponse {
                status: "success",
                code: code.to_string(),
                message: message.to_string(),
                data: serde_json::to_value(data).ok(),
                details: None,
            },
        )
    }

    pub fn created<T: Serialize>(code: &str, message: &str, data: T) -> Envelope {
        Envelope(
            StatusCode::CREATED,
            ApiResponse {
                status: "success",
                code: code.to_string(),
                message: message.to_string(),
                data: serde_json::to_value(data).ok(),
                details: None,
            },
        )
    }

    pub fn error(
        status: StatusCode,
        code: &str,
        message: &str,
        details: Option<serde_json::Value>,
    ) -> Envelope {
        Envelope(
            status,
            ApiResponse {
                status: "error",
                code: code.to_string(),
                message: message.to_string(),
                data: None,
                details,
            },
        )
    }
}

impl IntoResponse for Envelope {
    fn into_response(self) -> Response {
        (self.0, Json(self.1)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_envelope_carries_data_and_omits_details() {
        let Envelope(status, body) =
            ApiResponse::success("LOGIN_SUCCESS", "Login successful", json!({"token": "t"}));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "success");

        let rendered = serde_json::to_value(&body).unwrap();
        assert_eq!(rendered["data"]["token"], "t");
        assert!(rendered.get("details").is_none());
    }

    #[test]
    fn error_envelope_omits_data() {
        let Envelope(status, body) = ApiResponse::error(
            StatusCode::BAD_REQUEST,
            "BAD_REQUEST",
            "Invalid request format",
            None,
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let rendered = serde_json::to_value(&body).unwrap();
        assert!(rendered.get("data").is_none());
        assert_eq!(rendered["code"], "BAD_REQUEST");
    }
}
