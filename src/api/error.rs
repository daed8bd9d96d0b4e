//! HTTP mapping of [`EcommerceError`].

use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

use crate::payments::PaymentError;
use crate::store::StoreError;
use crate::EcommerceError;

fn payment_status(e: &PaymentError) -> StatusCode {
    match e {
        PaymentError::SessionExpired => StatusCode::GONE,
        PaymentError::Network(_) => StatusCode::BAD_GATEWAY,
        PaymentError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Body for a failed payment step. The client drops its pending checkout state on any of these.
pub fn payment_failure(status: StatusCode, message: String, category: &str) -> Response {
    (status, Json(json!({ "error": message, "category": category, "clearPendingState": true }))).into_response()
}

impl IntoResponse for EcommerceError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(m) | Self::BusinessRule(m) => (StatusCode::BAD_REQUEST, m.clone()),
            Self::Unauthorized(m) => (StatusCode::UNAUTHORIZED, m.clone()),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Payment(e) => return payment_failure(payment_status(e), e.to_string(), e.category()),
            Self::Storage(StoreError::Duplicate(_)) => (StatusCode::CONFLICT, "Resource already exists".to_string()),
            Self::Upstream(_) => {
                tracing::error!(error = %self, "Upstream failure");
                (StatusCode::BAD_GATEWAY, "Upstream service unavailable".to_string())
            }
            Self::Storage(_) | Self::Config(_) => {
                tracing::error!(error = %self, "Request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}
