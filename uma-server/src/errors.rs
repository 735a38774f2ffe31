use crate::store::StoreError;
use axum::response::IntoResponse;
use axum::Json;
use http::StatusCode;
use log::error;
use serde_json::json;
use thiserror::Error;

/// Caller-visible failures of the UMA endpoints.
///
/// Each variant maps to one `error` token in the response body.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum UmaError {
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    InvalidTicket(String),
    #[error("{0}")]
    ExpiredTicket(String),
    #[error("{0}")]
    NotAuthorizedPermission(String),
    #[error("{0}")]
    InvalidResourceSetId(String),
    #[error("{0}")]
    InvalidResourceSetScope(String),
    #[error("{0}")]
    InvalidScope(String),
    #[error("Claims are required to authorize ticket {ticket}")]
    NeedClaims { ticket: String },
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    ServerError(String),
}

impl UmaError {
    pub fn error_token(&self) -> &'static str {
        match self {
            Self::Unauthorized(_) => "unauthorized",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTicket(_) => "invalid_ticket",
            Self::ExpiredTicket(_) => "expired_ticket",
            Self::NotAuthorizedPermission(_) => "not_authorized_permission",
            Self::InvalidResourceSetId(_) => "invalid_resource_set_id",
            Self::InvalidResourceSetScope(_) => "invalid_resource_set_scope",
            Self::InvalidScope(_) => "invalid_scope",
            Self::NeedClaims { .. } => "need_claims",
            Self::ValidationError(_) => "invalid_request",
            Self::NotFound(_) => "not_found",
            Self::ServerError(_) => "server_error",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) | Self::NotAuthorizedPermission(_) | Self::NeedClaims { .. } => {
                StatusCode::FORBIDDEN
            }
            Self::InvalidTicket(_)
            | Self::ExpiredTicket(_)
            | Self::InvalidResourceSetId(_)
            | Self::InvalidResourceSetScope(_)
            | Self::InvalidScope(_)
            | Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for UmaError {
    fn from(err: StoreError) -> Self {
        error!("Store operation failed: {}", err);
        Self::ServerError("Internal storage error".to_string())
    }
}

impl IntoResponse for UmaError {
    fn into_response(self) -> axum::response::Response {
        let status_code = self.status_code();
        let mut body = json!({
            "error": self.error_token(),
            "error_description": self.to_string(),
        });
        if let Self::NeedClaims { ticket } = &self {
            body["ticket"] = json!(ticket);
        }
        (status_code, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;
    use serde_json::Value;

    async fn render(err: UmaError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read response body")
            .to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_body_carries_token() {
        let (status, body) = render(UmaError::ExpiredTicket("Permission is not valid.".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "expired_ticket");
        assert_eq!(body["error_description"], "Permission is not valid.");
    }

    #[tokio::test]
    async fn test_need_claims_echoes_ticket() {
        let (status, body) = render(UmaError::NeedClaims {
            ticket: "t-1".into(),
        })
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["error"], "need_claims");
        assert_eq!(body["ticket"], "t-1");
    }

    #[test]
    fn test_store_errors_become_server_errors() {
        let err = UmaError::from(StoreError::Redis("connection refused".into()));
        assert_eq!(err.error_token(), "server_error");
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
