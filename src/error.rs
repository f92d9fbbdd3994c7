use crate::dto::{ErrorBody, FieldError};
use crate::identity::{AuthErrorKind, IdentityError};
use crate::store::StoreError;
use crate::validation::Validation;
use axum::{
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

// ── API error ──────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("validation failed: {0}")]
    Validation(Validation),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("no token provided")]
    MissingToken,
    #[error("token required")]
    TokenRequired,
    #[error("invalid token: {0}")]
    InvalidToken(&'static str),
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
    #[error("task not found")]
    NotFound,
    #[error("email already in use")]
    DuplicateEmail,
    #[error("{}", .0.message())]
    Identity(AuthErrorKind),
    #[error("service not available")]
    ServiceUnavailable,
    #[error("internal: {0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) | ApiError::TokenRequired => {
                StatusCode::BAD_REQUEST
            }
            ApiError::DuplicateEmail => StatusCode::BAD_REQUEST,
            ApiError::MissingToken | ApiError::InvalidToken(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Identity(kind) => match kind {
                AuthErrorKind::UserNotFound
                | AuthErrorKind::WrongPassword
                | AuthErrorKind::InvalidCredential => StatusCode::UNAUTHORIZED,
                AuthErrorKind::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
                AuthErrorKind::NetworkRequestFailed => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::BAD_REQUEST,
            },
            ApiError::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn body(&self) -> ErrorBody {
        let (error, message) = match self {
            ApiError::Validation(v) => ("Validation failed", v.to_string()),
            ApiError::BadRequest(detail) => ("Bad request", detail.clone()),
            ApiError::MissingToken => ("Unauthorized", "No token provided".to_string()),
            ApiError::TokenRequired => ("Token required", "Please provide a token".to_string()),
            ApiError::InvalidToken(detail) => ("Invalid token", detail.to_string()),
            ApiError::Forbidden(detail) => ("Forbidden", detail.to_string()),
            ApiError::NotFound => ("Task not found", "No task exists with this id".to_string()),
            ApiError::DuplicateEmail => (
                "Email already in use",
                "This email is already registered".to_string(),
            ),
            ApiError::Identity(kind) => {
                return ErrorBody {
                    error: kind.code().to_string(),
                    message: kind.message().to_string(),
                    errors: Vec::new(),
                }
            }
            ApiError::ServiceUnavailable => (
                "Service not available",
                "Persistence is not configured - tasks cannot be stored".to_string(),
            ),
            // Internal detail stays in the log.
            ApiError::Internal(_) => ("Server error", "An internal error occurred".to_string()),
        };

        let errors = match self {
            ApiError::Validation(v) => v
                .violations()
                .iter()
                .map(|violation| FieldError {
                    field: violation.field.to_string(),
                    message: violation.message.to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };

        ErrorBody {
            error: error.to_string(),
            message,
            errors,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!(%detail, "request failed");
        }
        (self.status(), Json(self.body())).into_response()
    }
}

// ── Conversions ────────────────────────────────────────────────

impl From<Validation> for ApiError {
    fn from(validation: Validation) -> Self {
        ApiError::Validation(validation)
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(_) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(error: IdentityError) -> Self {
        match error {
            IdentityError::Auth(kind) => ApiError::Identity(kind),
            IdentityError::InvalidToken(_) => ApiError::InvalidToken("Token verification failed"),
            IdentityError::Store(e) => e.into(),
            IdentityError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ApiError::MissingToken, StatusCode::UNAUTHORIZED)]
    #[case(ApiError::TokenRequired, StatusCode::BAD_REQUEST)]
    #[case(ApiError::Forbidden("nope"), StatusCode::FORBIDDEN)]
    #[case(ApiError::NotFound, StatusCode::NOT_FOUND)]
    #[case(ApiError::DuplicateEmail, StatusCode::BAD_REQUEST)]
    #[case(ApiError::ServiceUnavailable, StatusCode::SERVICE_UNAVAILABLE)]
    #[case(ApiError::Internal("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(ApiError::Identity(AuthErrorKind::TooManyRequests), StatusCode::TOO_MANY_REQUESTS)]
    #[case(ApiError::Identity(AuthErrorKind::WrongPassword), StatusCode::UNAUTHORIZED)]
    #[case(ApiError::Identity(AuthErrorKind::WeakPassword), StatusCode::BAD_REQUEST)]
    fn status_codes(#[case] error: ApiError, #[case] expected: StatusCode) {
        assert_eq!(error.status(), expected);
    }

    #[test]
    fn validation_body_lists_field_errors() {
        let mut validation = Validation::default();
        validation.push("title", "Title is required");
        let body = ApiError::Validation(validation).body();
        assert_eq!(body.error, "Validation failed");
        assert_eq!(body.message, "Title is required");
        assert_eq!(
            body.errors,
            vec![FieldError {
                field: "title".into(),
                message: "Title is required".into()
            }]
        );
    }

    #[test]
    fn internal_detail_is_not_leaked() {
        let body = ApiError::Internal("redb: disk on fire".into()).body();
        assert!(!body.message.contains("disk"));
    }

    #[test]
    fn identity_body_carries_provider_code() {
        let body = ApiError::Identity(AuthErrorKind::EmailAlreadyInUse).body();
        assert_eq!(body.error, "auth/email-already-in-use");
        assert!(body.message.starts_with("This email is already registered"));
    }

    #[test]
    fn store_not_found_maps_to_404() {
        let error: ApiError = StoreError::NotFound("t1".into()).into();
        assert!(matches!(error, ApiError::NotFound));
    }
}
