use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use validator::ValidationErrors;

/// Failure taxonomy of the service. Every operation boundary converts into
/// one of these; nothing propagates as an unhandled fault.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("invalid code")]
    Mismatch,

    #[error("record not found")]
    NotFound,

    #[error("{0} already exists")]
    Conflict(&'static str),

    #[error("code has expired")]
    Expired,

    #[error("code not verified")]
    NotVerified,

    #[error("{0}")]
    Delivery(String),

    #[error("no account matches that email")]
    AccountNotFound,

    #[error("authentication required")]
    Unauthorized,

    #[error("you do not own this resource")]
    Forbidden,

    #[error("record state is inconsistent")]
    Inconsistent,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        if matches!(err, sqlx::Error::RowNotFound) {
            return AppError::NotFound;
        }
        if let sqlx::Error::Database(db) = &err {
            match db.constraint() {
                Some("profiles_username_key") => return AppError::Conflict("username"),
                Some("profiles_email_key") => return AppError::Conflict("email"),
                Some("accounts_email_key") => return AppError::Conflict("account"),
                _ => {}
            }
        }
        AppError::Internal(err.into())
    }
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::Mismatch => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::NotVerified | AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound | AppError::AccountNotFound => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Expired => StatusCode::GONE,
            AppError::Delivery(_) | AppError::Inconsistent | AppError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // 5xx details go to the log, not to the client.
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Flattens derive-based validation failures into the first human message.
pub fn validation_error(errs: ValidationErrors) -> AppError {
    let message = errs
        .field_errors()
        .values()
        .flat_map(|errors| errors.iter())
        .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
        .unwrap_or_else(|| "invalid request".to_string());

    AppError::Validation(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_maps_to_409() {
        assert_eq!(AppError::Conflict("username").status(), StatusCode::CONFLICT);
    }

    #[test]
    fn expired_maps_to_410() {
        assert_eq!(AppError::Expired.status(), StatusCode::GONE);
    }

    #[test]
    fn not_verified_maps_to_403() {
        assert_eq!(AppError::NotVerified.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn delivery_details_are_not_echoed() {
        let response = AppError::Delivery("smtp handshake failed".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
