//! Error taxonomy shared by every layer of the blog.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

pub type Result<T> = std::result::Result<T, AppError>;

/// Why a credential check failed. Both variants reach the client as the same
/// generic message; the distinction only shows up in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthFailure {
    #[error("no account is registered with that email")]
    UnknownEmail,
    #[error("password does not match")]
    BadPassword,
}

/// AppError
///
/// Every failure a handler can surface. Locally recoverable kinds (validation,
/// conflicts, bad credentials) map to 4xx bodies carrying a user-visible message;
/// infrastructure failures map to 5xx and are logged.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error("malformed request body: {0}")]
    Body(#[from] JsonRejection),

    #[error("an account with this email already exists")]
    DuplicateEmail,

    #[error("a post with this title already exists")]
    DuplicateTitle,

    #[error("resource not found")]
    NotFound,

    #[error("the last administrator cannot be demoted")]
    LastAdministrator,

    #[error("you are not allowed to perform this action")]
    Forbidden,

    #[error("authentication required")]
    Unauthorized,

    #[error("authentication failed: {0}")]
    Auth(#[from] AuthFailure),

    #[error("SQL request failed: {0}")]
    Database(#[from] sqlx::Error),

    #[error("password hashing failed: {0}")]
    PasswordHash(String),

    #[error("session token error: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),

    #[error("mail relay failed: {0}")]
    Mail(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// JSON body returned for every error response.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    title: String,
    status: u16,
    detail: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

impl ResponseError {
    fn new(status: StatusCode, title: &str, detail: String) -> Self {
        Self {
            title: title.to_owned(),
            status: status.as_u16(),
            detail,
            errors: None,
        }
    }
}

fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

impl AppError {
    /// HTTP status used when this error reaches the client.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::Body(rejection) => rejection.status(),
            AppError::DuplicateEmail | AppError::DuplicateTitle | AppError::LastAdministrator => {
                StatusCode::CONFLICT
            }
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Unauthorized | AppError::Auth(_) => StatusCode::UNAUTHORIZED,
            AppError::Mail(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_)
            | AppError::PasswordHash(_)
            | AppError::Token(_)
            | AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Validation(errors) => {
                let mut body = ResponseError::new(
                    status,
                    "There were validation errors with your request.",
                    self.to_string(),
                );
                body.errors = Some(field_errors(errors));
                body
            }
            AppError::Body(rejection) => ResponseError::new(
                status,
                "The request body could not be read.",
                rejection.body_text(),
            ),
            AppError::LastAdministrator => ResponseError::new(
                status,
                "Promote another administrator first.",
                self.to_string(),
            ),
            AppError::DuplicateEmail => ResponseError::new(
                status,
                "You've already signed up with that email, log in instead!",
                self.to_string(),
            ),
            AppError::DuplicateTitle => {
                ResponseError::new(status, "Title already taken.", self.to_string())
            }
            AppError::NotFound => ResponseError::new(status, "Not found.", self.to_string()),
            AppError::Forbidden => ResponseError::new(status, "Forbidden.", self.to_string()),
            AppError::Unauthorized => {
                ResponseError::new(status, "Please log in first.", self.to_string())
            }
            AppError::Auth(reason) => {
                tracing::info!(%reason, "login rejected");
                ResponseError::new(
                    status,
                    "Invalid email or password.",
                    "the supplied credentials were not accepted".to_owned(),
                )
            }
            AppError::Mail(details) => {
                tracing::error!(%details, "mail relay failure");
                ResponseError::new(status, "Message could not be sent.", String::new())
            }
            AppError::Database(_)
            | AppError::PasswordHash(_)
            | AppError::Token(_)
            | AppError::Config(_) => {
                tracing::error!(err = %self, "server returned 500 status");
                ResponseError::new(status, "Internal server error.", String::new())
            }
        };

        (status, Json(body)).into_response()
    }
}

/// Translates a Postgres error into the conflict/not-found variant it stands for.
///
/// `23505` is a unique violation, `23503` a foreign key violation.
pub(crate) fn classify_db_error(err: sqlx::Error, on_unique: AppError) -> AppError {
    let code = err
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());

    match code.as_deref() {
        Some("23505") => on_unique,
        Some("23503") => AppError::NotFound,
        _ => AppError::Database(err),
    }
}
