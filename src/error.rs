use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::borrow::Cow;

/// Failures raised by the membership and registration core.
///
/// Every kind is raised synchronously by the operation that detects it and
/// nothing is retried internally.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("{0}")]
    NotFound(Cow<'static, str>),
    #[error("{0}")]
    Conflict(Cow<'static, str>),
    #[error("{0}")]
    InvalidOperation(Cow<'static, str>),
    #[error("{0}")]
    Forbidden(Cow<'static, str>),
    #[error("{0}")]
    InvalidInput(Cow<'static, str>),
    #[error("{0}")]
    Unauthorized(Cow<'static, str>),
    /// A cascade failed part way and was rolled back as a whole.
    #[error("cascade aborted: {0}")]
    Fatal(Cow<'static, str>),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    pub fn not_found(s: impl Into<Cow<'static, str>>) -> Self {
        Self::NotFound(s.into())
    }

    pub fn conflict(s: impl Into<Cow<'static, str>>) -> Self {
        Self::Conflict(s.into())
    }

    pub fn invalid(s: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidOperation(s.into())
    }

    pub fn forbidden(s: impl Into<Cow<'static, str>>) -> Self {
        Self::Forbidden(s.into())
    }

    pub fn invalid_input(s: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidInput(s.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CoreError::Fatal(_) | CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<diesel::result::Error> for CoreError {
    fn from(e: diesel::result::Error) -> CoreError {
        use diesel::result::{DatabaseErrorKind, Error};

        match e {
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                CoreError::conflict("the record already exists")
            }
            e => CoreError::Internal(e.into()),
        }
    }
}

pub enum AppError {
    InternalServerError(anyhow::Error),
    ResponseStatusError(StatusCode, Cow<'static, str>),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct AppErrorResponse {
            status: u16,
            message: Cow<'static, str>,
        }

        match self {
            AppError::InternalServerError(err) => {
                tracing::error!(error = ?err, "request failed");
                AppError::from(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
                    .into_response()
            }
            AppError::ResponseStatusError(code, s) => (
                code,
                Json(AppErrorResponse {
                    status: code.as_u16(),
                    message: s,
                }),
            )
                .into_response(),
        }
    }
}

impl From<CoreError> for AppError {
    fn from(e: CoreError) -> AppError {
        let code = e.status_code();
        match e {
            CoreError::Internal(err) => AppError::InternalServerError(err),
            CoreError::Fatal(reason) => {
                AppError::InternalServerError(anyhow::anyhow!("cascade aborted: {reason}"))
            }
            CoreError::NotFound(s)
            | CoreError::Conflict(s)
            | CoreError::InvalidOperation(s)
            | CoreError::Forbidden(s)
            | CoreError::InvalidInput(s)
            | CoreError::Unauthorized(s) => AppError::ResponseStatusError(code, s),
        }
    }
}

impl AppError {
    pub fn from(code: StatusCode, s: impl Into<Cow<'static, str>>) -> AppError {
        AppError::ResponseStatusError(code, s.into())
    }
}
