use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use auth::AuthError;
use booking::BookingError;
use common::AppError;
use db::DbError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum HttpApiError {
    #[error("{0}")]
    App(#[from] AppError),
    #[error("db error")]
    Db(#[from] DbError),
    #[error("{0}")]
    Booking(#[from] BookingError),
    #[error("{0}")]
    Auth(#[from] AuthError),
    #[error("{0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("{0} not found")]
    Missing(&'static str),
}

impl HttpApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        use StatusCode as S;
        match self {
            Self::App(e) => match e {
                AppError::NotFound => (S::NOT_FOUND, "not_found", "resource not found".into()),
                AppError::Gone => (S::GONE, "gone", "resource is no longer available".into()),
                AppError::Conflict(m) => (S::CONFLICT, "conflict", m.clone()),
                AppError::Unprocessable(m) => (S::UNPROCESSABLE_ENTITY, "unprocessable", m.clone()),
                AppError::Unauthorized => {
                    (S::UNAUTHORIZED, "unauthorized", "missing or invalid credentials".into())
                }
                AppError::Forbidden => (S::FORBIDDEN, "forbidden", "insufficient role".into()),
                AppError::BadRequest(m) => (S::BAD_REQUEST, "bad_request", m.clone()),
                AppError::Internal => internal(),
            },
            Self::Db(e) => match e {
                DbError::SlotTaken => (S::CONFLICT, "conflict", "slot already taken".into()),
                DbError::Duplicate(field) => {
                    (S::CONFLICT, "conflict", format!("{field} already exists"))
                }
                _ => internal(),
            },
            Self::Booking(e) => match e {
                BookingError::NotFound(what) => {
                    (S::NOT_FOUND, "not_found", format!("{what} not found"))
                }
                BookingError::Gone => (S::GONE, "gone", e.to_string()),
                BookingError::Conflict(m) => (S::CONFLICT, "conflict", m.clone()),
                BookingError::Unprocessable(m) => {
                    (S::UNPROCESSABLE_ENTITY, "unprocessable", m.clone())
                }
                BookingError::Store(DbError::SlotTaken) => {
                    (S::CONFLICT, "conflict", "slot already taken".into())
                }
                BookingError::Store(_) => internal(),
            },
            Self::Auth(AuthError::Hash) => internal(),
            Self::Auth(_) => (S::UNAUTHORIZED, "unauthorized", "invalid token".into()),
            Self::Validation(e) => (S::UNPROCESSABLE_ENTITY, "validation_failed", e.to_string()),
            Self::Missing(what) => (S::NOT_FOUND, "not_found", format!("{what} not found")),
        }
    }
}

fn internal() -> (StatusCode, &'static str, String) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal",
        "internal server error".into(),
    )
}

impl ResponseError for HttpApiError {
    fn status_code(&self) -> StatusCode {
        self.parts().0
    }

    fn error_response(&self) -> HttpResponse {
        let (status, code, message) = self.parts();
        if status.is_server_error() {
            error!(error = ?self, "request failed");
        }
        HttpResponse::build(status).json(json!({ "error": code, "message": message }))
    }
}

pub type ApiResult<T> = Result<T, HttpApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        let cases: Vec<(HttpApiError, u16)> = vec![
            (AppError::Unauthorized.into(), 401),
            (AppError::Forbidden.into(), 403),
            (BookingError::Gone.into(), 410),
            (BookingError::Conflict("x".into()).into(), 409),
            (BookingError::Unprocessable("x".into()).into(), 422),
            (DbError::Duplicate("email".into()).into(), 409),
            (DbError::Corrupt("row".into()).into(), 500),
            (AuthError::InvalidToken.into(), 401),
        ];
        for (err, code) in cases {
            assert_eq!(err.status_code().as_u16(), code, "{err:?}");
        }
    }

    #[test]
    fn storage_details_stay_private() {
        let err = HttpApiError::from(DbError::Corrupt("weekday 9".into()));
        let (_, code, message) = err.parts();
        assert_eq!(code, "internal");
        assert!(!message.contains("weekday"));
    }
}
