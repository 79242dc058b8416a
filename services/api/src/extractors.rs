use actix_web::{FromRequest, HttpMessage, HttpRequest};
use common::{AppError, Role};
use std::future::{Ready, ready};
use uuid::Uuid;

use crate::error::HttpApiError;
use crate::state::AppState;

/// Caller identity, put into request extensions by
/// [`crate::middleware::Authenticate`] when a valid access token is present.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthUser {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Administrator
    }
}

impl FromRequest for AuthUser {
    type Error = HttpApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut actix_web::dev::Payload) -> Self::Future {
        ready(current_user(req).ok_or(HttpApiError::App(AppError::Unauthorized)))
    }
}

pub fn current_user(req: &HttpRequest) -> Option<AuthUser> {
    req.extensions().get::<AuthUser>().cloned()
}

/// 401 without a token, 403 when the role is not listed. Administrators
/// pass every gate.
pub fn require_role(req: &HttpRequest, roles: &[Role]) -> Result<AuthUser, HttpApiError> {
    let user = current_user(req).ok_or(HttpApiError::App(AppError::Unauthorized))?;
    if user.is_admin() || roles.contains(&user.role) {
        return Ok(user);
    }
    tracing::warn!(user_id = %user.user_id, role = user.role.as_str(), "role check failed");
    Err(HttpApiError::App(AppError::Forbidden))
}

/// Gate for clinical routes; a no-op unless `enforce_auth` is on.
pub fn clinical(req: &HttpRequest, state: &AppState, roles: &[Role]) -> Result<(), HttpApiError> {
    if state.enforce_auth {
        require_role(req, roles)?;
    }
    Ok(())
}
