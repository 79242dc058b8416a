use crate::error::{ApiResult, HttpApiError};
use crate::extractors::AuthUser;
use crate::schemas::{
    LoginInput, RefreshInput, RegisterInput, ResetConfirmInput, ResetRequestInput,
};
use crate::state::AppState;
use actix_web::cookie::{Cookie, time::Duration as CookieDuration};
use actix_web::{HttpRequest, HttpResponse, delete, get, post, web};
use auth::{TokenKind, fingerprint, hash_password, sign_access, sign_refresh, verify_password};
use chrono::{Duration, Utc};
use common::{AppError, NewUser, User};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::middleware::ACCESS_COOKIE;

const REFRESH_COOKIE: &str = "refresh_token";

fn unauthorized() -> HttpApiError {
    HttpApiError::App(AppError::Unauthorized)
}

fn refresh_cookie(value: String, max_age: i64) -> Cookie<'static> {
    Cookie::build(REFRESH_COOKIE, value)
        .path("/")
        .http_only(true)
        .max_age(CookieDuration::seconds(max_age))
        .finish()
}

/// Signs an access/refresh pair and records the refresh fingerprint.
async fn issue_tokens(data: &AppState, user: &User) -> ApiResult<HttpResponse> {
    let access = sign_access(&data.jwt, user.id, user.role, data.access_ttl)?;
    let (refresh_tok, claims) = sign_refresh(&data.jwt, user.id, user.role, data.refresh_ttl)?;
    let expires_at = Utc::now() + Duration::seconds(data.refresh_ttl);
    data.store
        .insert_refresh(user.id, &claims.jti, &fingerprint(&refresh_tok), expires_at)
        .await?;

    let mut resp = HttpResponse::Ok().json(json!({
        "access_token": access,
        "refresh_token": refresh_tok,
        "token_type": "Bearer",
        "expires_in": data.access_ttl,
        "user": user,
    }));
    resp.add_cookie(&refresh_cookie(refresh_tok, data.refresh_ttl)).ok();
    Ok(resp)
}

#[post("/users/register")]
pub async fn register(
    data: web::Data<AppState>,
    payload: web::Json<RegisterInput>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let email = payload.email.trim().to_lowercase();
    if data.store.find_user_by_email(&email).await?.is_some() {
        warn!(%email, "registration with taken email");
        return Err(AppError::Conflict("email already registered".into()).into());
    }

    let user = data
        .store
        .insert_user(NewUser {
            email,
            password_hash: hash_password(&payload.password)?,
            role: payload.role(),
        })
        .await?;

    info!(user_id = %user.id, role = user.role.as_str(), "user registered");
    Ok(HttpResponse::Created().json(user))
}

#[post("/users/login")]
pub async fn login(
    data: web::Data<AppState>,
    payload: web::Json<LoginInput>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    let user = data
        .store
        .find_user_by_email(payload.email.trim())
        .await?
        .ok_or_else(unauthorized)?;

    if !verify_password(&payload.password, &user.password_hash) {
        warn!(user_id = %user.id, "login with wrong password");
        return Err(unauthorized());
    }

    info!(user_id = %user.id, "user logged in");
    issue_tokens(&data, &user).await
}

#[get("/users/profile")]
pub async fn profile(data: web::Data<AppState>, who: AuthUser) -> ApiResult<HttpResponse> {
    // a token can outlive its account
    let user = data
        .store
        .get_user(who.user_id)
        .await?
        .ok_or_else(unauthorized)?;
    Ok(HttpResponse::Ok().json(user))
}

#[post("/users/password-reset/request")]
pub async fn request_reset(
    data: web::Data<AppState>,
    payload: web::Json<ResetRequestInput>,
) -> ApiResult<HttpResponse> {
    if let Some(user) = data.store.find_user_by_email(payload.email.trim()).await? {
        let token = auth::new_opaque_token();
        let expires_at = Utc::now() + Duration::seconds(data.reset_ttl);
        data.store
            .insert_password_reset(user.id, &fingerprint(&token), expires_at)
            .await?;
        // stands in for the mail channel
        debug!(user_id = %user.id, reset_token = %token, "password reset issued");
    }
    Ok(HttpResponse::Accepted().json(json!({
        "message": "if the account exists, a reset link has been sent"
    })))
}

#[post("/users/password-reset/confirm")]
pub async fn confirm_reset(
    data: web::Data<AppState>,
    payload: web::Json<ResetConfirmInput>,
) -> ApiResult<HttpResponse> {
    let payload = payload.into_inner();
    payload.validate()?;

    let user_id = data
        .store
        .consume_password_reset(&fingerprint(&payload.token), Utc::now())
        .await?
        .ok_or_else(|| AppError::BadRequest("invalid or expired reset token".into()))?;

    let hash = hash_password(&payload.new_password)?;
    if !data.store.set_user_password(user_id, &hash).await? {
        return Err(AppError::BadRequest("invalid or expired reset token".into()).into());
    }
    info!(%user_id, "password reset");
    Ok(HttpResponse::Ok().json(json!({ "message": "password updated" })))
}

fn presented_refresh(req: &HttpRequest, body: Option<web::Json<RefreshInput>>) -> Option<String> {
    body.and_then(|b| b.into_inner().refresh_token)
        .or_else(|| req.cookie(REFRESH_COOKIE).map(|c| c.value().to_string()))
}

#[post("/users/refresh")]
pub async fn refresh(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: Option<web::Json<RefreshInput>>,
) -> ApiResult<HttpResponse> {
    let token = presented_refresh(&req, body).ok_or_else(unauthorized)?;
    let claims = auth::verify_kind(&data.jwt, &token, TokenKind::Refresh)?;

    let row = data
        .store
        .get_refresh_by_jti(&claims.jti)
        .await?
        .ok_or_else(unauthorized)?;
    if row.revoked || row.token_hash != fingerprint(&token) || row.user_id != claims.sub {
        warn!(user_id = %claims.sub, jti = %claims.jti, "refresh token rejected");
        return Err(unauthorized());
    }
    data.store.revoke_refresh(&claims.jti).await?;

    // role may have changed since the token was signed
    let user = data
        .store
        .get_user(claims.sub)
        .await?
        .ok_or_else(unauthorized)?;
    issue_tokens(&data, &user).await
}

#[post("/users/logout")]
pub async fn logout(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: Option<web::Json<RefreshInput>>,
) -> ApiResult<HttpResponse> {
    if let Some(token) = presented_refresh(&req, body) {
        if let Ok(claims) = auth::verify_kind(&data.jwt, &token, TokenKind::Refresh) {
            data.store.revoke_refresh(&claims.jti).await?;
        }
    }
    let clear = |name: &'static str| {
        Cookie::build(name, "")
            .path("/")
            .http_only(true)
            .max_age(CookieDuration::seconds(0))
            .finish()
    };
    let mut resp = HttpResponse::Ok().json(json!({ "message": "logged out" }));
    resp.add_cookie(&clear(ACCESS_COOKIE)).ok();
    resp.add_cookie(&clear(REFRESH_COOKIE)).ok();
    Ok(resp)
}

#[delete("/users/{id}")]
pub async fn remove(
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    who: AuthUser,
) -> ApiResult<HttpResponse> {
    let id = path.into_inner();
    if who.user_id != id && !who.is_admin() {
        return Err(AppError::Forbidden.into());
    }
    if !data.store.delete_user(id).await? {
        return Err(HttpApiError::Missing("user"));
    }
    info!(user_id = %id, by = %who.user_id, "user deleted");
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}
