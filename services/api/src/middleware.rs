use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::{Error, HttpMessage};
use auth::{JwtKeys, TokenKind};
use futures_util::future::{LocalBoxFuture, Ready, ok};
use std::rc::Rc;

use crate::extractors::AuthUser;

pub const ACCESS_COOKIE: &str = "access_token";

/// Resolves the caller from `Authorization: Bearer` (or the access cookie)
/// and stores an [`AuthUser`] in the request extensions. Requests without a
/// usable token pass through untouched; the handlers decide what needs one.
pub struct Authenticate {
    keys: JwtKeys,
}

impl Authenticate {
    pub fn new(keys: JwtKeys) -> Self {
        Self { keys }
    }
}

impl<S, B> Transform<S, ServiceRequest> for Authenticate
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Transform = AuthenticateMiddleware<S>;
    type InitError = ();
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ok(AuthenticateMiddleware {
            service: Rc::new(service),
            keys: self.keys.clone(),
        })
    }
}

pub struct AuthenticateMiddleware<S> {
    service: Rc<S>,
    keys: JwtKeys,
}

fn bearer(req: &ServiceRequest) -> Option<String> {
    let header = req
        .headers()
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());
    header.or_else(|| req.cookie(ACCESS_COOKIE).map(|c| c.value().to_string()))
}

impl<S, B> Service<ServiceRequest> for AuthenticateMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(
        &self,
        ctx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.service.poll_ready(ctx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        if let Some(token) = bearer(&req) {
            match auth::verify_kind(&self.keys, &token, TokenKind::Access) {
                Ok(claims) => {
                    req.extensions_mut().insert(AuthUser {
                        user_id: claims.sub,
                        role: claims.role,
                    });
                }
                Err(e) => tracing::debug!(path = req.path(), error = %e, "rejected bearer token"),
            }
        }
        let fut = self.service.call(req);
        Box::pin(async move {
            let res = fut.await?;
            Ok(res)
        })
    }
}
