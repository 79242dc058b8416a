use crate::error::{ApiResult, HttpApiError};
use crate::state::AppState;
use actix_web::http::header;
use actix_web::{HttpResponse, get, web};
use serde_json::json;

const INDEX_HTML: &str = include_str!("../../static/index.html");

#[get("/health")]
pub async fn health(data: web::Data<AppState>) -> HttpResponse {
    let uptime = data.started_at.elapsed().as_secs();
    let healthy = match data.store.ping().await {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(error = %e, "health check: store unreachable");
            false
        }
    };
    let (mut resp, status) = if healthy {
        (HttpResponse::Ok(), "ok")
    } else {
        (HttpResponse::ServiceUnavailable(), "degraded")
    };
    resp.insert_header((header::CACHE_CONTROL, "no-store"))
        .json(json!({
            "status": status,
            "uptime": uptime,
            "version": env!("CARGO_PKG_VERSION"),
        }))
}

#[get("/system/backup-status")]
pub async fn backup_status(data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let Some(backups) = &data.backups else {
        return Err(HttpApiError::Missing("backup"));
    };
    let status = backups.status().await.ok_or(HttpApiError::Missing("backup"))?;
    Ok(HttpResponse::Ok().json(status))
}

#[get("/")]
pub async fn index() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(INDEX_HTML)
}

pub async fn not_found() -> ApiResult<HttpResponse> {
    Err(HttpApiError::Missing("route"))
}
