use crate::error::{ApiResult, HttpApiError};
use crate::extractors::clinical;
use crate::schemas::{PatientIn, PatientPatchIn, PatientQuery};
use crate::state::AppState;
use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use common::Role;
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

#[get("/patients")]
pub async fn list(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<PatientQuery>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let rows = data.store.search_patients(&query.into_inner().into()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[post("/patients")]
pub async fn create(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<PatientIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let body = body.into_inner();
    body.validate()?;
    let patient = data.store.insert_patient(body.into()).await?;
    info!(patient_id = %patient.id, "patient created");
    Ok(HttpResponse::Created().json(patient))
}

#[get("/patients/{id}")]
pub async fn get(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let patient = data
        .store
        .get_patient(path.into_inner())
        .await?
        .ok_or(HttpApiError::Missing("patient"))?;
    Ok(HttpResponse::Ok().json(patient))
}

#[put("/patients/{id}")]
pub async fn update(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<PatientPatchIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let body = body.into_inner();
    body.validate()?;
    let patient = data
        .store
        .update_patient(path.into_inner(), body.into())
        .await?
        .ok_or(HttpApiError::Missing("patient"))?;
    Ok(HttpResponse::Ok().json(patient))
}

#[delete("/patients/{id}")]
pub async fn remove(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &[Role::Doctor])?;
    let id = path.into_inner();
    if !data.store.delete_patient(id).await? {
        return Err(HttpApiError::Missing("patient"));
    }
    info!(patient_id = %id, "patient deleted");
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}
