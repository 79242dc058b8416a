use crate::error::{ApiResult, HttpApiError};
use crate::extractors::clinical;
use crate::schemas::{
    AvailabilityQuery, BlockOffIn, BlockOffQuery, DoctorIn, DoctorPatchIn, DoctorQuery,
    WorkingHoursIn,
};
use crate::state::AppState;
use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use common::{AppError, DoctorProfile, Role};
use serde_json::json;
use tracing::info;
use uuid::Uuid;
use validator::Validate;

const STAFF: [Role; 1] = [Role::Administrator];

#[get("/doctors")]
pub async fn list(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<DoctorQuery>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let rows = data.store.list_doctors(query.specialty.as_deref()).await?;
    Ok(HttpResponse::Ok().json(rows))
}

#[post("/doctors")]
pub async fn create(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<DoctorIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let body = body.into_inner();
    body.validate()?;
    let doctor = data.store.insert_doctor(body.into()).await?;
    info!(doctor_id = %doctor.id, specialty = %doctor.specialty, "doctor created");
    Ok(HttpResponse::Created().json(doctor))
}

#[get("/doctors/{id}")]
pub async fn get(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let id = path.into_inner();
    let doctor = data
        .store
        .get_doctor(id)
        .await?
        .ok_or(HttpApiError::Missing("doctor"))?;
    let profile = DoctorProfile {
        doctor,
        working_hours: data.store.list_working_hours(id).await?,
        block_offs: data.store.list_block_offs(id, None).await?,
    };
    Ok(HttpResponse::Ok().json(profile))
}

#[put("/doctors/{id}")]
pub async fn update(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<DoctorPatchIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let body = body.into_inner();
    body.validate()?;
    let doctor = data
        .store
        .update_doctor(path.into_inner(), body.into())
        .await?
        .ok_or(HttpApiError::Missing("doctor"))?;
    Ok(HttpResponse::Ok().json(doctor))
}

#[delete("/doctors/{id}")]
pub async fn remove(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let id = path.into_inner();
    if !data.scheduler.retire_doctor(id).await? {
        return Err(HttpApiError::Missing("doctor"));
    }
    info!(doctor_id = %id, "doctor deleted");
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}

/// `?datetime=` checks one slot, `?date=` lists the free slots of a day.
#[get("/doctors/{id}/availability")]
pub async fn availability(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<AvailabilityQuery>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let id = path.into_inner();
    match (query.datetime, query.date) {
        (Some(at), _) => {
            let verdict = data.scheduler.availability(id, at).await?;
            Ok(HttpResponse::Ok().json(verdict))
        }
        (None, Some(date)) => {
            let slots = data.scheduler.free_slots(id, date).await?;
            Ok(HttpResponse::Ok().json(json!({
                "doctor_id": id,
                "date": date,
                "slot_minutes": data.scheduler.policy().slot.num_minutes(),
                "slots": slots,
            })))
        }
        (None, None) => {
            let msg = "datetime or date query parameter is required";
            Err(AppError::Unprocessable(msg.into()).into())
        }
    }
}

// ==== Working hours ====

#[get("/doctors/{id}/working-hours")]
pub async fn list_working_hours(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let id = path.into_inner();
    if data.store.get_doctor(id).await?.is_none() {
        return Err(HttpApiError::Missing("doctor"));
    }
    Ok(HttpResponse::Ok().json(data.store.list_working_hours(id).await?))
}

#[post("/doctors/{id}/working-hours")]
pub async fn add_working_hours(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<WorkingHoursIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let body = body.into_inner();
    body.validate()?;
    let row = data
        .store
        .insert_working_hours(path.into_inner(), body.into())
        .await?
        .ok_or(HttpApiError::Missing("doctor"))?;
    Ok(HttpResponse::Created().json(row))
}

#[put("/doctors/{id}/working-hours/{wid}")]
pub async fn update_working_hours(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<WorkingHoursIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let (doctor_id, id) = path.into_inner();
    let body = body.into_inner();
    body.validate()?;
    let row = data
        .store
        .update_working_hours(doctor_id, id, body.into())
        .await?
        .ok_or(HttpApiError::Missing("working hours"))?;
    Ok(HttpResponse::Ok().json(row))
}

#[delete("/doctors/{id}/working-hours/{wid}")]
pub async fn remove_working_hours(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let (doctor_id, id) = path.into_inner();
    if !data.store.delete_working_hours(doctor_id, id).await? {
        return Err(HttpApiError::Missing("working hours"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}

// ==== Block-offs ====

#[get("/doctors/{id}/block-offs")]
pub async fn list_block_offs(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    query: web::Query<BlockOffQuery>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let id = path.into_inner();
    if data.store.get_doctor(id).await?.is_none() {
        return Err(HttpApiError::Missing("doctor"));
    }
    Ok(HttpResponse::Ok().json(data.store.list_block_offs(id, query.date).await?))
}

#[post("/doctors/{id}/block-offs")]
pub async fn add_block_off(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<BlockOffIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let body = body.into_inner();
    body.validate()?;
    let row = data
        .store
        .insert_block_off(path.into_inner(), body.into())
        .await?
        .ok_or(HttpApiError::Missing("doctor"))?;
    Ok(HttpResponse::Created().json(row))
}

#[put("/doctors/{id}/block-offs/{bid}")]
pub async fn update_block_off(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
    body: web::Json<BlockOffIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let (doctor_id, id) = path.into_inner();
    let body = body.into_inner();
    body.validate()?;
    let row = data
        .store
        .update_block_off(doctor_id, id, body.into())
        .await?
        .ok_or(HttpApiError::Missing("block-off"))?;
    Ok(HttpResponse::Ok().json(row))
}

#[delete("/doctors/{id}/block-offs/{bid}")]
pub async fn remove_block_off(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(Uuid, Uuid)>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &STAFF)?;
    let (doctor_id, id) = path.into_inner();
    if !data.store.delete_block_off(doctor_id, id).await? {
        return Err(HttpApiError::Missing("block-off"));
    }
    Ok(HttpResponse::Ok().json(json!({ "deleted": true })))
}
