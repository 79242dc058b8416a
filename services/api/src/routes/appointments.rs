use crate::error::ApiResult;
use crate::extractors::clinical;
use crate::schemas::{AppointmentIn, AppointmentPatchIn, AppointmentQuery};
use crate::state::AppState;
use actix_web::{HttpRequest, HttpResponse, delete, get, post, put, web};
use booking::{Amendment, BookingRequest};
use common::{AppointmentFilter, Role};
use uuid::Uuid;
use validator::Validate;

#[get("/appointments")]
pub async fn list(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<AppointmentQuery>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let filter = AppointmentFilter::try_from(query.into_inner())?;
    Ok(HttpResponse::Ok().json(data.scheduler.list(&filter).await?))
}

#[post("/appointments")]
pub async fn create(
    req: HttpRequest,
    data: web::Data<AppState>,
    body: web::Json<AppointmentIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let body = body.into_inner();
    body.validate()?;
    let booked = data
        .scheduler
        .book(BookingRequest {
            doctor_id: body.doctor_id,
            patient_id: body.patient_id,
            starts_at: body.starts_at()?,
            ends_at: body.end_time,
            reason: body.reason,
        })
        .await?;
    Ok(HttpResponse::Created().json(booked.appointment))
}

#[get("/appointments/{id}")]
pub async fn get(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let appointment = data.scheduler.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

#[put("/appointments/{id}")]
pub async fn update(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
    body: web::Json<AppointmentPatchIn>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let body = body.into_inner();
    body.validate()?;
    let amendment = Amendment {
        starts_at: body.starts_at()?,
        status: body.status()?,
        ends_at: body.end_time,
        reason: body.reason,
    };
    let appointment = data.scheduler.amend(path.into_inner(), amendment).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

#[delete("/appointments/{id}")]
pub async fn cancel(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    let appointment = data.scheduler.cancel(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(appointment))
}

#[get("/appointments/{id}/notifications")]
pub async fn notifications(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Uuid>,
) -> ApiResult<HttpResponse> {
    clinical(&req, &data, &Role::ALL)?;
    Ok(HttpResponse::Ok().json(data.scheduler.notifications(path.into_inner()).await?))
}
