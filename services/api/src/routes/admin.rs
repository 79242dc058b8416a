use crate::error::{ApiResult, HttpApiError};
use crate::extractors::require_role;
use crate::state::AppState;
use actix_web::{HttpRequest, HttpResponse, get, web};
use chrono::Utc;
use common::{AppError, AppointmentFilter, AppointmentStatus, Role};
use serde_json::{Map, Value, json};

#[get("/admin/dashboard")]
pub async fn dashboard(req: HttpRequest, data: web::Data<AppState>) -> ApiResult<HttpResponse> {
    require_role(&req, &[Role::Administrator])?;

    let mut users = Map::new();
    for role in Role::ALL {
        users.insert(role.as_str().to_owned(), json!(0));
    }
    for (role, n) in data.store.count_users_by_role().await? {
        users.insert(role.as_str().to_owned(), json!(n));
    }

    Ok(HttpResponse::Ok().json(json!({
        "users": Value::Object(users),
        "patients": data.store.count_patients().await?,
        "doctors": data.store.count_doctors().await?,
        "active_appointments": data.store.count_active_appointments().await?,
    })))
}

/// Upcoming appointments of the doctor profile sharing the caller's email.
#[get("/doctor/schedule")]
pub async fn doctor_schedule(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> ApiResult<HttpResponse> {
    let who = require_role(&req, &[Role::Doctor])?;
    let user = data
        .store
        .get_user(who.user_id)
        .await?
        .ok_or(HttpApiError::App(AppError::Unauthorized))?;

    let Some(doctor) = data.store.find_doctor_by_email(&user.email).await? else {
        return Ok(HttpResponse::Ok().json(json!({ "doctor": null, "appointments": [] })));
    };
    let filter = AppointmentFilter {
        doctor_id: Some(doctor.id),
        from: Some(Utc::now()),
        status: Some(AppointmentStatus::Scheduled),
        ..AppointmentFilter::default()
    };
    let appointments = data.scheduler.list(&filter).await?;
    Ok(HttpResponse::Ok().json(json!({ "doctor": doctor, "appointments": appointments })))
}
