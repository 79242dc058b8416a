#![allow(dead_code)]

use actix_web::body::MessageBody;
use actix_web::dev::{Service, ServiceResponse};
use actix_web::http::StatusCode;
use actix_web::test;
use api::state::{AppState, Settings};
use chrono::{DateTime, Duration, TimeZone, Utc};
use db::MemStore;
use serde_json::{Value, json};
use std::sync::Arc;

pub const SECRET: &str = "test_secret_key";

pub fn state() -> AppState {
    AppState::new(Arc::new(MemStore::new()), &Settings::with_secret(SECRET)).unwrap()
}

pub fn strict_state() -> AppState {
    let mut s = state();
    s.enforce_auth = true;
    s
}

/// Sends a request and decodes the body as JSON (`Null` when empty).
pub async fn send<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    let bytes = test::read_body(resp).await;
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

pub fn unique_email(prefix: &str) -> String {
    format!("{prefix}_{}@example.com", uuid::Uuid::new_v4().simple())
}

/// Registers and logs in; returns `(user_id, access_token)`.
pub async fn login_as<S, B>(app: &S, role: &str) -> (String, String)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    login_with_email(app, &unique_email(&role.to_lowercase()), role).await
}

pub async fn login_with_email<S, B>(app: &S, email: &str, role: &str) -> (String, String)
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/users/register")
        .set_json(json!({ "email": email, "password": "Sup3rSecret!", "role": role }))
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let id = body["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::post()
        .uri("/api/users/login")
        .set_json(json!({ "email": email, "password": "Sup3rSecret!" }))
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    (id, body["access_token"].as_str().unwrap().to_string())
}

pub async fn create_doctor<S, B>(app: &S, body: Value) -> String
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/api/doctors")
        .set_json(body)
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

pub async fn create_patient<S, B>(app: &S, first: &str, last: &str) -> String
where
    S: Service<actix_http::Request, Response = ServiceResponse<B>, Error = actix_web::Error>,
    B: MessageBody,
{
    let req = test::TestRequest::post()
        .uri("/patients")
        .set_json(json!({ "firstName": first, "lastName": last }))
        .to_request();
    let (status, body) = send(app, req).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["id"].as_str().unwrap().to_string()
}

/// `days` from today at `hour:minute` UTC, formatted like the API echoes it.
pub fn slot(days: i64, hour: u32, minute: u32) -> (DateTime<Utc>, String) {
    let day = (Utc::now() + Duration::days(days)).date_naive();
    let at = Utc.from_utc_datetime(&day.and_hms_opt(hour, minute, 0).unwrap());
    (at, at.format("%Y-%m-%dT%H:%M:%SZ").to_string())
}
