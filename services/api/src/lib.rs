pub mod backup;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod routes;
pub mod schemas;
pub mod state;

use actix_web::{App, web};
use common::AppError;

use crate::error::HttpApiError;

pub fn create_app(
    state: state::AppState,
) -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let json_cfg = web::JsonConfig::default()
        .limit(64 * 1024)
        .error_handler(|err, _| HttpApiError::from(AppError::BadRequest(err.to_string())).into());
    let query_cfg = web::QueryConfig::default()
        .error_handler(|err, _| HttpApiError::from(AppError::BadRequest(err.to_string())).into());
    // a malformed id can never name an existing resource
    let path_cfg = web::PathConfig::default()
        .error_handler(|_, _| HttpApiError::Missing("resource").into());

    let keys = state.jwt.clone();
    App::new()
        .app_data(web::Data::new(state))
        .app_data(json_cfg)
        .app_data(query_cfg)
        .app_data(path_cfg)
        .wrap(middleware::Authenticate::new(keys))
        .service(routes::system::index)
        .service(routes::system::health)
        .service(routes::system::backup_status)
        .service(
            web::scope("/api")
                .configure(routes::accounts)
                .configure(routes::clinical),
        )
        .configure(routes::clinical)
        .default_service(web::to(routes::system::not_found))
}
