use actix_web::web;

pub mod admin;
pub mod appointments;
pub mod doctors;
pub mod patients;
pub mod system;
pub mod users;

/// Account and role-gated routes; mounted under `/api` only.
pub fn accounts(cfg: &mut web::ServiceConfig) {
    cfg.service(users::register)
        .service(users::login)
        .service(users::profile)
        .service(users::request_reset)
        .service(users::confirm_reset)
        .service(users::refresh)
        .service(users::logout)
        .service(users::remove)
        .service(admin::dashboard)
        .service(admin::doctor_schedule);
}

/// Patients, doctors and appointments; mounted at the root and under `/api`.
pub fn clinical(cfg: &mut web::ServiceConfig) {
    cfg.service(patients::list)
        .service(patients::create)
        .service(patients::get)
        .service(patients::update)
        .service(patients::remove)
        .service(doctors::list)
        .service(doctors::create)
        .service(doctors::get)
        .service(doctors::update)
        .service(doctors::remove)
        .service(doctors::availability)
        .service(doctors::list_working_hours)
        .service(doctors::add_working_hours)
        .service(doctors::update_working_hours)
        .service(doctors::remove_working_hours)
        .service(doctors::list_block_offs)
        .service(doctors::add_block_off)
        .service(doctors::update_block_off)
        .service(doctors::remove_block_off)
        .service(appointments::list)
        .service(appointments::create)
        .service(appointments::get)
        .service(appointments::update)
        .service(appointments::cancel)
        .service(appointments::notifications);
}
