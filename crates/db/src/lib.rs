//! Persistence for the clinic service.
//!
//! [`Store`] is the port the rest of the workspace talks to. Two adapters
//! implement it: [`MemStore`] keeps everything in process behind one async
//! mutex, [`PgStore`] maps onto Postgres through sqlx. Both enforce the
//! booking invariant themselves: two active appointments of one doctor
//! never overlap, and a write that would break that fails with
//! [`DbError::SlotTaken`].

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{
    Appointment, AppointmentFilter, AppointmentStatus, BlockOff, BlockOffWindow, Doctor,
    DoctorPatch, NewAppointment, NewDoctor, NewNotification, NewPatient, NewUser, Notification,
    Patient, PatientFilter, PatientPatch, Role, User, WeeklyWindow, WorkingHours,
};
use serde::Serialize;
use uuid::Uuid;

mod memory;
mod postgres;

pub use memory::MemStore;
pub use postgres::{PgStore, connect, migrate};

#[derive(thiserror::Error, Debug)]
pub enum DbError {
    #[error("sqlx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("slot already taken")]
    SlotTaken,

    #[error("duplicate value for {0}")]
    Duplicate(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

#[derive(Debug, Serialize, Clone)]
pub struct RefreshRow {
    pub jti: String,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Everything one appointment write may touch. Applied atomically, and
/// only while the appointment is still `scheduled`.
#[derive(Debug, Clone)]
pub struct AppointmentChange {
    pub reason: Option<String>,
    pub slot: Option<(DateTime<Utc>, DateTime<Utc>)>,
    /// New due time for pending reminders; only read together with `slot`.
    pub reminder_at: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
    pub note: Option<NewNotification>,
    pub now: DateTime<Utc>,
}

impl AppointmentChange {
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            reason: None,
            slot: None,
            reminder_at: None,
            status: None,
            note: None,
            now,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ChangeOutcome {
    Updated {
        appointment: Appointment,
        note: Option<Notification>,
    },
    Missing,
    Terminal(AppointmentStatus),
}

#[async_trait]
pub trait Store: Send + Sync {
    // ==== Users ====
    async fn insert_user(&self, new: NewUser) -> Result<User, DbError>;
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DbError>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError>;
    async fn set_user_password(&self, id: Uuid, password_hash: &str) -> Result<bool, DbError>;
    async fn delete_user(&self, id: Uuid) -> Result<bool, DbError>;
    async fn count_users_by_role(&self) -> Result<Vec<(Role, i64)>, DbError>;

    // ==== Refresh tokens (rotation) ====
    async fn insert_refresh(
        &self,
        user_id: Uuid,
        jti: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
    async fn get_refresh_by_jti(&self, jti: &str) -> Result<Option<RefreshRow>, DbError>;
    async fn revoke_refresh(&self, jti: &str) -> Result<u64, DbError>;

    // ==== Password resets ====
    async fn insert_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError>;
    /// Marks the reset used and returns its user, if it is still valid at `now`.
    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DbError>;

    // ==== Patients ====
    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, DbError>;
    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, DbError>;
    async fn search_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>, DbError>;
    async fn update_patient(&self, id: Uuid, patch: PatientPatch)
        -> Result<Option<Patient>, DbError>;
    async fn delete_patient(&self, id: Uuid) -> Result<bool, DbError>;
    async fn count_patients(&self) -> Result<i64, DbError>;

    // ==== Doctors ====
    async fn insert_doctor(&self, new: NewDoctor) -> Result<Doctor, DbError>;
    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, DbError>;
    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>, DbError>;
    async fn list_doctors(&self, specialty: Option<&str>) -> Result<Vec<Doctor>, DbError>;
    async fn update_doctor(&self, id: Uuid, patch: DoctorPatch) -> Result<Option<Doctor>, DbError>;
    /// Removes the doctor with its working hours and block-offs.
    async fn delete_doctor(&self, id: Uuid) -> Result<bool, DbError>;
    async fn count_doctors(&self) -> Result<i64, DbError>;

    async fn insert_working_hours(
        &self,
        doctor_id: Uuid,
        window: WeeklyWindow,
    ) -> Result<Option<WorkingHours>, DbError>;
    async fn update_working_hours(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        window: WeeklyWindow,
    ) -> Result<Option<WorkingHours>, DbError>;
    async fn delete_working_hours(&self, doctor_id: Uuid, id: Uuid) -> Result<bool, DbError>;
    async fn list_working_hours(&self, doctor_id: Uuid) -> Result<Vec<WorkingHours>, DbError>;

    async fn insert_block_off(
        &self,
        doctor_id: Uuid,
        window: BlockOffWindow,
    ) -> Result<Option<BlockOff>, DbError>;
    async fn update_block_off(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        window: BlockOffWindow,
    ) -> Result<Option<BlockOff>, DbError>;
    async fn delete_block_off(&self, doctor_id: Uuid, id: Uuid) -> Result<bool, DbError>;
    async fn list_block_offs(
        &self,
        doctor_id: Uuid,
        on: Option<NaiveDate>,
    ) -> Result<Vec<BlockOff>, DbError>;

    // ==== Appointments ====
    /// Inserts the appointment and its notifications in one step, or fails
    /// with [`DbError::SlotTaken`] leaving the store untouched.
    async fn insert_appointment(
        &self,
        new: NewAppointment,
        notes: Vec<NewNotification>,
        now: DateTime<Utc>,
    ) -> Result<(Appointment, Vec<Notification>), DbError>;
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DbError>;
    async fn list_appointments(&self, filter: &AppointmentFilter)
        -> Result<Vec<Appointment>, DbError>;
    async fn update_appointment(
        &self,
        id: Uuid,
        change: AppointmentChange,
    ) -> Result<ChangeOutcome, DbError>;
    async fn count_active_appointments(&self) -> Result<i64, DbError>;

    // ==== Notifications ====
    async fn list_notifications(&self, appointment_id: Uuid)
        -> Result<Vec<Notification>, DbError>;
    async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, DbError>;
    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbError>;

    // ==== Maintenance ====
    async fn ping(&self) -> Result<(), DbError>;

    /// Full dump for file backups; `None` when the backend is backed up elsewhere.
    async fn snapshot(&self) -> Result<Option<serde_json::Value>, DbError> {
        Ok(None)
    }
}
