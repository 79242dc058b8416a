use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc, Weekday};
use common::{
    AppError, AppointmentFilter, AppointmentStatus, BlockOffWindow, DoctorPatch, NewDoctor,
    NewPatient, PatientFilter, PatientPatch, Role, WeeklyWindow,
};
use serde::{Deserialize, Deserializer};
use uuid::Uuid;
use validator::{Validate, ValidationError};

// ==== Users ====

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
    #[validate(custom(function = "known_role"))]
    pub role: Option<String>,
}

impl RegisterInput {
    pub fn role(&self) -> Role {
        self.role
            .as_deref()
            .and_then(|r| r.parse().ok())
            .unwrap_or_default()
    }
}

fn known_role(raw: &str) -> Result<(), ValidationError> {
    raw.parse::<Role>()
        .map(|_| ())
        .map_err(|_| ValidationError::new("role").with_message("unknown role".into()))
}

#[derive(Debug, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetRequestInput {
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ResetConfirmInput {
    pub token: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub new_password: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefreshInput {
    pub refresh_token: Option<String>,
}

// ==== Patients ====

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientIn {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub gender: Option<String>,
}

impl From<PatientIn> for NewPatient {
    fn from(p: PatientIn) -> Self {
        Self {
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            phone: p.phone,
            date_of_birth: p.date_of_birth,
            address: p.address,
            gender: p.gender,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PatientPatchIn {
    #[validate(length(min = 1, max = 100))]
    pub first_name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub last_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub gender: Option<String>,
}

impl From<PatientPatchIn> for PatientPatch {
    fn from(p: PatientPatchIn) -> Self {
        Self {
            first_name: p.first_name,
            last_name: p.last_name,
            email: p.email,
            phone: p.phone,
            date_of_birth: p.date_of_birth,
            address: p.address,
            gender: p.gender,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PatientQuery {
    pub email: Option<String>,
    pub name: Option<String>,
}

impl From<PatientQuery> for PatientFilter {
    fn from(q: PatientQuery) -> Self {
        Self {
            email: q.email,
            name: q.name,
        }
    }
}

// ==== Doctors ====

#[derive(Debug, Deserialize, Validate)]
pub struct DoctorIn {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub specialty: String,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    #[validate(range(min = 0, max = 80))]
    pub years_of_experience: Option<i32>,
}

impl From<DoctorIn> for NewDoctor {
    fn from(d: DoctorIn) -> Self {
        Self {
            name: d.name,
            specialty: d.specialty,
            email: d.email,
            phone: d.phone,
            qualification: d.qualification,
            years_of_experience: d.years_of_experience,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DoctorPatchIn {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub specialty: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    #[validate(range(min = 0, max = 80))]
    pub years_of_experience: Option<i32>,
}

impl From<DoctorPatchIn> for DoctorPatch {
    fn from(d: DoctorPatchIn) -> Self {
        Self {
            name: d.name,
            specialty: d.specialty,
            email: d.email,
            phone: d.phone,
            qualification: d.qualification,
            years_of_experience: d.years_of_experience,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DoctorQuery {
    pub specialty: Option<String>,
}

fn ordered(start: NaiveTime, end: NaiveTime) -> Result<(), ValidationError> {
    if start < end {
        return Ok(());
    }
    Err(ValidationError::new("time_range")
        .with_message("start_time must be before end_time".into()))
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "working_hours_range"))]
pub struct WorkingHoursIn {
    #[serde(with = "common::weekday_name")]
    pub weekday: Weekday,
    #[serde(with = "common::clock")]
    pub start_time: NaiveTime,
    #[serde(with = "common::clock")]
    pub end_time: NaiveTime,
}

fn working_hours_range(w: &WorkingHoursIn) -> Result<(), ValidationError> {
    ordered(w.start_time, w.end_time)
}

impl From<WorkingHoursIn> for WeeklyWindow {
    fn from(w: WorkingHoursIn) -> Self {
        Self {
            weekday: w.weekday,
            start_time: w.start_time,
            end_time: w.end_time,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
#[validate(schema(function = "block_off_range"))]
pub struct BlockOffIn {
    pub date: NaiveDate,
    #[serde(with = "common::clock")]
    pub start_time: NaiveTime,
    #[serde(with = "common::clock")]
    pub end_time: NaiveTime,
    #[validate(length(max = 500))]
    pub reason: Option<String>,
}

fn block_off_range(b: &BlockOffIn) -> Result<(), ValidationError> {
    ordered(b.start_time, b.end_time)
}

impl From<BlockOffIn> for BlockOffWindow {
    fn from(b: BlockOffIn) -> Self {
        Self {
            date: b.date,
            start_time: b.start_time,
            end_time: b.end_time,
            reason: b.reason,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default, deserialize_with = "query_instant")]
    pub datetime: Option<DateTime<Utc>>,
    pub date: Option<NaiveDate>,
}

/// RFC 3339 instant from a query string. An unescaped `+` before the offset
/// arrives decoded as a space, so `10:00:00 03:00` is read as `10:00:00+03:00`.
fn query_instant<'de, D>(de: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(de)? else {
        return Ok(None);
    };
    let parsed = DateTime::parse_from_rfc3339(&raw).or_else(|err| match raw.rsplit_once(' ') {
        Some((head, offset)) if offset.len() == 5 && offset.as_bytes()[2] == b':' => {
            DateTime::parse_from_rfc3339(&format!("{head}+{offset}"))
        }
        _ => Err(err),
    });
    parsed
        .map(|at| Some(at.with_timezone(&Utc)))
        .map_err(serde::de::Error::custom)
}

#[derive(Debug, Default, Deserialize)]
pub struct BlockOffQuery {
    pub date: Option<NaiveDate>,
}

// ==== Appointments ====

/// Clients send the start as `datetime`, `startTime` or `appointment_time`
/// (Unix seconds).
#[derive(Debug, Deserialize, Validate)]
pub struct AppointmentIn {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    #[serde(default, alias = "startTime")]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub appointment_time: Option<i64>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
}

fn from_unix(secs: i64) -> Result<DateTime<Utc>, AppError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or_else(|| AppError::Unprocessable("appointment_time out of range".into()))
}

impl AppointmentIn {
    pub fn starts_at(&self) -> Result<DateTime<Utc>, AppError> {
        match (self.datetime, self.appointment_time) {
            (Some(at), _) => Ok(at),
            (None, Some(secs)) => from_unix(secs),
            (None, None) => Err(AppError::Unprocessable("datetime is required".into())),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct AppointmentPatchIn {
    #[serde(default, alias = "startTime")]
    pub datetime: Option<DateTime<Utc>>,
    #[serde(default, alias = "endTime")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub appointment_time: Option<i64>,
    #[validate(length(max = 1000))]
    pub reason: Option<String>,
    pub status: Option<String>,
}

impl AppointmentPatchIn {
    pub fn starts_at(&self) -> Result<Option<DateTime<Utc>>, AppError> {
        match (self.datetime, self.appointment_time) {
            (Some(at), _) => Ok(Some(at)),
            (None, Some(secs)) => from_unix(secs).map(Some),
            (None, None) => Ok(None),
        }
    }

    pub fn status(&self) -> Result<Option<AppointmentStatus>, AppError> {
        self.status
            .as_deref()
            .map(|s| {
                s.parse()
                    .map_err(|_| AppError::Unprocessable(format!("unknown status `{s}`")))
            })
            .transpose()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AppointmentQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    #[serde(default, deserialize_with = "query_instant")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "query_instant")]
    pub to: Option<DateTime<Utc>>,
    pub status: Option<String>,
}

impl TryFrom<AppointmentQuery> for AppointmentFilter {
    type Error = AppError;

    fn try_from(q: AppointmentQuery) -> Result<Self, Self::Error> {
        Ok(Self {
            doctor_id: q.doctor_id,
            patient_id: q.patient_id,
            from: q.from,
            to: q.to,
            status: q.status.as_deref().map(str::parse).transpose()?,
        })
    }
}
