use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Role {
    Patient,
    Doctor,
    Administrator,
}

impl Default for Role {
    fn default() -> Self {
        Role::Patient
    }
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Patient, Role::Doctor, Role::Administrator];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Patient => "Patient",
            Role::Doctor => "Doctor",
            Role::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "administrator" | "admin" => Ok(Role::Administrator),
            other => Err(AppError::BadRequest(format!("unknown role `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub role: Role,
}

// ==== Patients ====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Patient {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub gender: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewPatient {
    pub first_name: String,
    pub last_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub gender: Option<String>,
}

/// Partial update; `None` leaves the column as it is.
#[derive(Debug, Clone, Default)]
pub struct PatientPatch {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub address: Option<String>,
    pub gender: Option<String>,
}

impl Patient {
    pub fn apply(&mut self, patch: PatientPatch, now: DateTime<Utc>) {
        if let Some(v) = patch.first_name {
            self.first_name = v;
        }
        if let Some(v) = patch.last_name {
            self.last_name = v;
        }
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.date_of_birth.is_some() {
            self.date_of_birth = patch.date_of_birth;
        }
        if patch.address.is_some() {
            self.address = patch.address;
        }
        if patch.gender.is_some() {
            self.gender = patch.gender;
        }
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, Default)]
pub struct PatientFilter {
    pub email: Option<String>,
    pub name: Option<String>,
}

impl PatientFilter {
    pub fn matches(&self, p: &Patient) -> bool {
        if let Some(email) = &self.email {
            let same = p
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email));
            if !same {
                return false;
            }
        }
        if let Some(name) = &self.name {
            let needle = name.to_lowercase();
            if !p.first_name.to_lowercase().contains(&needle)
                && !p.last_name.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

// ==== Doctors & schedules ====

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: Uuid,
    pub name: String,
    pub specialty: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    pub years_of_experience: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct NewDoctor {
    pub name: String,
    pub specialty: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    pub years_of_experience: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct DoctorPatch {
    pub name: Option<String>,
    pub specialty: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub qualification: Option<String>,
    pub years_of_experience: Option<i32>,
}

impl Doctor {
    pub fn apply(&mut self, patch: DoctorPatch, now: DateTime<Utc>) {
        if let Some(v) = patch.name {
            self.name = v;
        }
        if let Some(v) = patch.specialty {
            self.specialty = v;
        }
        if patch.email.is_some() {
            self.email = patch.email;
        }
        if patch.phone.is_some() {
            self.phone = patch.phone;
        }
        if patch.qualification.is_some() {
            self.qualification = patch.qualification;
        }
        if patch.years_of_experience.is_some() {
            self.years_of_experience = patch.years_of_experience;
        }
        self.updated_at = now;
    }
}

/// Doctor with its schedule, as returned by the detail endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct DoctorProfile {
    #[serde(flatten)]
    pub doctor: Doctor,
    pub working_hours: Vec<WorkingHours>,
    pub block_offs: Vec<BlockOff>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkingHours {
    pub id: Uuid,
    pub doctor_id: Uuid,
    #[serde(with = "weekday_name")]
    pub weekday: Weekday,
    #[serde(with = "clock")]
    pub start_time: NaiveTime,
    #[serde(with = "clock")]
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeeklyWindow {
    pub weekday: Weekday,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlockOff {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    #[serde(with = "clock")]
    pub start_time: NaiveTime,
    #[serde(with = "clock")]
    pub end_time: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockOffWindow {
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub reason: Option<String>,
}

// ==== Appointments ====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Scheduled)
    }

    /// Only an active appointment may move, and only forward.
    pub fn can_become(self, next: AppointmentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Scheduled, Self::Completed) | (Self::Scheduled, Self::Cancelled)
        )
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "completed" => Ok(Self::Completed),
            "cancelled" | "canceled" => Ok(Self::Cancelled),
            other => Err(AppError::BadRequest(format!("unknown status `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    #[serde(rename = "datetime")]
    pub starts_at: DateTime<Utc>,
    #[serde(rename = "end_time")]
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Appointment {
    pub fn is_active(&self) -> bool {
        self.status == AppointmentStatus::Scheduled
    }

    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.starts_at < end && start < self.ends_at
    }
}

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AppointmentFilter {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
}

impl AppointmentFilter {
    pub fn active_for_doctor(doctor_id: Uuid) -> Self {
        Self {
            doctor_id: Some(doctor_id),
            status: Some(AppointmentStatus::Scheduled),
            ..Self::default()
        }
    }

    pub fn matches(&self, a: &Appointment) -> bool {
        self.doctor_id.map_or(true, |d| d == a.doctor_id)
            && self.patient_id.map_or(true, |p| p == a.patient_id)
            && self.from.map_or(true, |f| a.ends_at > f)
            && self.to.map_or(true, |t| a.starts_at < t)
            && self.status.map_or(true, |s| s == a.status)
    }
}

// ==== Notifications ====

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Confirmation,
    Reminder,
    Cancellation,
}

impl NotificationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Confirmation => "confirmation",
            Self::Reminder => "reminder",
            Self::Cancellation => "cancellation",
        }
    }
}

impl FromStr for NotificationKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmation" => Ok(Self::Confirmation),
            "reminder" => Ok(Self::Reminder),
            "cancellation" => Ok(Self::Cancellation),
            other => Err(AppError::BadRequest(format!("unknown notification `{other}`"))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Cancelled,
}

impl NotificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Cancelled => "cancelled",
        }
    }
}

impl FromStr for NotificationStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "sent" => Ok(Self::Sent),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(AppError::BadRequest(format!("unknown delivery status `{other}`"))),
        }
    }
}

/// Times the client compares arithmetically are Unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub appointment_id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub appointment_time: DateTime<Utc>,
    #[serde(with = "chrono::serde::ts_seconds")]
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub status: NotificationStatus,
    pub scheduled_for: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl NewNotification {
    pub fn sent_now(kind: NotificationKind, now: DateTime<Utc>) -> Self {
        Self {
            kind,
            status: NotificationStatus::Sent,
            scheduled_for: now,
            sent_at: Some(now),
        }
    }

    pub fn pending(kind: NotificationKind, at: DateTime<Utc>) -> Self {
        Self {
            kind,
            status: NotificationStatus::Pending,
            scheduled_for: at,
            sent_at: None,
        }
    }
}

// ==== Wire formats ====

/// `HH:MM` on output; `HH:MM` or `HH:MM:SS` on input.
pub mod clock {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&t.format("%H:%M"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid time `{raw}`")))
    }

    pub fn parse(raw: &str) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(raw, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
            .ok()
    }
}

/// Full English day names; input is case-insensitive and accepts `Mon`.
pub mod weekday_name {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(w: &Weekday, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(name(*w))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Weekday, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<Weekday>()
            .map_err(|_| serde::de::Error::custom(format!("invalid weekday `{raw}`")))
    }

    pub fn name(w: Weekday) -> &'static str {
        match w {
            Weekday::Mon => "Monday",
            Weekday::Tue => "Tuesday",
            Weekday::Wed => "Wednesday",
            Weekday::Thu => "Thursday",
            Weekday::Fri => "Friday",
            Weekday::Sat => "Saturday",
            Weekday::Sun => "Sunday",
        }
    }
}

// ==== Errors ====

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AppError {
    #[error("not found")]
    NotFound,
    #[error("gone")]
    Gone,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("unprocessable: {0}")]
    Unprocessable(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("internal error")]
    Internal,
}

pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn appointment(start_h: u32, end_h: u32) -> Appointment {
        let day = Utc.with_ymd_and_hms(2030, 1, 7, 0, 0, 0).unwrap();
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: Uuid::new_v4(),
            patient_id: Uuid::new_v4(),
            starts_at: day + chrono::Duration::hours(start_h.into()),
            ends_at: day + chrono::Duration::hours(end_h.into()),
            reason: None,
            status: AppointmentStatus::Scheduled,
            created_at: day,
            updated_at: day,
            cancelled_at: None,
        }
    }

    #[test]
    fn role_parses_aliases() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Administrator);
        assert_eq!(" Doctor ".parse::<Role>().unwrap(), Role::Doctor);
        assert!("nurse".parse::<Role>().is_err());
    }

    #[test]
    fn terminal_states_do_not_move() {
        use AppointmentStatus::*;
        assert!(Scheduled.can_become(Cancelled));
        assert!(Scheduled.can_become(Completed));
        assert!(!Cancelled.can_become(Completed));
        assert!(!Completed.can_become(Cancelled));
        assert!(!Scheduled.can_become(Scheduled));
    }

    #[test]
    fn touching_intervals_do_not_overlap() {
        let a = appointment(10, 11);
        let day = a.starts_at - chrono::Duration::hours(10);
        assert!(!a.overlaps(day + chrono::Duration::hours(11), day + chrono::Duration::hours(12)));
        assert!(a.overlaps(
            day + chrono::Duration::minutes(630),
            day + chrono::Duration::hours(12)
        ));
    }

    #[test]
    fn appointment_uses_contract_field_names() {
        let a = appointment(10, 11);
        let v = serde_json::to_value(&a).unwrap();
        assert_eq!(v["datetime"], "2030-01-07T10:00:00Z");
        assert_eq!(v["status"], "scheduled");
    }

    #[test]
    fn working_hours_accept_short_clock_and_day_names() {
        let wh: WorkingHours = serde_json::from_value(serde_json::json!({
            "id": Uuid::nil(),
            "doctor_id": Uuid::nil(),
            "weekday": "monday",
            "start_time": "09:00",
            "end_time": "17:30:00"
        }))
        .unwrap();
        assert_eq!(wh.weekday, Weekday::Mon);
        let v = serde_json::to_value(&wh).unwrap();
        assert_eq!(v["weekday"], "Monday");
        assert_eq!(v["end_time"], "17:30");
    }

    #[test]
    fn patient_filter_matches_either_name() {
        let now = Utc::now();
        let p = Patient {
            id: Uuid::new_v4(),
            first_name: "Ana".into(),
            last_name: "Souza".into(),
            email: Some("Ana@Example.com".into()),
            phone: None,
            date_of_birth: None,
            address: None,
            gender: None,
            created_at: now,
            updated_at: now,
        };
        let by_email = PatientFilter {
            email: Some("ana@example.com".into()),
            name: None,
        };
        let by_name = PatientFilter {
            email: None,
            name: Some("sou".into()),
        };
        assert!(by_email.matches(&p));
        assert!(by_name.matches(&p));
        assert!(!PatientFilter {
            email: Some("bob@example.com".into()),
            name: None
        }
        .matches(&p));
    }

    #[test]
    fn notification_times_are_unix_seconds() {
        let at = Utc.with_ymd_and_hms(2030, 1, 8, 10, 0, 0).unwrap();
        let n = Notification {
            id: Uuid::new_v4(),
            appointment_id: Uuid::new_v4(),
            kind: NotificationKind::Reminder,
            status: NotificationStatus::Pending,
            appointment_time: at,
            scheduled_for: at - chrono::Duration::hours(24),
            sent_at: None,
            created_at: at,
        };
        let v = serde_json::to_value(&n).unwrap();
        assert_eq!(v["type"], "reminder");
        assert_eq!(
            v["appointment_time"].as_i64().unwrap() - v["scheduled_for"].as_i64().unwrap(),
            86_400
        );
    }
}
