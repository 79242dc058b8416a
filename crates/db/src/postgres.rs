use super::{AppointmentChange, ChangeOutcome, DbError, RefreshRow, Store};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveTime, Utc, Weekday};
use common::{
    Appointment, AppointmentFilter, AppointmentStatus, BlockOff, BlockOffWindow, Doctor,
    DoctorPatch, NewAppointment, NewDoctor, NewNotification, NewPatient, NewUser, Notification,
    Patient, PatientFilter, PatientPatch, Role, User, WeeklyWindow, WorkingHours,
};
use sqlx::{PgPool, Postgres, Transaction, postgres::PgPoolOptions};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct PgStore(pub PgPool);

pub async fn connect(database_url: &str, max: u32) -> Result<PgStore, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(max)
        .connect(database_url)
        .await?;
    Ok(PgStore(pool))
}

pub async fn migrate(db: &PgStore) -> Result<(), DbError> {
    sqlx::migrate!("./migrations").run(&db.0).await?;
    Ok(())
}

/// Constraint violations carry domain meaning; everything else stays opaque.
fn classify(e: sqlx::Error) -> DbError {
    if let sqlx::Error::Database(db) = &e {
        match db.code().as_deref() {
            Some("23P01") => return DbError::SlotTaken,
            Some("23505") => {
                return match db.constraint() {
                    Some("appointments_active_slot") => DbError::SlotTaken,
                    Some(c) => DbError::Duplicate(c.to_owned()),
                    None => DbError::Duplicate("unique".into()),
                };
            }
            _ => {}
        }
    }
    DbError::Sqlx(e)
}

fn corrupt(e: common::AppError) -> DbError {
    DbError::Corrupt(e.to_string())
}

fn weekday_from_index(i: i16) -> Result<Weekday, DbError> {
    Ok(match i {
        0 => Weekday::Mon,
        1 => Weekday::Tue,
        2 => Weekday::Wed,
        3 => Weekday::Thu,
        4 => Weekday::Fri,
        5 => Weekday::Sat,
        6 => Weekday::Sun,
        other => return Err(DbError::Corrupt(format!("weekday {other}"))),
    })
}

fn weekday_index(w: Weekday) -> i16 {
    w.num_days_from_monday() as i16
}

// ==== Rows ====

#[derive(sqlx::FromRow)]
struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    role: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = DbError;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: r.id,
            email: r.email,
            password_hash: r.password_hash,
            role: r.role.parse().map_err(corrupt)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PatientRow {
    id: Uuid,
    first_name: String,
    last_name: String,
    email: Option<String>,
    phone: Option<String>,
    date_of_birth: Option<NaiveDate>,
    address: Option<String>,
    gender: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PatientRow> for Patient {
    fn from(r: PatientRow) -> Self {
        Patient {
            id: r.id,
            first_name: r.first_name,
            last_name: r.last_name,
            email: r.email,
            phone: r.phone,
            date_of_birth: r.date_of_birth,
            address: r.address,
            gender: r.gender,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct DoctorRow {
    id: Uuid,
    name: String,
    specialty: String,
    email: Option<String>,
    phone: Option<String>,
    qualification: Option<String>,
    years_of_experience: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<DoctorRow> for Doctor {
    fn from(r: DoctorRow) -> Self {
        Doctor {
            id: r.id,
            name: r.name,
            specialty: r.specialty,
            email: r.email,
            phone: r.phone,
            qualification: r.qualification,
            years_of_experience: r.years_of_experience,
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct WorkingHoursRow {
    id: Uuid,
    doctor_id: Uuid,
    weekday: i16,
    start_time: NaiveTime,
    end_time: NaiveTime,
}

impl TryFrom<WorkingHoursRow> for WorkingHours {
    type Error = DbError;

    fn try_from(r: WorkingHoursRow) -> Result<Self, Self::Error> {
        Ok(WorkingHours {
            id: r.id,
            doctor_id: r.doctor_id,
            weekday: weekday_from_index(r.weekday)?,
            start_time: r.start_time,
            end_time: r.end_time,
        })
    }
}

#[derive(sqlx::FromRow)]
struct BlockOffRow {
    id: Uuid,
    doctor_id: Uuid,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    reason: Option<String>,
}

impl From<BlockOffRow> for BlockOff {
    fn from(r: BlockOffRow) -> Self {
        BlockOff {
            id: r.id,
            doctor_id: r.doctor_id,
            date: r.date,
            start_time: r.start_time,
            end_time: r.end_time,
            reason: r.reason,
        }
    }
}

#[derive(sqlx::FromRow)]
struct AppointmentRow {
    id: Uuid,
    doctor_id: Uuid,
    patient_id: Uuid,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
    reason: Option<String>,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(r: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            id: r.id,
            doctor_id: r.doctor_id,
            patient_id: r.patient_id,
            starts_at: r.starts_at,
            ends_at: r.ends_at,
            reason: r.reason,
            status: r.status.parse().map_err(corrupt)?,
            created_at: r.created_at,
            updated_at: r.updated_at,
            cancelled_at: r.cancelled_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct NotificationRow {
    id: Uuid,
    appointment_id: Uuid,
    kind: String,
    status: String,
    appointment_time: DateTime<Utc>,
    scheduled_for: DateTime<Utc>,
    sent_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(r: NotificationRow) -> Result<Self, Self::Error> {
        Ok(Notification {
            id: r.id,
            appointment_id: r.appointment_id,
            kind: r.kind.parse().map_err(corrupt)?,
            status: r.status.parse().map_err(corrupt)?,
            appointment_time: r.appointment_time,
            scheduled_for: r.scheduled_for,
            sent_at: r.sent_at,
            created_at: r.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RefreshDbRow {
    jti: String,
    user_id: Uuid,
    token_hash: String,
    expires_at: DateTime<Utc>,
    revoked: bool,
    created_at: DateTime<Utc>,
}

fn convert_all<R, T>(rows: Vec<R>) -> Result<Vec<T>, DbError>
where
    T: TryFrom<R, Error = DbError>,
{
    rows.into_iter().map(T::try_from).collect()
}

const APPOINTMENT_COLS: &str = "id, doctor_id, patient_id, starts_at, ends_at, reason, status, \
     created_at, updated_at, cancelled_at";
const NOTIFICATION_COLS: &str =
    "id, appointment_id, kind, status, appointment_time, scheduled_for, sent_at, created_at";

async fn insert_note(
    tx: &mut Transaction<'_, Postgres>,
    appointment: &Appointment,
    note: NewNotification,
    now: DateTime<Utc>,
) -> Result<Notification, DbError> {
    let row = sqlx::query_as::<_, NotificationRow>(&format!(
        "INSERT INTO notifications
            (id, appointment_id, kind, status, appointment_time, scheduled_for, sent_at, created_at)
         VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
         RETURNING {NOTIFICATION_COLS}"
    ))
    .bind(Uuid::new_v4())
    .bind(appointment.id)
    .bind(note.kind.as_str())
    .bind(note.status.as_str())
    .bind(appointment.starts_at)
    .bind(note.scheduled_for)
    .bind(note.sent_at)
    .bind(now)
    .fetch_one(&mut **tx)
    .await?;
    row.try_into()
}

#[async_trait]
impl Store for PgStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, DbError> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"INSERT INTO users (id, email, password_hash, role)
               VALUES ($1, lower($2), $3, $4)
               RETURNING id, email, password_hash, role, created_at, updated_at"#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.email)
        .bind(&new.password_hash)
        .bind(new.role.as_str())
        .fetch_one(&self.0)
        .await
        .map_err(classify)?;
        row.try_into()
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DbError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.0)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE email = lower($1)")
            .bind(email)
            .fetch_optional(&self.0)
            .await?
            .map(User::try_from)
            .transpose()
    }

    async fn set_user_password(&self, id: Uuid, password_hash: &str) -> Result<bool, DbError> {
        let res = sqlx::query("UPDATE users SET password_hash=$2, updated_at=NOW() WHERE id=$1")
            .bind(id)
            .bind(password_hash)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM users WHERE id=$1")
            .bind(id)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_users_by_role(&self) -> Result<Vec<(Role, i64)>, DbError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT role, COUNT(*) FROM users GROUP BY role")
                .fetch_all(&self.0)
                .await?;
        Role::ALL
            .iter()
            .map(|role| {
                let n = rows
                    .iter()
                    .find(|(r, _)| r == role.as_str())
                    .map_or(0, |(_, n)| *n);
                Ok((*role, n))
            })
            .collect()
    }

    async fn insert_refresh(
        &self,
        user_id: Uuid,
        jti: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        tracing::debug!(%user_id, jti, %expires_at, "insert refresh");
        sqlx::query(
            r#"INSERT INTO refresh_tokens (user_id, jti, token_hash, expires_at)
               VALUES ($1, $2, $3, $4)"#,
        )
        .bind(user_id)
        .bind(jti)
        .bind(token_hash)
        .bind(expires_at)
        .execute(&self.0)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn get_refresh_by_jti(&self, jti: &str) -> Result<Option<RefreshRow>, DbError> {
        let row = sqlx::query_as::<_, RefreshDbRow>(
            "SELECT jti, user_id, token_hash, expires_at, revoked, created_at
             FROM refresh_tokens WHERE jti=$1",
        )
        .bind(jti)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(|r| RefreshRow {
            jti: r.jti,
            user_id: r.user_id,
            token_hash: r.token_hash,
            expires_at: r.expires_at,
            revoked: r.revoked,
            created_at: r.created_at,
        }))
    }

    async fn revoke_refresh(&self, jti: &str) -> Result<u64, DbError> {
        let res = sqlx::query("UPDATE refresh_tokens SET revoked=true WHERE jti=$1 AND NOT revoked")
            .bind(jti)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected())
    }

    async fn insert_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "INSERT INTO password_resets (token_hash, user_id, expires_at) VALUES ($1, $2, $3)",
        )
        .bind(token_hash)
        .bind(user_id)
        .bind(expires_at)
        .execute(&self.0)
        .await
        .map_err(classify)?;
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DbError> {
        let user = sqlx::query_scalar::<_, Uuid>(
            r#"UPDATE password_resets SET used = true
               WHERE token_hash = $1 AND NOT used AND expires_at > $2
               RETURNING user_id"#,
        )
        .bind(token_hash)
        .bind(now)
        .fetch_optional(&self.0)
        .await?;
        Ok(user)
    }

    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, DbError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"INSERT INTO patients
                (id, first_name, last_name, email, phone, date_of_birth, address, gender)
               VALUES ($1,$2,$3,$4,$5,$6,$7,$8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.first_name)
        .bind(&new.last_name)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(new.date_of_birth)
        .bind(&new.address)
        .bind(&new.gender)
        .fetch_one(&self.0)
        .await
        .map_err(classify)?;
        Ok(row.into())
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, DbError> {
        let row = sqlx::query_as::<_, PatientRow>("SELECT * FROM patients WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.0)
            .await?;
        Ok(row.map(Patient::from))
    }

    async fn search_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>, DbError> {
        let rows = sqlx::query_as::<_, PatientRow>(
            r#"SELECT * FROM patients
               WHERE ($1::text IS NULL OR lower(email) = lower($1))
                 AND ($2::text IS NULL
                      OR first_name ILIKE '%' || $2 || '%'
                      OR last_name ILIKE '%' || $2 || '%')
               ORDER BY created_at"#,
        )
        .bind(&filter.email)
        .bind(&filter.name)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(Patient::from).collect())
    }

    async fn update_patient(
        &self,
        id: Uuid,
        patch: PatientPatch,
    ) -> Result<Option<Patient>, DbError> {
        let row = sqlx::query_as::<_, PatientRow>(
            r#"UPDATE patients SET
                first_name = COALESCE($2, first_name),
                last_name = COALESCE($3, last_name),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                date_of_birth = COALESCE($6, date_of_birth),
                address = COALESCE($7, address),
                gender = COALESCE($8, gender),
                updated_at = NOW()
               WHERE id=$1
               RETURNING *"#,
        )
        .bind(id)
        .bind(patch.first_name)
        .bind(patch.last_name)
        .bind(patch.email)
        .bind(patch.phone)
        .bind(patch.date_of_birth)
        .bind(patch.address)
        .bind(patch.gender)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(Patient::from))
    }

    async fn delete_patient(&self, id: Uuid) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM patients WHERE id=$1")
            .bind(id)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_patients(&self) -> Result<i64, DbError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM patients")
            .fetch_one(&self.0)
            .await?)
    }

    async fn insert_doctor(&self, new: NewDoctor) -> Result<Doctor, DbError> {
        let row = sqlx::query_as::<_, DoctorRow>(
            r#"INSERT INTO doctors
                (id, name, specialty, email, phone, qualification, years_of_experience)
               VALUES ($1,$2,$3,$4,$5,$6,$7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(&new.name)
        .bind(&new.specialty)
        .bind(&new.email)
        .bind(&new.phone)
        .bind(&new.qualification)
        .bind(new.years_of_experience)
        .fetch_one(&self.0)
        .await
        .map_err(classify)?;
        Ok(row.into())
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, DbError> {
        let row = sqlx::query_as::<_, DoctorRow>("SELECT * FROM doctors WHERE id=$1")
            .bind(id)
            .fetch_optional(&self.0)
            .await?;
        Ok(row.map(Doctor::from))
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>, DbError> {
        let row = sqlx::query_as::<_, DoctorRow>(
            "SELECT * FROM doctors WHERE lower(email) = lower($1) LIMIT 1",
        )
        .bind(email)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(Doctor::from))
    }

    async fn list_doctors(&self, specialty: Option<&str>) -> Result<Vec<Doctor>, DbError> {
        let rows = sqlx::query_as::<_, DoctorRow>(
            r#"SELECT * FROM doctors
               WHERE ($1::text IS NULL OR lower(specialty) = lower($1))
               ORDER BY name"#,
        )
        .bind(specialty)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(Doctor::from).collect())
    }

    async fn update_doctor(&self, id: Uuid, patch: DoctorPatch) -> Result<Option<Doctor>, DbError> {
        let row = sqlx::query_as::<_, DoctorRow>(
            r#"UPDATE doctors SET
                name = COALESCE($2, name),
                specialty = COALESCE($3, specialty),
                email = COALESCE($4, email),
                phone = COALESCE($5, phone),
                qualification = COALESCE($6, qualification),
                years_of_experience = COALESCE($7, years_of_experience),
                updated_at = NOW()
               WHERE id=$1
               RETURNING *"#,
        )
        .bind(id)
        .bind(patch.name)
        .bind(patch.specialty)
        .bind(patch.email)
        .bind(patch.phone)
        .bind(patch.qualification)
        .bind(patch.years_of_experience)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(Doctor::from))
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool, DbError> {
        // working_hours and block_offs cascade
        let res = sqlx::query("DELETE FROM doctors WHERE id=$1")
            .bind(id)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn count_doctors(&self) -> Result<i64, DbError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM doctors")
            .fetch_one(&self.0)
            .await?)
    }

    async fn insert_working_hours(
        &self,
        doctor_id: Uuid,
        window: WeeklyWindow,
    ) -> Result<Option<WorkingHours>, DbError> {
        let row = sqlx::query_as::<_, WorkingHoursRow>(
            r#"INSERT INTO working_hours (id, doctor_id, weekday, start_time, end_time)
               SELECT $1, id, $3, $4, $5 FROM doctors WHERE id = $2
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(weekday_index(window.weekday))
        .bind(window.start_time)
        .bind(window.end_time)
        .fetch_optional(&self.0)
        .await?;
        row.map(WorkingHours::try_from).transpose()
    }

    async fn update_working_hours(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        window: WeeklyWindow,
    ) -> Result<Option<WorkingHours>, DbError> {
        let row = sqlx::query_as::<_, WorkingHoursRow>(
            r#"UPDATE working_hours SET weekday=$3, start_time=$4, end_time=$5
               WHERE id=$1 AND doctor_id=$2
               RETURNING *"#,
        )
        .bind(id)
        .bind(doctor_id)
        .bind(weekday_index(window.weekday))
        .bind(window.start_time)
        .bind(window.end_time)
        .fetch_optional(&self.0)
        .await?;
        row.map(WorkingHours::try_from).transpose()
    }

    async fn delete_working_hours(&self, doctor_id: Uuid, id: Uuid) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM working_hours WHERE id=$1 AND doctor_id=$2")
            .bind(id)
            .bind(doctor_id)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_working_hours(&self, doctor_id: Uuid) -> Result<Vec<WorkingHours>, DbError> {
        let rows = sqlx::query_as::<_, WorkingHoursRow>(
            "SELECT * FROM working_hours WHERE doctor_id=$1 ORDER BY weekday, start_time",
        )
        .bind(doctor_id)
        .fetch_all(&self.0)
        .await?;
        convert_all(rows)
    }

    async fn insert_block_off(
        &self,
        doctor_id: Uuid,
        window: BlockOffWindow,
    ) -> Result<Option<BlockOff>, DbError> {
        let row = sqlx::query_as::<_, BlockOffRow>(
            r#"INSERT INTO block_offs (id, doctor_id, date, start_time, end_time, reason)
               SELECT $1, id, $3, $4, $5, $6 FROM doctors WHERE id = $2
               RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(doctor_id)
        .bind(window.date)
        .bind(window.start_time)
        .bind(window.end_time)
        .bind(window.reason)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(BlockOff::from))
    }

    async fn update_block_off(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        window: BlockOffWindow,
    ) -> Result<Option<BlockOff>, DbError> {
        let row = sqlx::query_as::<_, BlockOffRow>(
            r#"UPDATE block_offs SET date=$3, start_time=$4, end_time=$5, reason=$6
               WHERE id=$1 AND doctor_id=$2
               RETURNING *"#,
        )
        .bind(id)
        .bind(doctor_id)
        .bind(window.date)
        .bind(window.start_time)
        .bind(window.end_time)
        .bind(window.reason)
        .fetch_optional(&self.0)
        .await?;
        Ok(row.map(BlockOff::from))
    }

    async fn delete_block_off(&self, doctor_id: Uuid, id: Uuid) -> Result<bool, DbError> {
        let res = sqlx::query("DELETE FROM block_offs WHERE id=$1 AND doctor_id=$2")
            .bind(id)
            .bind(doctor_id)
            .execute(&self.0)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list_block_offs(
        &self,
        doctor_id: Uuid,
        on: Option<NaiveDate>,
    ) -> Result<Vec<BlockOff>, DbError> {
        let rows = sqlx::query_as::<_, BlockOffRow>(
            r#"SELECT * FROM block_offs
               WHERE doctor_id=$1 AND ($2::date IS NULL OR date = $2)
               ORDER BY date, start_time"#,
        )
        .bind(doctor_id)
        .bind(on)
        .fetch_all(&self.0)
        .await?;
        Ok(rows.into_iter().map(BlockOff::from).collect())
    }

    async fn insert_appointment(
        &self,
        new: NewAppointment,
        notes: Vec<NewNotification>,
        now: DateTime<Utc>,
    ) -> Result<(Appointment, Vec<Notification>), DbError> {
        let mut tx = self.0.begin().await?;
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "INSERT INTO appointments
                (id, doctor_id, patient_id, starts_at, ends_at, reason, status,
                 created_at, updated_at)
             VALUES ($1,$2,$3,$4,$5,$6,'scheduled',$7,$7)
             RETURNING {APPOINTMENT_COLS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.doctor_id)
        .bind(new.patient_id)
        .bind(new.starts_at)
        .bind(new.ends_at)
        .bind(&new.reason)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;
        let appointment = Appointment::try_from(row)?;

        let mut sent = Vec::with_capacity(notes.len());
        for note in notes {
            sent.push(insert_note(&mut tx, &appointment, note, now).await?);
        }
        tx.commit().await?;
        Ok((appointment, sent))
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DbError> {
        sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLS} FROM appointments WHERE id=$1"
        ))
        .bind(id)
        .fetch_optional(&self.0)
        .await?
        .map(Appointment::try_from)
        .transpose()
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, DbError> {
        let rows = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLS} FROM appointments
             WHERE ($1::uuid IS NULL OR doctor_id = $1)
               AND ($2::uuid IS NULL OR patient_id = $2)
               AND ($3::timestamptz IS NULL OR ends_at > $3)
               AND ($4::timestamptz IS NULL OR starts_at < $4)
               AND ($5::text IS NULL OR status = $5)
             ORDER BY starts_at"
        ))
        .bind(filter.doctor_id)
        .bind(filter.patient_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.status.map(AppointmentStatus::as_str))
        .fetch_all(&self.0)
        .await?;
        convert_all(rows)
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        change: AppointmentChange,
    ) -> Result<ChangeOutcome, DbError> {
        let mut tx = self.0.begin().await?;
        let current = sqlx::query_as::<_, AppointmentRow>(&format!(
            "SELECT {APPOINTMENT_COLS} FROM appointments WHERE id=$1 FOR UPDATE"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some(current) = current.map(Appointment::try_from).transpose()? else {
            return Ok(ChangeOutcome::Missing);
        };
        if current.status.is_terminal() {
            return Ok(ChangeOutcome::Terminal(current.status));
        }

        let (start, end) = change.slot.unzip();
        let row = sqlx::query_as::<_, AppointmentRow>(&format!(
            "UPDATE appointments SET
                reason = COALESCE($2::text, reason),
                starts_at = COALESCE($3::timestamptz, starts_at),
                ends_at = COALESCE($4::timestamptz, ends_at),
                status = COALESCE($5::text, status),
                cancelled_at = CASE WHEN $5::text = 'cancelled' THEN $6 ELSE cancelled_at END,
                updated_at = $6
             WHERE id=$1
             RETURNING {APPOINTMENT_COLS}"
        ))
        .bind(id)
        .bind(&change.reason)
        .bind(start)
        .bind(end)
        .bind(change.status.map(AppointmentStatus::as_str))
        .bind(change.now)
        .fetch_one(&mut *tx)
        .await
        .map_err(classify)?;
        let appointment = Appointment::try_from(row)?;

        if let Some(start) = start {
            sqlx::query(
                r#"UPDATE notifications SET
                    appointment_time = $2,
                    scheduled_for = CASE WHEN kind = 'reminder'
                        THEN COALESCE($3::timestamptz, scheduled_for)
                        ELSE scheduled_for END
                   WHERE appointment_id=$1 AND status='pending'"#,
            )
            .bind(id)
            .bind(start)
            .bind(change.reminder_at)
            .execute(&mut *tx)
            .await?;
        }
        if change.status.is_some_and(AppointmentStatus::is_terminal) {
            sqlx::query(
                "UPDATE notifications SET status='cancelled'
                 WHERE appointment_id=$1 AND status='pending'",
            )
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        let note = match change.note {
            Some(n) => Some(insert_note(&mut tx, &appointment, n, change.now).await?),
            None => None,
        };
        tx.commit().await?;
        Ok(ChangeOutcome::Updated { appointment, note })
    }

    async fn count_active_appointments(&self) -> Result<i64, DbError> {
        Ok(sqlx::query_scalar("SELECT COUNT(*) FROM appointments WHERE status='scheduled'")
            .fetch_one(&self.0)
            .await?)
    }

    async fn list_notifications(&self, appointment_id: Uuid) -> Result<Vec<Notification>, DbError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications
             WHERE appointment_id=$1 ORDER BY created_at, kind"
        ))
        .bind(appointment_id)
        .fetch_all(&self.0)
        .await?;
        convert_all(rows)
    }

    async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, DbError> {
        let rows = sqlx::query_as::<_, NotificationRow>(&format!(
            "SELECT {NOTIFICATION_COLS} FROM notifications
             WHERE kind='reminder' AND status='pending' AND scheduled_for <= $1
             ORDER BY scheduled_for LIMIT $2"
        ))
        .bind(now)
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.0)
        .await?;
        convert_all(rows)
    }

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbError> {
        let res = sqlx::query(
            "UPDATE notifications SET status='sent', sent_at=$2 WHERE id=$1 AND status='pending'",
        )
        .bind(id)
        .bind(at)
        .execute(&self.0)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn ping(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1").execute(&self.0).await?;
        Ok(())
    }
}
