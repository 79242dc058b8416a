use super::{AppointmentChange, ChangeOutcome, DbError, RefreshRow, Store};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{
    Appointment, AppointmentFilter, AppointmentStatus, BlockOff, BlockOffWindow, Doctor,
    DoctorPatch, NewAppointment, NewDoctor, NewNotification, NewPatient, NewUser, Notification,
    NotificationKind, NotificationStatus, Patient, PatientFilter, PatientPatch, Role, User,
    WeeklyWindow, WorkingHours,
};
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct ResetRow {
    user_id: Uuid,
    expires_at: DateTime<Utc>,
    used: bool,
}

#[derive(Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    refresh: HashMap<String, RefreshRow>,
    resets: HashMap<String, ResetRow>,
    patients: HashMap<Uuid, Patient>,
    doctors: HashMap<Uuid, Doctor>,
    working_hours: HashMap<Uuid, WorkingHours>,
    block_offs: HashMap<Uuid, BlockOff>,
    appointments: HashMap<Uuid, Appointment>,
    notifications: Vec<Notification>,
}

impl Tables {
    fn slot_taken(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        skip: Option<Uuid>,
    ) -> bool {
        self.appointments.values().any(|a| {
            a.doctor_id == doctor_id
                && a.is_active()
                && Some(a.id) != skip
                && a.overlaps(start, end)
        })
    }

    fn push_note(
        &mut self,
        appointment: &Appointment,
        note: NewNotification,
        now: DateTime<Utc>,
    ) -> Notification {
        let row = Notification {
            id: Uuid::new_v4(),
            appointment_id: appointment.id,
            kind: note.kind,
            status: note.status,
            appointment_time: appointment.starts_at,
            scheduled_for: note.scheduled_for,
            sent_at: note.sent_at,
            created_at: now,
        };
        self.notifications.push(row.clone());
        row
    }
}

/// In-process store. Every operation takes the single table lock, so
/// check-then-write sequences are atomic with respect to each other.
#[derive(Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn sorted_by<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(key);
    rows
}

#[async_trait]
impl Store for MemStore {
    async fn insert_user(&self, new: NewUser) -> Result<User, DbError> {
        let mut t = self.tables.lock().await;
        let email = new.email.to_lowercase();
        if t.users.values().any(|u| u.email == email) {
            return Err(DbError::Duplicate("email".into()));
        }
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash: new.password_hash,
            role: new.role,
            created_at: now,
            updated_at: now,
        };
        t.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> Result<Option<User>, DbError> {
        Ok(self.tables.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let email = email.to_lowercase();
        let t = self.tables.lock().await;
        Ok(t.users.values().find(|u| u.email == email).cloned())
    }

    async fn set_user_password(&self, id: Uuid, password_hash: &str) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        Ok(match t.users.get_mut(&id) {
            Some(u) => {
                u.password_hash = password_hash.to_owned();
                u.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        t.refresh.retain(|_, r| r.user_id != id);
        t.resets.retain(|_, r| r.user_id != id);
        Ok(t.users.remove(&id).is_some())
    }

    async fn count_users_by_role(&self) -> Result<Vec<(Role, i64)>, DbError> {
        let t = self.tables.lock().await;
        Ok(Role::ALL
            .iter()
            .map(|role| {
                let n = t.users.values().filter(|u| u.role == *role).count();
                (*role, n as i64)
            })
            .collect())
    }

    async fn insert_refresh(
        &self,
        user_id: Uuid,
        jti: &str,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut t = self.tables.lock().await;
        if t.refresh.contains_key(jti) {
            return Err(DbError::Duplicate("jti".into()));
        }
        t.refresh.insert(
            jti.to_owned(),
            RefreshRow {
                jti: jti.to_owned(),
                user_id,
                token_hash: token_hash.to_owned(),
                expires_at,
                revoked: false,
                created_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn get_refresh_by_jti(&self, jti: &str) -> Result<Option<RefreshRow>, DbError> {
        Ok(self.tables.lock().await.refresh.get(jti).cloned())
    }

    async fn revoke_refresh(&self, jti: &str) -> Result<u64, DbError> {
        let mut t = self.tables.lock().await;
        Ok(match t.refresh.get_mut(jti) {
            Some(row) if !row.revoked => {
                row.revoked = true;
                1
            }
            _ => 0,
        })
    }

    async fn insert_password_reset(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), DbError> {
        let mut t = self.tables.lock().await;
        t.resets.insert(
            token_hash.to_owned(),
            ResetRow {
                user_id,
                expires_at,
                used: false,
            },
        );
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>, DbError> {
        let mut t = self.tables.lock().await;
        match t.resets.get_mut(token_hash) {
            Some(row) if !row.used && row.expires_at > now => {
                row.used = true;
                Ok(Some(row.user_id))
            }
            _ => Ok(None),
        }
    }

    async fn insert_patient(&self, new: NewPatient) -> Result<Patient, DbError> {
        let now = Utc::now();
        let patient = Patient {
            id: Uuid::new_v4(),
            first_name: new.first_name,
            last_name: new.last_name,
            email: new.email,
            phone: new.phone,
            date_of_birth: new.date_of_birth,
            address: new.address,
            gender: new.gender,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.patients.insert(patient.id, patient.clone());
        Ok(patient)
    }

    async fn get_patient(&self, id: Uuid) -> Result<Option<Patient>, DbError> {
        Ok(self.tables.lock().await.patients.get(&id).cloned())
    }

    async fn search_patients(&self, filter: &PatientFilter) -> Result<Vec<Patient>, DbError> {
        let t = self.tables.lock().await;
        let rows = t.patients.values().filter(|p| filter.matches(p)).cloned().collect();
        Ok(sorted_by(rows, |p: &Patient| p.created_at))
    }

    async fn update_patient(
        &self,
        id: Uuid,
        patch: PatientPatch,
    ) -> Result<Option<Patient>, DbError> {
        let mut t = self.tables.lock().await;
        Ok(t.patients.get_mut(&id).map(|p| {
            p.apply(patch, Utc::now());
            p.clone()
        }))
    }

    async fn delete_patient(&self, id: Uuid) -> Result<bool, DbError> {
        Ok(self.tables.lock().await.patients.remove(&id).is_some())
    }

    async fn count_patients(&self) -> Result<i64, DbError> {
        Ok(self.tables.lock().await.patients.len() as i64)
    }

    async fn insert_doctor(&self, new: NewDoctor) -> Result<Doctor, DbError> {
        let now = Utc::now();
        let doctor = Doctor {
            id: Uuid::new_v4(),
            name: new.name,
            specialty: new.specialty,
            email: new.email,
            phone: new.phone,
            qualification: new.qualification,
            years_of_experience: new.years_of_experience,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.doctors.insert(doctor.id, doctor.clone());
        Ok(doctor)
    }

    async fn get_doctor(&self, id: Uuid) -> Result<Option<Doctor>, DbError> {
        Ok(self.tables.lock().await.doctors.get(&id).cloned())
    }

    async fn find_doctor_by_email(&self, email: &str) -> Result<Option<Doctor>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.doctors
            .values()
            .find(|d| d.email.as_deref().is_some_and(|e| e.eq_ignore_ascii_case(email)))
            .cloned())
    }

    async fn list_doctors(&self, specialty: Option<&str>) -> Result<Vec<Doctor>, DbError> {
        let t = self.tables.lock().await;
        let rows = t
            .doctors
            .values()
            .filter(|d| specialty.map_or(true, |s| d.specialty.eq_ignore_ascii_case(s)))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |d: &Doctor| d.name.clone()))
    }

    async fn update_doctor(&self, id: Uuid, patch: DoctorPatch) -> Result<Option<Doctor>, DbError> {
        let mut t = self.tables.lock().await;
        Ok(t.doctors.get_mut(&id).map(|d| {
            d.apply(patch, Utc::now());
            d.clone()
        }))
    }

    async fn delete_doctor(&self, id: Uuid) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        t.working_hours.retain(|_, w| w.doctor_id != id);
        t.block_offs.retain(|_, b| b.doctor_id != id);
        Ok(t.doctors.remove(&id).is_some())
    }

    async fn count_doctors(&self) -> Result<i64, DbError> {
        Ok(self.tables.lock().await.doctors.len() as i64)
    }

    async fn insert_working_hours(
        &self,
        doctor_id: Uuid,
        window: WeeklyWindow,
    ) -> Result<Option<WorkingHours>, DbError> {
        let mut t = self.tables.lock().await;
        if !t.doctors.contains_key(&doctor_id) {
            return Ok(None);
        }
        let row = WorkingHours {
            id: Uuid::new_v4(),
            doctor_id,
            weekday: window.weekday,
            start_time: window.start_time,
            end_time: window.end_time,
        };
        t.working_hours.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn update_working_hours(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        window: WeeklyWindow,
    ) -> Result<Option<WorkingHours>, DbError> {
        let mut t = self.tables.lock().await;
        Ok(t.working_hours
            .get_mut(&id)
            .filter(|w| w.doctor_id == doctor_id)
            .map(|w| {
                w.weekday = window.weekday;
                w.start_time = window.start_time;
                w.end_time = window.end_time;
                w.clone()
            }))
    }

    async fn delete_working_hours(&self, doctor_id: Uuid, id: Uuid) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        if t.working_hours.get(&id).is_some_and(|w| w.doctor_id == doctor_id) {
            t.working_hours.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_working_hours(&self, doctor_id: Uuid) -> Result<Vec<WorkingHours>, DbError> {
        let t = self.tables.lock().await;
        let rows = t
            .working_hours
            .values()
            .filter(|w| w.doctor_id == doctor_id)
            .cloned()
            .collect();
        Ok(sorted_by(rows, |w: &WorkingHours| {
            (w.weekday.num_days_from_monday(), w.start_time)
        }))
    }

    async fn insert_block_off(
        &self,
        doctor_id: Uuid,
        window: BlockOffWindow,
    ) -> Result<Option<BlockOff>, DbError> {
        let mut t = self.tables.lock().await;
        if !t.doctors.contains_key(&doctor_id) {
            return Ok(None);
        }
        let row = BlockOff {
            id: Uuid::new_v4(),
            doctor_id,
            date: window.date,
            start_time: window.start_time,
            end_time: window.end_time,
            reason: window.reason,
        };
        t.block_offs.insert(row.id, row.clone());
        Ok(Some(row))
    }

    async fn update_block_off(
        &self,
        doctor_id: Uuid,
        id: Uuid,
        window: BlockOffWindow,
    ) -> Result<Option<BlockOff>, DbError> {
        let mut t = self.tables.lock().await;
        Ok(t.block_offs
            .get_mut(&id)
            .filter(|b| b.doctor_id == doctor_id)
            .map(|b| {
                b.date = window.date;
                b.start_time = window.start_time;
                b.end_time = window.end_time;
                b.reason = window.reason;
                b.clone()
            }))
    }

    async fn delete_block_off(&self, doctor_id: Uuid, id: Uuid) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        if t.block_offs.get(&id).is_some_and(|b| b.doctor_id == doctor_id) {
            t.block_offs.remove(&id);
            return Ok(true);
        }
        Ok(false)
    }

    async fn list_block_offs(
        &self,
        doctor_id: Uuid,
        on: Option<NaiveDate>,
    ) -> Result<Vec<BlockOff>, DbError> {
        let t = self.tables.lock().await;
        let rows = t
            .block_offs
            .values()
            .filter(|b| b.doctor_id == doctor_id && on.map_or(true, |d| b.date == d))
            .cloned()
            .collect();
        Ok(sorted_by(rows, |b: &BlockOff| (b.date, b.start_time)))
    }

    async fn insert_appointment(
        &self,
        new: NewAppointment,
        notes: Vec<NewNotification>,
        now: DateTime<Utc>,
    ) -> Result<(Appointment, Vec<Notification>), DbError> {
        let mut t = self.tables.lock().await;
        if t.slot_taken(new.doctor_id, new.starts_at, new.ends_at, None) {
            return Err(DbError::SlotTaken);
        }
        let appointment = Appointment {
            id: Uuid::new_v4(),
            doctor_id: new.doctor_id,
            patient_id: new.patient_id,
            starts_at: new.starts_at,
            ends_at: new.ends_at,
            reason: new.reason,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
            cancelled_at: None,
        };
        t.appointments.insert(appointment.id, appointment.clone());
        let sent = notes
            .into_iter()
            .map(|n| t.push_note(&appointment, n, now))
            .collect();
        Ok((appointment, sent))
    }

    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DbError> {
        Ok(self.tables.lock().await.appointments.get(&id).cloned())
    }

    async fn list_appointments(
        &self,
        filter: &AppointmentFilter,
    ) -> Result<Vec<Appointment>, DbError> {
        let t = self.tables.lock().await;
        let rows = t.appointments.values().filter(|a| filter.matches(a)).cloned().collect();
        Ok(sorted_by(rows, |a: &Appointment| a.starts_at))
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        change: AppointmentChange,
    ) -> Result<ChangeOutcome, DbError> {
        let mut t = self.tables.lock().await;
        let Some(current) = t.appointments.get(&id).cloned() else {
            return Ok(ChangeOutcome::Missing);
        };
        if current.status.is_terminal() {
            return Ok(ChangeOutcome::Terminal(current.status));
        }
        if let Some((start, end)) = change.slot {
            if t.slot_taken(current.doctor_id, start, end, Some(id)) {
                return Err(DbError::SlotTaken);
            }
        }

        let mut next = current;
        if let Some(reason) = change.reason {
            next.reason = Some(reason);
        }
        if let Some((start, end)) = change.slot {
            next.starts_at = start;
            next.ends_at = end;
            for n in t.notifications.iter_mut().filter(|n| {
                n.appointment_id == id && n.status == NotificationStatus::Pending
            }) {
                n.appointment_time = start;
                if n.kind == NotificationKind::Reminder {
                    if let Some(at) = change.reminder_at {
                        n.scheduled_for = at;
                    }
                }
            }
        }
        if let Some(status) = change.status {
            next.status = status;
            if status == AppointmentStatus::Cancelled {
                next.cancelled_at = Some(change.now);
            }
            if status.is_terminal() {
                for n in t.notifications.iter_mut().filter(|n| {
                    n.appointment_id == id && n.status == NotificationStatus::Pending
                }) {
                    n.status = NotificationStatus::Cancelled;
                }
            }
        }
        next.updated_at = change.now;
        t.appointments.insert(id, next.clone());
        let note = change.note.map(|n| t.push_note(&next, n, change.now));
        Ok(ChangeOutcome::Updated {
            appointment: next,
            note,
        })
    }

    async fn count_active_appointments(&self) -> Result<i64, DbError> {
        let t = self.tables.lock().await;
        Ok(t.appointments.values().filter(|a| a.is_active()).count() as i64)
    }

    async fn list_notifications(&self, appointment_id: Uuid) -> Result<Vec<Notification>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.notifications
            .iter()
            .filter(|n| n.appointment_id == appointment_id)
            .cloned()
            .collect())
    }

    async fn due_reminders(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Notification>, DbError> {
        let t = self.tables.lock().await;
        Ok(t.notifications
            .iter()
            .filter(|n| {
                n.kind == NotificationKind::Reminder
                    && n.status == NotificationStatus::Pending
                    && n.scheduled_for <= now
            })
            .take(limit)
            .cloned()
            .collect())
    }

    async fn mark_notification_sent(&self, id: Uuid, at: DateTime<Utc>) -> Result<bool, DbError> {
        let mut t = self.tables.lock().await;
        match t
            .notifications
            .iter_mut()
            .find(|n| n.id == id && n.status == NotificationStatus::Pending)
        {
            Some(n) => {
                n.status = NotificationStatus::Sent;
                n.sent_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn ping(&self) -> Result<(), DbError> {
        Ok(())
    }

    async fn snapshot(&self) -> Result<Option<serde_json::Value>, DbError> {
        let t = self.tables.lock().await;
        // password hashes are skipped by `User`'s serializer; a backup needs them
        let users: Vec<_> = t
            .users
            .values()
            .map(|u| {
                json!({
                    "id": u.id,
                    "email": u.email,
                    "password_hash": u.password_hash,
                    "role": u.role,
                    "created_at": u.created_at,
                    "updated_at": u.updated_at,
                })
            })
            .collect();
        Ok(Some(json!({
            "taken_at": Utc::now(),
            "users": users,
            "patients": t.patients.values().collect::<Vec<_>>(),
            "doctors": t.doctors.values().collect::<Vec<_>>(),
            "working_hours": t.working_hours.values().collect::<Vec<_>>(),
            "block_offs": t.block_offs.values().collect::<Vec<_>>(),
            "appointments": t.appointments.values().collect::<Vec<_>>(),
            "notifications": &t.notifications,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2031, 3, 3, h, m, 0).unwrap()
    }

    fn booking(doctor_id: Uuid, start: DateTime<Utc>) -> NewAppointment {
        NewAppointment {
            doctor_id,
            patient_id: Uuid::new_v4(),
            starts_at: start,
            ends_at: start + Duration::minutes(30),
            reason: None,
        }
    }

    #[tokio::test]
    async fn overlapping_insert_is_rejected() {
        let store = MemStore::new();
        let doc = Uuid::new_v4();
        store.insert_appointment(booking(doc, at(10, 0)), vec![], at(8, 0)).await.unwrap();
        let err = store
            .insert_appointment(booking(doc, at(10, 15)), vec![], at(8, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::SlotTaken));
        // another doctor, same time: fine
        store
            .insert_appointment(booking(Uuid::new_v4(), at(10, 0)), vec![], at(8, 0))
            .await
            .unwrap();
        // back-to-back: fine
        store.insert_appointment(booking(doc, at(10, 30)), vec![], at(8, 0)).await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_inserts_on_one_slot_have_one_winner() {
        let store = Arc::new(MemStore::new());
        let doc = Uuid::new_v4();
        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.insert_appointment(booking(doc, at(9, 0)), vec![], at(8, 0)).await
            }));
        }
        let mut ok = 0;
        for h in handles {
            if h.await.unwrap().is_ok() {
                ok += 1;
            }
        }
        assert_eq!(ok, 1);
    }

    #[tokio::test]
    async fn cancelled_slot_can_be_rebooked_and_reminders_drop() {
        let store = MemStore::new();
        let doc = Uuid::new_v4();
        let (a, notes) = store
            .insert_appointment(
                booking(doc, at(11, 0)),
                vec![NewNotification::pending(
                    NotificationKind::Reminder,
                    at(11, 0) - Duration::hours(24),
                )],
                at(8, 0),
            )
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);

        let mut change = AppointmentChange::at(at(8, 5));
        change.status = Some(AppointmentStatus::Cancelled);
        change.note = Some(NewNotification::sent_now(NotificationKind::Cancellation, at(8, 5)));
        let outcome = store.update_appointment(a.id, change).await.unwrap();
        assert!(matches!(outcome, ChangeOutcome::Updated { note: Some(_), .. }));

        let notes = store.list_notifications(a.id).await.unwrap();
        assert_eq!(notes[0].status, NotificationStatus::Cancelled);
        assert_eq!(notes[1].kind, NotificationKind::Cancellation);

        let again = store.update_appointment(a.id, AppointmentChange::at(at(8, 6))).await.unwrap();
        assert!(matches!(again, ChangeOutcome::Terminal(AppointmentStatus::Cancelled)));

        store.insert_appointment(booking(doc, at(11, 0)), vec![], at(8, 10)).await.unwrap();
    }

    #[tokio::test]
    async fn failed_reschedule_changes_nothing() {
        let store = MemStore::new();
        let doc = Uuid::new_v4();
        let (first, _) = store
            .insert_appointment(booking(doc, at(10, 0)), vec![], at(8, 0))
            .await
            .unwrap();
        store.insert_appointment(booking(doc, at(12, 0)), vec![], at(8, 0)).await.unwrap();

        let mut change = AppointmentChange::at(at(8, 1));
        change.reason = Some("moved".into());
        change.slot = Some((at(12, 0), at(12, 30)));
        assert!(matches!(
            store.update_appointment(first.id, change).await,
            Err(DbError::SlotTaken)
        ));
        let stored = store.get_appointment(first.id).await.unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[tokio::test]
    async fn password_reset_is_single_use() {
        let store = MemStore::new();
        let user = Uuid::new_v4();
        store.insert_password_reset(user, "h", at(12, 0)).await.unwrap();
        assert_eq!(store.consume_password_reset("h", at(13, 0)).await.unwrap(), None);

        store.insert_password_reset(user, "h2", at(12, 0)).await.unwrap();
        assert_eq!(store.consume_password_reset("h2", at(11, 0)).await.unwrap(), Some(user));
        assert_eq!(store.consume_password_reset("h2", at(11, 0)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deleting_doctor_cascades_schedule() {
        let store = MemStore::new();
        let doctor = store
            .insert_doctor(NewDoctor {
                name: "Dr. Lima".into(),
                specialty: "Cardiology".into(),
                ..NewDoctor::default()
            })
            .await
            .unwrap();
        let window = WeeklyWindow {
            weekday: chrono::Weekday::Mon,
            start_time: chrono::NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            end_time: chrono::NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        };
        assert!(store.insert_working_hours(doctor.id, window).await.unwrap().is_some());
        assert!(store.insert_working_hours(Uuid::new_v4(), window).await.unwrap().is_none());
        assert!(store.delete_doctor(doctor.id).await.unwrap());
        assert!(store.list_working_hours(doctor.id).await.unwrap().is_empty());
    }
}
