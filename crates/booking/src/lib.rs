//! Appointment booking: availability, lifecycle and notifications.
//!
//! [`Scheduler`] owns every rule about when a doctor can be booked. It reads
//! schedules through the [`db::Store`] port and relies on the store for the
//! final, atomic slot check, so two racing bookings of one slot resolve to
//! one success and one [`BookingError::Conflict`].

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Offset, SubsecRound, TimeZone, Utc};
use common::{
    Appointment, AppointmentFilter, AppointmentStatus, NewAppointment, NewNotification,
    Notification, NotificationKind,
};
use db::{AppointmentChange, ChangeOutcome, DbError, Store};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

pub mod availability;
pub mod notify;

pub use availability::{Schedule, Unavailable};
pub use notify::{DeliveryError, LogNotifier, Notifier};

#[derive(thiserror::Error, Debug)]
pub enum BookingError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("appointment was cancelled")]
    Gone,
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    Unprocessable(String),
    #[error("store error: {0}")]
    Store(#[from] DbError),
}

impl BookingError {
    fn slot(reason: Unavailable) -> Self {
        match reason {
            Unavailable::Booked => Self::Conflict(reason.describe().into()),
            other => Self::Unprocessable(other.describe().into()),
        }
    }

    fn terminal(status: AppointmentStatus) -> Self {
        match status {
            AppointmentStatus::Cancelled => Self::Gone,
            other => Self::Conflict(format!("appointment is {}", other.as_str())),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BookingPolicy {
    pub slot: Duration,
    /// Longest span one appointment may hold.
    pub max_length: Duration,
    pub reminder_lead: Duration,
    pub offset: FixedOffset,
}

impl Default for BookingPolicy {
    fn default() -> Self {
        Self {
            slot: Duration::minutes(30),
            max_length: Duration::hours(4),
            reminder_lead: Duration::hours(24),
            offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Availability {
    pub doctor_id: Uuid,
    pub datetime: DateTime<Utc>,
    pub available: bool,
    pub reason: Option<Unavailable>,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Amendment {
    pub reason: Option<String>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
    pub status: Option<AppointmentStatus>,
}

#[derive(Debug, Clone)]
pub struct Booked {
    pub appointment: Appointment,
    pub notifications: Vec<Notification>,
}

pub struct Scheduler {
    store: Arc<dyn Store>,
    notifier: Arc<dyn Notifier>,
    policy: BookingPolicy,
}

impl Scheduler {
    pub fn new(store: Arc<dyn Store>, notifier: Arc<dyn Notifier>, policy: BookingPolicy) -> Self {
        Self {
            store,
            notifier,
            policy,
        }
    }

    pub fn policy(&self) -> BookingPolicy {
        self.policy
    }

    async fn schedule_parts(
        &self,
        doctor_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        skip: Option<Uuid>,
    ) -> Result<(Vec<common::WorkingHours>, Vec<common::BlockOff>, Vec<Appointment>), BookingError>
    {
        let hours = self.store.list_working_hours(doctor_id).await?;
        let blocks = self.store.list_block_offs(doctor_id, None).await?;
        let filter = AppointmentFilter {
            from: Some(from),
            to: Some(to),
            ..AppointmentFilter::active_for_doctor(doctor_id)
        };
        let mut booked = self.store.list_appointments(&filter).await?;
        booked.retain(|a| Some(a.id) != skip);
        Ok((hours, blocks, booked))
    }

    async fn verdict(
        &self,
        doctor_id: Uuid,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        skip: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Result<Option<Unavailable>, BookingError> {
        let (hours, blocks, booked) = self.schedule_parts(doctor_id, start, end, skip).await?;
        let schedule = Schedule {
            working_hours: &hours,
            block_offs: &blocks,
            booked: &booked,
        };
        Ok(availability::check(start, end, now, self.policy.offset, &schedule))
    }

    pub async fn availability(
        &self,
        doctor_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<Availability, BookingError> {
        if self.store.get_doctor(doctor_id).await?.is_none() {
            return Err(BookingError::NotFound("doctor"));
        }
        let at = at.trunc_subsecs(0);
        let reason = self
            .verdict(doctor_id, at, at + self.policy.slot, None, Utc::now())
            .await?;
        Ok(Availability {
            doctor_id,
            datetime: at,
            available: reason.is_none(),
            reason,
        })
    }

    pub async fn free_slots(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<DateTime<Utc>>, BookingError> {
        if self.store.get_doctor(doctor_id).await?.is_none() {
            return Err(BookingError::NotFound("doctor"));
        }
        let offset = self.policy.offset;
        let day_start = offset
            .from_local_datetime(&date.and_time(chrono::NaiveTime::MIN))
            .single()
            .map(|d| d.with_timezone(&Utc))
            .ok_or_else(|| BookingError::Unprocessable("invalid date".into()))?;
        let (hours, blocks, booked) = self
            .schedule_parts(doctor_id, day_start, day_start + Duration::days(1), None)
            .await?;
        let schedule = Schedule {
            working_hours: &hours,
            block_offs: &blocks,
            booked: &booked,
        };
        Ok(availability::free_slots(
            date,
            self.policy.slot,
            Utc::now(),
            offset,
            &schedule,
        ))
    }

    pub async fn book(&self, req: BookingRequest) -> Result<Booked, BookingError> {
        let now = Utc::now();
        let start = req.starts_at.trunc_subsecs(0);
        let end = req
            .ends_at
            .map(|e| e.trunc_subsecs(0))
            .unwrap_or(start + self.policy.slot);
        self.check_length(start, end)?;
        if self.store.get_doctor(req.doctor_id).await?.is_none() {
            return Err(BookingError::Unprocessable("unknown doctor".into()));
        }
        if self.store.get_patient(req.patient_id).await?.is_none() {
            return Err(BookingError::Unprocessable("unknown patient".into()));
        }
        if let Some(reason) = self.verdict(req.doctor_id, start, end, None, now).await? {
            warn!(doctor_id = %req.doctor_id, %start, ?reason, "booking refused");
            return Err(BookingError::slot(reason));
        }

        let notes = vec![
            NewNotification::sent_now(NotificationKind::Confirmation, now),
            NewNotification::pending(NotificationKind::Reminder, start - self.policy.reminder_lead),
        ];
        let new = NewAppointment {
            doctor_id: req.doctor_id,
            patient_id: req.patient_id,
            starts_at: start,
            ends_at: end,
            reason: req.reason,
        };
        let inserted = self.store.insert_appointment(new, notes, now).await;
        let (appointment, notifications) = match inserted {
            Ok(done) => done,
            Err(DbError::SlotTaken) => {
                warn!(doctor_id = %req.doctor_id, %start, "slot taken by a concurrent booking");
                return Err(BookingError::slot(Unavailable::Booked));
            }
            Err(e) => return Err(e.into()),
        };

        for n in notifications
            .iter()
            .filter(|n| n.kind == NotificationKind::Confirmation)
        {
            self.deliver(n).await;
        }
        info!(
            appointment_id = %appointment.id,
            doctor_id = %appointment.doctor_id,
            starts_at = %appointment.starts_at,
            "appointment booked"
        );
        Ok(Booked {
            appointment,
            notifications,
        })
    }

    fn check_length(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), BookingError> {
        if end <= start {
            return Err(BookingError::Unprocessable(
                "end time must be after start time".into(),
            ));
        }
        if end - start > self.policy.max_length {
            return Err(BookingError::Unprocessable(format!(
                "appointments last at most {} minutes",
                self.policy.max_length.num_minutes()
            )));
        }
        Ok(())
    }

    /// Visible appointment; cancelled ones are gone.
    pub async fn get(&self, id: Uuid) -> Result<Appointment, BookingError> {
        match self.store.get_appointment(id).await? {
            None => Err(BookingError::NotFound("appointment")),
            Some(a) if a.status == AppointmentStatus::Cancelled => Err(BookingError::Gone),
            Some(a) => Ok(a),
        }
    }

    pub async fn list(&self, filter: &AppointmentFilter) -> Result<Vec<Appointment>, BookingError> {
        Ok(self.store.list_appointments(filter).await?)
    }

    pub async fn amend(&self, id: Uuid, amendment: Amendment) -> Result<Appointment, BookingError> {
        let now = Utc::now();
        let current = self.get(id).await?;
        if current.status.is_terminal() {
            return Err(BookingError::terminal(current.status));
        }

        let mut change = AppointmentChange::at(now);
        change.reason = amendment.reason;

        match amendment.status {
            None | Some(AppointmentStatus::Scheduled) => {}
            Some(AppointmentStatus::Cancelled) => {
                if change.reason.is_some()
                    || amendment.starts_at.is_some()
                    || amendment.ends_at.is_some()
                {
                    return Err(BookingError::Unprocessable(
                        "cancel without other changes".into(),
                    ));
                }
                return self.cancel(id).await;
            }
            Some(AppointmentStatus::Completed) => {
                change.status = Some(AppointmentStatus::Completed)
            }
        }

        if amendment.starts_at.is_some() || amendment.ends_at.is_some() {
            let start = amendment
                .starts_at
                .map(|s| s.trunc_subsecs(0))
                .unwrap_or(current.starts_at);
            let end = match amendment.ends_at {
                Some(e) => e.trunc_subsecs(0),
                None => start + (current.ends_at - current.starts_at),
            };
            self.check_length(start, end)?;
            let verdict = self
                .verdict(current.doctor_id, start, end, Some(id), now)
                .await?;
            if let Some(reason) = verdict {
                warn!(appointment_id = %id, %start, ?reason, "reschedule refused");
                return Err(BookingError::slot(reason));
            }
            change.slot = Some((start, end));
            change.reminder_at = Some(start - self.policy.reminder_lead);
        }

        match self.store.update_appointment(id, change).await {
            Ok(ChangeOutcome::Updated { appointment, .. }) => {
                info!(
                    appointment_id = %id,
                    status = appointment.status.as_str(),
                    "appointment updated"
                );
                Ok(appointment)
            }
            Ok(ChangeOutcome::Missing) => Err(BookingError::NotFound("appointment")),
            Ok(ChangeOutcome::Terminal(status)) => Err(BookingError::terminal(status)),
            Err(DbError::SlotTaken) => Err(BookingError::slot(Unavailable::Booked)),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Appointment, BookingError> {
        let now = Utc::now();
        let mut change = AppointmentChange::at(now);
        change.status = Some(AppointmentStatus::Cancelled);
        change.note = Some(NewNotification::sent_now(NotificationKind::Cancellation, now));

        match self.store.update_appointment(id, change).await? {
            ChangeOutcome::Updated { appointment, note } => {
                if let Some(n) = &note {
                    self.deliver(n).await;
                }
                info!(appointment_id = %id, "appointment cancelled");
                Ok(appointment)
            }
            ChangeOutcome::Missing => Err(BookingError::NotFound("appointment")),
            ChangeOutcome::Terminal(status) => Err(BookingError::terminal(status)),
        }
    }

    /// Notifications of any appointment that ever existed, cancelled included.
    pub async fn notifications(&self, id: Uuid) -> Result<Vec<Notification>, BookingError> {
        if self.store.get_appointment(id).await?.is_none() {
            return Err(BookingError::NotFound("appointment"));
        }
        Ok(self.store.list_notifications(id).await?)
    }

    /// Cancels the doctor's active appointments, then removes the doctor.
    pub async fn retire_doctor(&self, doctor_id: Uuid) -> Result<bool, BookingError> {
        if self.store.get_doctor(doctor_id).await?.is_none() {
            return Ok(false);
        }
        let active = self
            .store
            .list_appointments(&AppointmentFilter::active_for_doctor(doctor_id))
            .await?;
        for a in active {
            match self.cancel(a.id).await {
                Ok(_) | Err(BookingError::Gone) | Err(BookingError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(self.store.delete_doctor(doctor_id).await?)
    }

    pub async fn dispatch_due_reminders(&self, now: DateTime<Utc>) -> Result<usize, BookingError> {
        let due = self.store.due_reminders(now, 100).await?;
        let mut sent = 0;
        for n in due {
            match self.notifier.deliver(&n).await {
                Ok(()) => {
                    if self.store.mark_notification_sent(n.id, now).await? {
                        sent += 1;
                    }
                }
                Err(e) => warn!(notification_id = %n.id, error = %e, "reminder delivery failed"),
            }
        }
        Ok(sent)
    }

    /// Runs forever; spawn it next to the HTTP server.
    pub async fn run_reminders(self: Arc<Self>, every: std::time::Duration) {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            match self.dispatch_due_reminders(Utc::now()).await {
                Ok(0) => {}
                Ok(n) => info!(sent = n, "reminders dispatched"),
                Err(e) => error!(error = %e, "reminder dispatch failed"),
            }
        }
    }

    async fn deliver(&self, n: &Notification) {
        if let Err(e) = self.notifier.deliver(n).await {
            warn!(notification_id = %n.id, error = %e, "notification delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{NewDoctor, NewPatient, NotificationStatus};
    use db::MemStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<NotificationKind>>);

    #[async_trait::async_trait]
    impl Notifier for Recorder {
        async fn deliver(&self, n: &Notification) -> Result<(), DeliveryError> {
            self.0.lock().unwrap().push(n.kind);
            Ok(())
        }
    }

    struct Fixture {
        scheduler: Scheduler,
        recorder: Arc<Recorder>,
        doctor_id: Uuid,
        patient_id: Uuid,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn Store> = Arc::new(MemStore::new());
        let doctor = store
            .insert_doctor(NewDoctor {
                name: "Dr. Costa".into(),
                specialty: "Cardiology".into(),
                ..NewDoctor::default()
            })
            .await
            .unwrap();
        let patient = store
            .insert_patient(NewPatient {
                first_name: "Ana".into(),
                last_name: "Lima".into(),
                ..NewPatient::default()
            })
            .await
            .unwrap();
        let recorder = Arc::new(Recorder::default());
        Fixture {
            scheduler: Scheduler::new(store, recorder.clone(), BookingPolicy::default()),
            recorder,
            doctor_id: doctor.id,
            patient_id: patient.id,
        }
    }

    fn in_days(days: i64, hour: u32) -> DateTime<Utc> {
        let day = (Utc::now() + Duration::days(days)).date_naive();
        Utc.from_utc_datetime(&day.and_hms_opt(hour, 0, 0).unwrap())
    }

    fn request(f: &Fixture, at: DateTime<Utc>) -> BookingRequest {
        BookingRequest {
            doctor_id: f.doctor_id,
            patient_id: f.patient_id,
            starts_at: at,
            ends_at: None,
            reason: Some("Routine checkup".into()),
        }
    }

    #[tokio::test]
    async fn booking_emits_confirmation_and_reminder() {
        let f = fixture().await;
        let at = in_days(2, 10);
        let booked = f.scheduler.book(request(&f, at)).await.unwrap();
        assert_eq!(booked.appointment.starts_at, at);
        assert_eq!(booked.appointment.ends_at, at + Duration::minutes(30));

        let kinds: Vec<_> = booked.notifications.iter().map(|n| n.kind).collect();
        assert_eq!(kinds, [NotificationKind::Confirmation, NotificationKind::Reminder]);
        let reminder = &booked.notifications[1];
        assert_eq!(reminder.scheduled_for, at - Duration::hours(24));
        assert_eq!(reminder.status, NotificationStatus::Pending);
        assert_eq!(*f.recorder.0.lock().unwrap(), [NotificationKind::Confirmation]);
    }

    #[tokio::test]
    async fn double_booking_is_a_conflict() {
        let f = fixture().await;
        let at = in_days(2, 10);
        let first = f.scheduler.book(request(&f, at)).await.unwrap();
        let err = f.scheduler.book(request(&f, at)).await.unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
        assert_eq!(f.scheduler.get(first.appointment.id).await.unwrap(), first.appointment);
    }

    #[tokio::test]
    async fn unknown_parties_and_past_slots_are_unprocessable() {
        let f = fixture().await;
        let mut req = request(&f, in_days(2, 10));
        req.patient_id = Uuid::new_v4();
        assert!(matches!(f.scheduler.book(req).await, Err(BookingError::Unprocessable(_))));

        let past = request(&f, Utc::now() - Duration::hours(1));
        assert!(matches!(f.scheduler.book(past).await, Err(BookingError::Unprocessable(_))));
    }

    #[tokio::test]
    async fn reschedule_moves_reminder_and_frees_old_slot() {
        let f = fixture().await;
        let at = in_days(2, 10);
        let booked = f.scheduler.book(request(&f, at)).await.unwrap();
        let id = booked.appointment.id;

        let moved = f
            .scheduler
            .amend(
                id,
                Amendment {
                    starts_at: Some(at + Duration::hours(1)),
                    ..Amendment::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(moved.starts_at, at + Duration::hours(1));

        let notes = f.scheduler.notifications(id).await.unwrap();
        let reminder = notes.iter().find(|n| n.kind == NotificationKind::Reminder).unwrap();
        assert_eq!(reminder.scheduled_for, moved.starts_at - Duration::hours(24));

        // the old slot is bookable again
        f.scheduler.book(request(&f, at)).await.unwrap();
    }

    #[tokio::test]
    async fn reschedule_onto_taken_slot_changes_nothing() {
        let f = fixture().await;
        let a = f.scheduler.book(request(&f, in_days(2, 10))).await.unwrap().appointment;
        f.scheduler.book(request(&f, in_days(2, 11))).await.unwrap();

        let err = f
            .scheduler
            .amend(
                a.id,
                Amendment {
                    reason: Some("new reason".into()),
                    starts_at: Some(in_days(2, 11)),
                    ..Amendment::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::Conflict(_)));
        assert_eq!(f.scheduler.get(a.id).await.unwrap(), a);
    }

    #[tokio::test]
    async fn cancel_is_terminal_and_notifies_once() {
        let f = fixture().await;
        let a = f.scheduler.book(request(&f, in_days(3, 9))).await.unwrap().appointment;
        f.scheduler.cancel(a.id).await.unwrap();

        assert!(matches!(f.scheduler.get(a.id).await, Err(BookingError::Gone)));
        assert!(matches!(f.scheduler.cancel(a.id).await, Err(BookingError::Gone)));
        assert!(matches!(
            f.scheduler.amend(a.id, Amendment::default()).await,
            Err(BookingError::Gone)
        ));

        let notes = f.scheduler.notifications(a.id).await.unwrap();
        let cancellations = notes
            .iter()
            .filter(|n| n.kind == NotificationKind::Cancellation)
            .count();
        assert_eq!(cancellations, 1);
        let reminder = notes.iter().find(|n| n.kind == NotificationKind::Reminder).unwrap();
        assert_eq!(reminder.status, NotificationStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_refuses_riders() {
        let f = fixture().await;
        let at = in_days(3, 9);
        let a = f.scheduler.book(request(&f, at)).await.unwrap().appointment;
        let with_end = Amendment {
            status: Some(AppointmentStatus::Cancelled),
            ends_at: Some(at + Duration::hours(2)),
            ..Amendment::default()
        };
        assert!(matches!(
            f.scheduler.amend(a.id, with_end).await,
            Err(BookingError::Unprocessable(_))
        ));
        let untouched = f.scheduler.get(a.id).await.unwrap();
        assert_eq!(untouched.status, AppointmentStatus::Scheduled);
        assert_eq!(untouched.ends_at, at + Duration::minutes(30));

        let bare = Amendment {
            status: Some(AppointmentStatus::Cancelled),
            ..Amendment::default()
        };
        let cancelled = f.scheduler.amend(a.id, bare).await.unwrap();
        assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
    }

    #[tokio::test]
    async fn appointment_length_is_capped() {
        let f = fixture().await;
        let at = in_days(4, 9);
        let mut marathon = request(&f, at);
        marathon.ends_at = Some(at + Duration::days(2));
        assert!(matches!(
            f.scheduler.book(marathon).await,
            Err(BookingError::Unprocessable(_))
        ));

        let mut long = request(&f, at);
        long.ends_at = Some(at + Duration::hours(4));
        let a = f.scheduler.book(long).await.unwrap().appointment;

        let stretch = Amendment {
            ends_at: Some(at + Duration::hours(5)),
            ..Amendment::default()
        };
        assert!(matches!(
            f.scheduler.amend(a.id, stretch).await,
            Err(BookingError::Unprocessable(_))
        ));
        assert_eq!(f.scheduler.get(a.id).await.unwrap().ends_at, at + Duration::hours(4));
    }

    #[tokio::test]
    async fn completed_appointments_reject_changes() {
        let f = fixture().await;
        let a = f.scheduler.book(request(&f, in_days(3, 9))).await.unwrap().appointment;
        let done = f
            .scheduler
            .amend(
                a.id,
                Amendment {
                    status: Some(AppointmentStatus::Completed),
                    ..Amendment::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(done.status, AppointmentStatus::Completed);
        assert!(matches!(f.scheduler.cancel(a.id).await, Err(BookingError::Conflict(_))));
    }

    #[tokio::test]
    async fn due_reminders_are_sent_once() {
        let f = fixture().await;
        // reminder lands in the past straight away
        let a = f.scheduler.book(request(&f, Utc::now() + Duration::hours(2))).await.unwrap();
        assert_eq!(f.scheduler.dispatch_due_reminders(Utc::now()).await.unwrap(), 1);
        assert_eq!(f.scheduler.dispatch_due_reminders(Utc::now()).await.unwrap(), 0);
        let notes = f.scheduler.notifications(a.appointment.id).await.unwrap();
        assert!(notes.iter().all(|n| n.status == NotificationStatus::Sent));
    }

    #[tokio::test]
    async fn retiring_a_doctor_cancels_bookings() {
        let f = fixture().await;
        let a = f.scheduler.book(request(&f, in_days(4, 9))).await.unwrap().appointment;
        assert!(f.scheduler.retire_doctor(f.doctor_id).await.unwrap());
        assert!(matches!(f.scheduler.get(a.id).await, Err(BookingError::Gone)));
        assert!(matches!(
            f.scheduler.availability(f.doctor_id, in_days(4, 9)).await,
            Err(BookingError::NotFound("doctor"))
        ));
    }
}
