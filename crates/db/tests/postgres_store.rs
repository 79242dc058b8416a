//! Runs against a real Postgres when `TEST_DATABASE_URL` is set; skipped otherwise.

use chrono::{Duration, DurationRound, Utc};
use common::{
    AppointmentStatus, NewAppointment, NewDoctor, NewNotification, NewPatient, NotificationKind,
};
use db::{AppointmentChange, ChangeOutcome, DbError, PgStore, Store};

async fn store() -> Option<PgStore> {
    let _ = dotenvy::dotenv();
    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let store = db::connect(&url, 5).await.expect("connect");
    db::migrate(&store).await.expect("migrate");
    Some(store)
}

async fn doctor_and_patient(store: &PgStore) -> (uuid::Uuid, uuid::Uuid) {
    let doctor = store
        .insert_doctor(NewDoctor {
            name: "Dr. Postgres".into(),
            specialty: "Integration".into(),
            ..NewDoctor::default()
        })
        .await
        .unwrap();
    let patient = store
        .insert_patient(NewPatient {
            first_name: "Pg".into(),
            last_name: "Patient".into(),
            ..NewPatient::default()
        })
        .await
        .unwrap();
    (doctor.id, patient.id)
}

#[tokio::test]
async fn overlapping_appointments_are_refused() {
    let Some(store) = store().await else {
        eprintln!("TEST_DATABASE_URL not set; skipping");
        return;
    };
    let (doctor_id, patient_id) = doctor_and_patient(&store).await;
    let now = Utc::now();
    let start = (now + Duration::days(30)).duration_trunc(Duration::hours(1)).unwrap();
    let booking = |offset: i64| NewAppointment {
        doctor_id,
        patient_id,
        starts_at: start + Duration::minutes(offset),
        ends_at: start + Duration::minutes(offset + 30),
        reason: None,
    };

    let (first, notes) = store
        .insert_appointment(
            booking(0),
            vec![NewNotification::sent_now(NotificationKind::Confirmation, now)],
            now,
        )
        .await
        .unwrap();
    assert_eq!(notes.len(), 1);

    // same start and a half-overlapping window both lose
    for offset in [0, 15] {
        let err = store.insert_appointment(booking(offset), vec![], now).await;
        assert!(matches!(err, Err(DbError::SlotTaken)), "offset {offset}: {err:?}");
    }
    // back to back is fine
    store.insert_appointment(booking(30), vec![], now).await.unwrap();

    let change = AppointmentChange {
        status: Some(AppointmentStatus::Cancelled),
        ..AppointmentChange::at(now)
    };
    let outcome = store.update_appointment(first.id, change).await.unwrap();
    assert!(matches!(outcome, ChangeOutcome::Updated { .. }));
    store.insert_appointment(booking(0), vec![], now).await.unwrap();

    assert!(store.delete_doctor(doctor_id).await.unwrap());
}
