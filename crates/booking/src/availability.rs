//! Pure slot arithmetic. Nothing here touches storage; callers load a
//! doctor's schedule and ask whether a candidate interval fits it.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use common::{Appointment, BlockOff, WorkingHours};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Unavailable {
    InPast,
    OutsideWorkingHours,
    Blocked,
    Booked,
}

impl Unavailable {
    pub fn describe(self) -> &'static str {
        match self {
            Self::InPast => "the requested time is in the past",
            Self::OutsideWorkingHours => "the doctor does not work at the requested time",
            Self::Blocked => "the doctor has blocked off the requested time",
            Self::Booked => "the doctor already has an appointment at the requested time",
        }
    }
}

/// Everything the rules need about one doctor.
#[derive(Debug, Clone, Copy)]
pub struct Schedule<'a> {
    pub working_hours: &'a [WorkingHours],
    pub block_offs: &'a [BlockOff],
    /// Active appointments that may collide; the caller filters out the
    /// appointment being moved.
    pub booked: &'a [Appointment],
}

/// Day used to enumerate slots when a doctor has no working hours.
pub fn open_day() -> (NaiveTime, NaiveTime) {
    let at = |h| NaiveTime::from_hms_opt(h, 0, 0).unwrap_or(NaiveTime::MIN);
    (at(8), at(18))
}

/// First failed rule for `[start, end)`, or `None` when the slot is free.
pub fn check(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    now: DateTime<Utc>,
    offset: FixedOffset,
    schedule: &Schedule<'_>,
) -> Option<Unavailable> {
    if start < now {
        return Some(Unavailable::InPast);
    }
    let local_start = start.with_timezone(&offset).naive_local();
    let local_end = end.with_timezone(&offset).naive_local();

    if !schedule.working_hours.is_empty() {
        let covered = schedule.working_hours.iter().any(|w| {
            let day = local_start.date();
            w.weekday == local_start.weekday()
                && day.and_time(w.start_time) <= local_start
                && local_end <= day.and_time(w.end_time)
        });
        if !covered {
            return Some(Unavailable::OutsideWorkingHours);
        }
    }

    let blocked = schedule.block_offs.iter().any(|b| {
        b.date.and_time(b.start_time) < local_end && local_start < b.date.and_time(b.end_time)
    });
    if blocked {
        return Some(Unavailable::Blocked);
    }

    if schedule.booked.iter().any(|a| a.is_active() && a.overlaps(start, end)) {
        return Some(Unavailable::Booked);
    }
    None
}

/// Slot-aligned free start times on `date` (clinic local), in UTC.
pub fn free_slots(
    date: NaiveDate,
    slot: Duration,
    now: DateTime<Utc>,
    offset: FixedOffset,
    schedule: &Schedule<'_>,
) -> Vec<DateTime<Utc>> {
    let windows: Vec<(NaiveTime, NaiveTime)> = if schedule.working_hours.is_empty() {
        vec![open_day()]
    } else {
        schedule
            .working_hours
            .iter()
            .filter(|w| w.weekday == date.weekday())
            .map(|w| (w.start_time, w.end_time))
            .collect()
    };

    let mut out = Vec::new();
    if slot <= Duration::zero() {
        return out;
    }
    for (open, close) in windows {
        let mut cursor = date.and_time(open);
        let close = date.and_time(close);
        while cursor + slot <= close {
            if let Some(local) = offset.from_local_datetime(&cursor).single() {
                let start = local.with_timezone(&Utc);
                if check(start, start + slot, now, offset, schedule).is_none() {
                    out.push(start);
                }
            }
            cursor += slot;
        }
    }
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Weekday;
    use common::AppointmentStatus;
    use uuid::Uuid;

    // 2031-03-03 is a Monday
    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2031, 3, 3, h, m, 0).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn monday_nine_to_five(doctor_id: Uuid) -> WorkingHours {
        WorkingHours {
            id: Uuid::new_v4(),
            doctor_id,
            weekday: Weekday::Mon,
            start_time: hm(9, 0),
            end_time: hm(17, 0),
        }
    }

    fn lunch(doctor_id: Uuid) -> BlockOff {
        BlockOff {
            id: Uuid::new_v4(),
            doctor_id,
            date: NaiveDate::from_ymd_opt(2031, 3, 3).unwrap(),
            start_time: hm(12, 0),
            end_time: hm(13, 0),
            reason: Some("Lunch break".into()),
        }
    }

    fn booked(doctor_id: Uuid, start: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id: Uuid::new_v4(),
            starts_at: start,
            ends_at: start + Duration::minutes(30),
            reason: None,
            status: AppointmentStatus::Scheduled,
            created_at: start,
            updated_at: start,
            cancelled_at: None,
        }
    }

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    #[test]
    fn open_schedule_accepts_any_future_time() {
        let schedule = Schedule {
            working_hours: &[],
            block_offs: &[],
            booked: &[],
        };
        let now = at(0, 0);
        assert_eq!(check(at(3, 0), at(3, 30), now, utc(), &schedule), None);
        assert_eq!(
            check(at(3, 0), at(3, 30), at(4, 0), utc(), &schedule),
            Some(Unavailable::InPast)
        );
    }

    #[test]
    fn rules_apply_in_order() {
        let doc = Uuid::new_v4();
        let hours = [monday_nine_to_five(doc)];
        let blocks = [lunch(doc)];
        let taken = [booked(doc, at(10, 0))];
        let schedule = Schedule {
            working_hours: &hours,
            block_offs: &blocks,
            booked: &taken,
        };
        let now = at(0, 0);
        let half = Duration::minutes(30);
        let verdict = |s: DateTime<Utc>| check(s, s + half, now, utc(), &schedule);

        assert_eq!(verdict(at(8, 30)), Some(Unavailable::OutsideWorkingHours));
        assert_eq!(verdict(at(16, 45)), Some(Unavailable::OutsideWorkingHours));
        assert_eq!(verdict(at(11, 45)), Some(Unavailable::Blocked));
        assert_eq!(verdict(at(10, 15)), Some(Unavailable::Booked));
        assert_eq!(verdict(at(10, 30)), None);
        assert_eq!(verdict(at(16, 30)), None);
        // Tuesday
        assert_eq!(
            verdict(at(10, 30) + Duration::days(1)),
            Some(Unavailable::OutsideWorkingHours)
        );
    }

    #[test]
    fn cancelled_appointments_do_not_block() {
        let doc = Uuid::new_v4();
        let mut gone = booked(doc, at(10, 0));
        gone.status = AppointmentStatus::Cancelled;
        let taken = [gone];
        let schedule = Schedule {
            working_hours: &[],
            block_offs: &[],
            booked: &taken,
        };
        assert_eq!(
            check(at(10, 0), at(10, 30), at(0, 0), utc(), &schedule),
            None
        );
    }

    #[test]
    fn offset_shifts_working_hours() {
        let doc = Uuid::new_v4();
        let hours = [monday_nine_to_five(doc)];
        let schedule = Schedule {
            working_hours: &hours,
            block_offs: &[],
            booked: &[],
        };
        // UTC-3: 12:00Z is 09:00 local
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();
        assert_eq!(check(at(12, 0), at(12, 30), at(0, 0), brt, &schedule), None);
        assert_eq!(
            check(at(9, 0), at(9, 30), at(0, 0), brt, &schedule),
            Some(Unavailable::OutsideWorkingHours)
        );
    }

    #[test]
    fn free_slots_skip_lunch_and_bookings() {
        let doc = Uuid::new_v4();
        let hours = [monday_nine_to_five(doc)];
        let blocks = [lunch(doc)];
        let taken = [booked(doc, at(9, 30))];
        let schedule = Schedule {
            working_hours: &hours,
            block_offs: &blocks,
            booked: &taken,
        };
        let date = NaiveDate::from_ymd_opt(2031, 3, 3).unwrap();
        let slots = free_slots(date, Duration::minutes(30), at(0, 0), utc(), &schedule);
        // 16 half-hours, minus lunch (2) and one booking
        assert_eq!(slots.len(), 13);
        assert_eq!(slots[0], at(9, 0));
        assert_eq!(slots[1], at(10, 0));
        assert!(!slots.contains(&at(12, 0)));
        assert!(!slots.contains(&at(12, 30)));
        assert_eq!(*slots.last().unwrap(), at(16, 30));
    }

    #[test]
    fn open_schedule_enumerates_default_day() {
        let schedule = Schedule {
            working_hours: &[],
            block_offs: &[],
            booked: &[],
        };
        let date = NaiveDate::from_ymd_opt(2031, 3, 4).unwrap();
        let slots = free_slots(date, Duration::hours(1), at(0, 0), utc(), &schedule);
        assert_eq!(slots.len(), 10);
    }
}
