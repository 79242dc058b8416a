use auth::JwtKeys;
use booking::{BookingPolicy, LogNotifier, Scheduler};
use chrono::{Duration, FixedOffset};
use db::Store;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::backup::Backups;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub scheduler: Arc<Scheduler>,
    pub jwt: JwtKeys,
    pub access_ttl: i64,
    pub refresh_ttl: i64,
    pub reset_ttl: i64,
    pub enforce_auth: bool,
    pub started_at: Instant,
    pub backups: Option<Arc<Backups>>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, s: &Settings) -> Result<Self, config::ConfigError> {
        let scheduler = Scheduler::new(store.clone(), Arc::new(LogNotifier), s.booking_policy()?);
        let backups = s
            .backup_dir
            .as_ref()
            .map(|dir| Arc::new(Backups::new(dir.clone(), s.backup_frequency_days)));
        Ok(Self {
            store,
            scheduler: Arc::new(scheduler),
            jwt: JwtKeys::from_secret(&s.jwt_secret),
            access_ttl: s.access_ttl_seconds,
            refresh_ttl: s.refresh_ttl_seconds,
            reset_ttl: s.password_reset_ttl_seconds,
            enforce_auth: s.enforce_auth,
            started_at: Instant::now(),
            backups,
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database_url: Option<String>,
    pub jwt_secret: String,
    #[serde(default = "defaults::access_ttl")]
    pub access_ttl_seconds: i64,
    #[serde(default = "defaults::refresh_ttl")]
    pub refresh_ttl_seconds: i64,
    #[serde(default = "defaults::bind_addr")]
    pub bind_addr: String,
    #[serde(default = "defaults::port")]
    pub port: u16,
    #[serde(default)]
    pub enforce_auth: bool,
    #[serde(default = "defaults::rate_per_second")]
    pub rate_limit_per_second: u64,
    #[serde(default = "defaults::rate_burst")]
    pub rate_limit_burst: u32,
    #[serde(default = "defaults::slot_minutes")]
    pub slot_minutes: i64,
    #[serde(default = "defaults::max_appointment")]
    pub max_appointment_minutes: i64,
    #[serde(default = "defaults::reminder_lead")]
    pub reminder_lead_hours: i64,
    #[serde(default = "defaults::reminder_poll")]
    pub reminder_poll_seconds: u64,
    #[serde(default)]
    pub clinic_utc_offset_minutes: i32,
    #[serde(default = "defaults::reset_ttl")]
    pub password_reset_ttl_seconds: i64,
    pub backup_dir: Option<PathBuf>,
    #[serde(default = "defaults::backup_days")]
    pub backup_frequency_days: u32,
    #[serde(default = "defaults::max_connections")]
    pub db_max_connections: u32,
}

mod defaults {
    pub fn access_ttl() -> i64 {
        900
    }
    pub fn refresh_ttl() -> i64 {
        60 * 60 * 24 * 7
    }
    pub fn bind_addr() -> String {
        "0.0.0.0".into()
    }
    pub fn port() -> u16 {
        8080
    }
    pub fn rate_per_second() -> u64 {
        50
    }
    pub fn rate_burst() -> u32 {
        100
    }
    pub fn slot_minutes() -> i64 {
        30
    }
    pub fn max_appointment() -> i64 {
        4 * 60
    }
    pub fn reminder_lead() -> i64 {
        24
    }
    pub fn reminder_poll() -> u64 {
        60
    }
    pub fn reset_ttl() -> i64 {
        3600
    }
    pub fn backup_days() -> u32 {
        1
    }
    pub fn max_connections() -> u32 {
        10
    }
}

impl Settings {
    /// Reads `.env` and the process environment. Keys are the field names,
    /// upper-cased (`JWT_SECRET`, `ENFORCE_AUTH`, ...).
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let _ = dotenvy::dotenv();

        config::Config::builder()
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize::<Settings>()
    }

    /// Defaults for everything but the signing secret.
    pub fn with_secret(jwt_secret: &str) -> Self {
        Self {
            database_url: None,
            jwt_secret: jwt_secret.to_owned(),
            access_ttl_seconds: defaults::access_ttl(),
            refresh_ttl_seconds: defaults::refresh_ttl(),
            bind_addr: defaults::bind_addr(),
            port: defaults::port(),
            enforce_auth: false,
            rate_limit_per_second: defaults::rate_per_second(),
            rate_limit_burst: defaults::rate_burst(),
            slot_minutes: defaults::slot_minutes(),
            max_appointment_minutes: defaults::max_appointment(),
            reminder_lead_hours: defaults::reminder_lead(),
            reminder_poll_seconds: defaults::reminder_poll(),
            clinic_utc_offset_minutes: 0,
            password_reset_ttl_seconds: defaults::reset_ttl(),
            backup_dir: None,
            backup_frequency_days: defaults::backup_days(),
            db_max_connections: defaults::max_connections(),
        }
    }

    pub fn booking_policy(&self) -> Result<BookingPolicy, config::ConfigError> {
        if self.slot_minutes <= 0 {
            return Err(config::ConfigError::Message(
                "slot_minutes must be positive".into(),
            ));
        }
        if self.max_appointment_minutes < self.slot_minutes {
            return Err(config::ConfigError::Message(
                "max_appointment_minutes must cover one slot".into(),
            ));
        }
        let offset = FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60)
            .ok_or_else(|| {
                config::ConfigError::Message("clinic_utc_offset_minutes out of range".into())
            })?;
        Ok(BookingPolicy {
            slot: Duration::minutes(self.slot_minutes),
            max_length: Duration::minutes(self.max_appointment_minutes),
            reminder_lead: Duration::hours(self.reminder_lead_hours),
            offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policy_follows_settings() {
        let mut s = Settings::with_secret("k");
        s.slot_minutes = 15;
        s.clinic_utc_offset_minutes = -180;
        let p = s.booking_policy().unwrap();
        assert_eq!(p.slot, Duration::minutes(15));
        assert_eq!(p.max_length, Duration::hours(4));
        assert_eq!(p.reminder_lead, Duration::hours(24));
        assert_eq!(p.offset.local_minus_utc(), -3 * 3600);
    }

    #[test]
    fn bad_offsets_are_rejected() {
        let mut s = Settings::with_secret("k");
        s.clinic_utc_offset_minutes = 24 * 60;
        assert!(s.booking_policy().is_err());
        s.clinic_utc_offset_minutes = 0;
        s.slot_minutes = 0;
        assert!(s.booking_policy().is_err());
        s.slot_minutes = 30;
        s.max_appointment_minutes = 20;
        assert!(s.booking_policy().is_err());
    }
}
