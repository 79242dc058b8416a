//! Periodic JSON snapshots of stores that can dump themselves.

use chrono::{NaiveDateTime, SubsecRound, Utc};
use db::{DbError, Store};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info};

#[derive(thiserror::Error, Debug)]
pub enum BackupError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store error: {0}")]
    Db(#[from] DbError),
    #[error("encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize)]
pub struct BackupStatus {
    pub last_backup_time: NaiveDateTime,
    pub backup_frequency_days: u32,
    pub location: String,
}

pub struct Backups {
    dir: PathBuf,
    frequency_days: u32,
    last: RwLock<Option<BackupStatus>>,
}

impl Backups {
    pub fn new(dir: PathBuf, frequency_days: u32) -> Self {
        Self {
            dir,
            frequency_days: frequency_days.max(1),
            last: RwLock::new(None),
        }
    }

    pub async fn status(&self) -> Option<BackupStatus> {
        self.last.read().await.clone()
    }

    /// Writes one snapshot. `Ok(None)` when the store keeps no snapshot.
    pub async fn run_once(&self, store: &dyn Store) -> Result<Option<PathBuf>, BackupError> {
        let Some(snapshot) = store.snapshot().await? else {
            return Ok(None);
        };
        let taken = Utc::now().trunc_subsecs(0);
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self
            .dir
            .join(format!("clinic-{}.json", taken.format("%Y%m%dT%H%M%SZ")));
        tokio::fs::write(&path, serde_json::to_vec_pretty(&snapshot)?).await?;

        *self.last.write().await = Some(BackupStatus {
            last_backup_time: taken.naive_utc(),
            backup_frequency_days: self.frequency_days,
            location: path.display().to_string(),
        });
        info!(path = %path.display(), "backup written");
        Ok(Some(path))
    }

    /// First snapshot immediately, then one every `frequency_days`.
    pub async fn run(self: Arc<Self>, store: Arc<dyn Store>) {
        let period = std::time::Duration::from_secs(u64::from(self.frequency_days) * 86_400);
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match self.run_once(store.as_ref()).await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    info!("store keeps no snapshot; backup loop stopped");
                    return;
                }
                Err(e) => error!(error = %e, "backup failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::NewPatient;
    use db::MemStore;

    #[tokio::test]
    async fn snapshot_lands_on_disk() {
        let dir = std::env::temp_dir().join(format!("clinic-backup-{}", uuid::Uuid::new_v4()));
        let store = MemStore::new();
        store
            .insert_patient(NewPatient {
                first_name: "Ana".into(),
                last_name: "Lima".into(),
                ..NewPatient::default()
            })
            .await
            .unwrap();

        let backups = Backups::new(dir.clone(), 1);
        assert!(backups.status().await.is_none());
        let path = backups.run_once(&store).await.unwrap().unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&tokio::fs::read(&path).await.unwrap()).unwrap();
        assert!(written.to_string().contains("Lima"));
        let status = backups.status().await.unwrap();
        assert_eq!(status.backup_frequency_days, 1);
        assert_eq!(status.location, path.display().to_string());

        tokio::fs::remove_dir_all(dir).await.unwrap();
    }
}
