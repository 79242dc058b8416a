use async_trait::async_trait;
use common::Notification;
use tracing::info;

#[derive(thiserror::Error, Debug)]
#[error("delivery failed: {0}")]
pub struct DeliveryError(pub String);

/// Outbound channel for patient notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), DeliveryError>;
}

/// Writes each notification as a structured log line.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn deliver(&self, n: &Notification) -> Result<(), DeliveryError> {
        info!(
            notification_id = %n.id,
            appointment_id = %n.appointment_id,
            kind = n.kind.as_str(),
            appointment_time = %n.appointment_time,
            "notification delivered"
        );
        Ok(())
    }
}
