//! Best-effort registration confirmations.
//!
//! The [`NotificationDispatcher`] is fed after a registration has committed.
//! Deliveries run on background tasks, concurrently and in no particular
//! order; a failed delivery is logged and never touches the registration.
//! At most `max_in_flight` deliveries run at once. Beyond that the queue
//! fills and [`NotificationDispatcher::dispatch`] starts returning warnings.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::models::ContactSnapshot;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub registration_id: Uuid,
    pub event_id: Uuid,
    pub event_title: String,
    pub contact: ContactSnapshot,
}

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("notification request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("notification endpoint answered {0}")]
    Rejected(reqwest::StatusCode),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Writes confirmations to the log only.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            registration_id = %notification.registration_id,
            event_id = %notification.event_id,
            email = %notification.contact.email,
            "Registration confirmed for '{}'",
            notification.event_title
        );
        Ok(())
    }
}

/// Posts each confirmation as JSON to an external mail/notification service.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
        let response = self.client.post(&self.url).json(notification).send().await?;
        if !response.status().is_success() {
            return Err(NotificationError::Rejected(response.status()));
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    queue: mpsc::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Starts the background worker. Must be called inside a tokio runtime.
    pub fn spawn(notifier: Arc<dyn Notifier>, queue_depth: usize, max_in_flight: usize) -> Self {
        let (queue, mut pending) = mpsc::channel::<Notification>(queue_depth.max(1));
        let in_flight = Arc::new(Semaphore::new(max_in_flight.max(1)));

        tokio::spawn(async move {
            while let Some(notification) = pending.recv().await {
                // Waiting here leaves the queue to absorb the backlog.
                let Ok(permit) = Arc::clone(&in_flight).acquire_owned().await else {
                    break;
                };
                let notifier = Arc::clone(&notifier);
                tokio::spawn(async move {
                    if let Err(e) = notifier.notify(&notification).await {
                        tracing::warn!(
                            error = %e,
                            registration_id = %notification.registration_id,
                            event_id = %notification.event_id,
                            "Confirmation delivery failed"
                        );
                    }
                    drop(permit);
                });
            }
            tracing::debug!("Notification queue closed");
        });

        Self { queue }
    }

    /// Queues a confirmation without waiting. Returns a warning for the caller
    /// when the confirmation could not be queued.
    pub fn dispatch(&self, notification: Notification) -> Option<String> {
        match self.queue.try_send(notification) {
            Ok(()) => None,
            Err(TrySendError::Full(notification)) => {
                tracing::warn!(
                    registration_id = %notification.registration_id,
                    "Notification queue full, confirmation dropped"
                );
                Some("registration saved, but the confirmation message could not be queued".into())
            }
            Err(TrySendError::Closed(notification)) => {
                tracing::warn!(
                    registration_id = %notification.registration_id,
                    "Notification worker stopped, confirmation dropped"
                );
                Some("registration saved, but confirmation messages are unavailable".into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::mpsc::UnboundedSender;

    struct Recording(UnboundedSender<Uuid>);

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, notification: &Notification) -> Result<(), NotificationError> {
            let _ = self.0.send(notification.registration_id);
            Ok(())
        }
    }

    /// Never finishes a delivery; counts how many were started.
    struct Stalled(Arc<AtomicUsize>);

    #[async_trait]
    impl Notifier for Stalled {
        async fn notify(&self, _notification: &Notification) -> Result<(), NotificationError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<()>().await;
            Ok(())
        }
    }

    fn notification() -> Notification {
        Notification {
            registration_id: Uuid::new_v4(),
            event_id: Uuid::new_v4(),
            event_title: "Five-a-side".to_string(),
            contact: ContactSnapshot {
                name: "Robin".to_string(),
                email: "robin@example.org".to_string(),
                phone: None,
                age: None,
                position: Some("keeper".to_string()),
            },
        }
    }

    #[tokio::test]
    async fn test_dispatch_delivers_in_background() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = NotificationDispatcher::spawn(Arc::new(Recording(tx)), 8, 4);

        let sent = notification();
        assert!(dispatcher.dispatch(sent.clone()).is_none());

        let delivered = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(delivered, sent.registration_id);
    }

    #[tokio::test]
    async fn test_closed_queue_yields_soft_warning() {
        let (queue, pending) = mpsc::channel(1);
        drop(pending);
        let dispatcher = NotificationDispatcher { queue };

        assert!(dispatcher.dispatch(notification()).is_some());
    }

    #[tokio::test]
    async fn test_full_queue_yields_soft_warning() {
        let (queue, _pending) = mpsc::channel(1);
        let dispatcher = NotificationDispatcher { queue };

        assert!(dispatcher.dispatch(notification()).is_none());
        assert!(dispatcher.dispatch(notification()).is_some());
    }

    #[tokio::test]
    async fn test_stalled_deliveries_are_capped() {
        let started = Arc::new(AtomicUsize::new(0));
        let dispatcher =
            NotificationDispatcher::spawn(Arc::new(Stalled(Arc::clone(&started))), 1, 2);

        let mut warnings = 0;
        for _ in 0..200 {
            if dispatcher.dispatch(notification()).is_some() {
                warnings += 1;
            }
            tokio::task::yield_now().await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(started.load(Ordering::SeqCst), 2);
        assert!(warnings > 0);
    }
}
