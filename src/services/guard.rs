//! Capacity guard: the only path that changes an event's occupancy.
//!
//! A registration attempt re-reads the event under its per-event atomic unit,
//! checks for a duplicate, checks capacity, then appends the registration and
//! bumps occupancy in the same commit. Attempts for one event are serialized by
//! that unit; the first to acquire it wins the last place and the rest see the
//! updated occupancy. Attempts for different events never wait on each other.

use std::sync::Arc;

use chrono::{SubsecRound, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::error::RegistryError;
use super::ledger::RegistrationLedger;
use super::notifier::{Notification, NotificationDispatcher};
use crate::models::{ContactSnapshot, Registration};
use crate::store::{EventUnit, Store, StoreError};

/// A committed registration plus any soft warnings for the caller.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationOutcome {
    pub registration: Registration,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

pub struct CapacityGuard {
    store: Arc<dyn Store>,
    notifications: NotificationDispatcher,
}

impl CapacityGuard {
    pub fn new(store: Arc<dyn Store>, notifications: NotificationDispatcher) -> Self {
        Self {
            store,
            notifications,
        }
    }

    /// Registers `registrant_id` for `event_id`.
    ///
    /// Rejections, checked in this order: `EventNotFound`, `AlreadyRegistered`,
    /// `EventFull`. A `Transient` error means the unit could not be acquired
    /// or committed in time and nothing was written.
    #[tracing::instrument(skip(self, contact))]
    pub async fn attempt_register(
        &self,
        event_id: Uuid,
        registrant_id: Uuid,
        contact: ContactSnapshot,
    ) -> Result<RegistrationOutcome, RegistryError> {
        let mut unit = self
            .store
            .lock_event(event_id)
            .await?
            .ok_or(RegistryError::EventNotFound(event_id))?;

        if unit.registration_exists(registrant_id).await? {
            tracing::debug!("Duplicate registration rejected");
            return Err(RegistryError::AlreadyRegistered {
                event_id,
                registrant_id,
            });
        }

        let mut event = unit.event().clone();
        if let Some(capacity) = event.capacity {
            if event.occupancy >= capacity {
                tracing::info!(capacity, "Registration rejected, event is full");
                return Err(RegistryError::EventFull { event_id, capacity });
            }
        }

        event.occupancy = event.occupancy.checked_add(1).ok_or_else(|| {
            StoreError::Inconsistent(format!("occupancy of event {event_id} would overflow"))
        })?;

        let registration = Registration::new(event_id, registrant_id, contact);
        RegistrationLedger::append(&mut *unit, &registration).await?;

        event.updated_at = registration.created_at;
        unit.save_event(&event).await?;
        unit.commit().await?;

        tracing::info!(
            registration_id = %registration.id,
            occupancy = event.occupancy,
            capacity = ?event.capacity,
            "Registration committed"
        );

        // Outside the unit: a slow or failing notifier cannot hold the event
        // lock or undo the commit.
        let warnings = self
            .notifications
            .dispatch(Notification {
                registration_id: registration.id,
                event_id,
                event_title: event.title.clone(),
                contact: registration.contact.clone(),
            })
            .into_iter()
            .collect();

        Ok(RegistrationOutcome {
            registration,
            warnings,
        })
    }

    /// Cancels one registration and releases its place.
    #[tracing::instrument(skip(self))]
    pub async fn cancel(&self, event_id: Uuid, registration_id: Uuid) -> Result<(), RegistryError> {
        let mut unit = self
            .store
            .lock_event(event_id)
            .await?
            .ok_or(RegistryError::EventNotFound(event_id))?;

        RegistrationLedger::delete(&mut *unit, registration_id).await?;
        release_place(&mut *unit).await?;
        unit.commit().await?;

        tracing::info!("Registration cancelled");
        Ok(())
    }
}

async fn release_place(unit: &mut dyn EventUnit) -> Result<(), RegistryError> {
    let mut event = unit.event().clone();
    if event.occupancy <= 0 {
        return Err(RegistryError::Store(StoreError::Inconsistent(format!(
            "occupancy of event {} would drop below zero",
            event.id
        ))));
    }
    event.occupancy -= 1;
    event.updated_at = Utc::now().trunc_subsecs(6);
    unit.save_event(&event).await?;
    Ok(())
}
