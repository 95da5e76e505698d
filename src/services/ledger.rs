use std::sync::Arc;

use uuid::Uuid;

use super::error::RegistryError;
use crate::models::Registration;
use crate::store::{EventUnit, Store, StoreError};

/// Registration records. Reads go straight to the store; writes take the
/// per-event unit opened by the capacity guard or the cascade coordinator.
pub struct RegistrationLedger {
    store: Arc<dyn Store>,
}

impl RegistrationLedger {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Registrations of an event in `created_at` order. These are the stored
    /// snapshots, never joined against current registrant profiles.
    pub async fn list(&self, event_id: Uuid) -> Result<Vec<Registration>, RegistryError> {
        let registrations = self
            .store
            .fetch_registrations(event_id)
            .await?
            .ok_or(RegistryError::EventNotFound(event_id))?;
        tracing::debug!(%event_id, count = registrations.len(), "Listed registrations");
        Ok(registrations)
    }

    pub async fn append(
        unit: &mut dyn EventUnit,
        record: &Registration,
    ) -> Result<(), RegistryError> {
        let event_id = unit.event().id;
        if record.event_id != event_id {
            return Err(RegistryError::Store(StoreError::Inconsistent(format!(
                "registration for event {} appended under event {event_id}",
                record.event_id
            ))));
        }

        unit.insert_registration(record)
            .await
            .map_err(|err| match err {
                StoreError::Duplicate => RegistryError::AlreadyRegistered {
                    event_id,
                    registrant_id: record.registrant_id,
                },
                other => other.into(),
            })
    }

    pub async fn delete(
        unit: &mut dyn EventUnit,
        registration_id: Uuid,
    ) -> Result<(), RegistryError> {
        if unit.remove_registration(registration_id).await? {
            Ok(())
        } else {
            Err(RegistryError::RegistrationNotFound(registration_id))
        }
    }

    pub async fn delete_all_for_event(unit: &mut dyn EventUnit) -> Result<u64, RegistryError> {
        Ok(unit.remove_all_registrations().await?)
    }
}
