use std::sync::Arc;

use uuid::Uuid;

use super::cascade::CascadeCoordinator;
use super::error::RegistryError;
use crate::models::{Event, EventPatch, NewEvent};
use crate::store::Store;

pub struct EventCatalog {
    store: Arc<dyn Store>,
    cascade: Arc<CascadeCoordinator>,
}

impl EventCatalog {
    pub fn new(store: Arc<dyn Store>, cascade: Arc<CascadeCoordinator>) -> Self {
        Self { store, cascade }
    }

    pub async fn create_event(&self, input: NewEvent) -> Result<Event, RegistryError> {
        let event = Event::new(input);
        validate(&event)?;

        self.store.insert_event(&event).await?;
        tracing::info!(event_id = %event.id, capacity = ?event.capacity, "Event created");
        Ok(event)
    }

    pub async fn get_event(&self, event_id: Uuid) -> Result<Event, RegistryError> {
        self.store
            .fetch_event(event_id)
            .await?
            .ok_or(RegistryError::EventNotFound(event_id))
    }

    pub async fn list_events(&self) -> Result<Vec<Event>, RegistryError> {
        Ok(self.store.fetch_events().await?)
    }

    /// Applies `patch` under the event's atomic unit, so a capacity edit
    /// cannot interleave with a registration taking the last place.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_event(
        &self,
        event_id: Uuid,
        patch: EventPatch,
    ) -> Result<Event, RegistryError> {
        let mut unit = self
            .store
            .lock_event(event_id)
            .await?
            .ok_or(RegistryError::EventNotFound(event_id))?;

        let mut event = unit.event().clone();
        patch.apply(&mut event);
        validate(&event)?;

        if let Some(requested) = event.capacity {
            if requested < event.occupancy {
                tracing::warn!(
                    %event_id,
                    requested,
                    occupancy = event.occupancy,
                    "Capacity reduction below occupancy rejected"
                );
                return Err(RegistryError::CapacityBelowOccupancy {
                    requested,
                    occupancy: event.occupancy,
                });
            }
        }

        unit.save_event(&event).await?;
        unit.commit().await?;

        tracing::info!(%event_id, capacity = ?event.capacity, "Event updated");
        Ok(event)
    }

    pub async fn delete_event(&self, event_id: Uuid) -> Result<u64, RegistryError> {
        self.cascade.delete_event(event_id).await
    }
}

fn validate(event: &Event) -> Result<(), RegistryError> {
    if event.title.is_empty() {
        return Err(RegistryError::Validation("title is required".into()));
    }
    if let Some(capacity) = event.capacity {
        if capacity <= 0 {
            return Err(RegistryError::Validation(
                "capacity must be a positive number or null for unlimited".into(),
            ));
        }
    }
    if let Some(ends_at) = event.ends_at {
        if ends_at < event.starts_at {
            return Err(RegistryError::Validation(
                "ends_at must not be before starts_at".into(),
            ));
        }
    }
    Ok(())
}
