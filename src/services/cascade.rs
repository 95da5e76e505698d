use std::sync::Arc;

use uuid::Uuid;

use super::error::RegistryError;
use super::ledger::RegistrationLedger;
use crate::store::Store;

/// Deletes an event together with its registrations in one atomic unit.
pub struct CascadeCoordinator {
    store: Arc<dyn Store>,
}

impl CascadeCoordinator {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns how many registrations were removed. On any failure the event
    /// and every registration stay exactly as they were.
    #[tracing::instrument(skip(self))]
    pub async fn delete_event(&self, event_id: Uuid) -> Result<u64, RegistryError> {
        let mut unit = self
            .store
            .lock_event(event_id)
            .await?
            .ok_or(RegistryError::EventNotFound(event_id))?;

        let removed = RegistrationLedger::delete_all_for_event(&mut *unit).await?;
        unit.remove_event().await?;
        unit.commit().await?;

        tracing::info!(%event_id, removed, "Event deleted with its registrations");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContactSnapshot, Event, NewEvent, Registration};
    use crate::store::{EventUnit, MemoryStore, StoreError};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::time::Duration;

    /// Wraps the in-process store and fails every event removal.
    struct FailingRemoval(MemoryStore);

    struct FailingUnit(Box<dyn EventUnit>);

    #[async_trait]
    impl Store for FailingRemoval {
        async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
            self.0.insert_event(event).await
        }

        async fn fetch_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
            self.0.fetch_event(event_id).await
        }

        async fn fetch_events(&self) -> Result<Vec<Event>, StoreError> {
            self.0.fetch_events().await
        }

        async fn fetch_registrations(
            &self,
            event_id: Uuid,
        ) -> Result<Option<Vec<Registration>>, StoreError> {
            self.0.fetch_registrations(event_id).await
        }

        async fn lock_event(
            &self,
            event_id: Uuid,
        ) -> Result<Option<Box<dyn EventUnit>>, StoreError> {
            Ok(self
                .0
                .lock_event(event_id)
                .await?
                .map(|unit| Box::new(FailingUnit(unit)) as Box<dyn EventUnit>))
        }
    }

    #[async_trait]
    impl EventUnit for FailingUnit {
        fn event(&self) -> &Event {
            self.0.event()
        }

        async fn save_event(&mut self, event: &Event) -> Result<(), StoreError> {
            self.0.save_event(event).await
        }

        async fn remove_event(&mut self) -> Result<(), StoreError> {
            Err(StoreError::Transient("simulated failure".into()))
        }

        async fn registration_exists(&mut self, registrant_id: Uuid) -> Result<bool, StoreError> {
            self.0.registration_exists(registrant_id).await
        }

        async fn insert_registration(
            &mut self,
            registration: &Registration,
        ) -> Result<(), StoreError> {
            self.0.insert_registration(registration).await
        }

        async fn remove_registration(
            &mut self,
            registration_id: Uuid,
        ) -> Result<bool, StoreError> {
            self.0.remove_registration(registration_id).await
        }

        async fn remove_all_registrations(&mut self) -> Result<u64, StoreError> {
            self.0.remove_all_registrations().await
        }

        async fn commit(self: Box<Self>) -> Result<(), StoreError> {
            self.0.commit().await
        }
    }

    async fn seeded(store: &dyn Store, registrations: usize) -> Uuid {
        let event = Event::new(NewEvent {
            title: "Club tournament".to_string(),
            description: None,
            location: None,
            starts_at: Utc::now(),
            ends_at: None,
            capacity: None,
        });
        store.insert_event(&event).await.unwrap();

        let mut unit = store.lock_event(event.id).await.unwrap().unwrap();
        let mut seeded_event = unit.event().clone();
        for i in 0..registrations {
            let registration = Registration::new(
                event.id,
                Uuid::new_v4(),
                ContactSnapshot {
                    name: format!("Entrant {i}"),
                    email: format!("entrant{i}@example.org"),
                    phone: None,
                    age: None,
                    position: None,
                },
            );
            unit.insert_registration(&registration).await.unwrap();
            seeded_event.occupancy += 1;
        }
        unit.save_event(&seeded_event).await.unwrap();
        unit.commit().await.unwrap();
        event.id
    }

    #[tokio::test]
    async fn test_delete_reports_removed_registrations() {
        let store = Arc::new(MemoryStore::new(Duration::from_millis(100)));
        let event_id = seeded(store.as_ref(), 3).await;
        let cascade = CascadeCoordinator::new(store.clone());

        assert_eq!(cascade.delete_event(event_id).await.unwrap(), 3);
        assert!(store.fetch_registrations(event_id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_cascade_leaves_everything_in_place() {
        let store = Arc::new(FailingRemoval(MemoryStore::new(Duration::from_millis(100))));
        let event_id = seeded(store.as_ref(), 2).await;
        let cascade = CascadeCoordinator::new(store.clone());

        let result = cascade.delete_event(event_id).await;
        assert!(matches!(result, Err(RegistryError::Transient(_))));

        let event = store.fetch_event(event_id).await.unwrap().unwrap();
        assert_eq!(event.occupancy, 2);
        let registrations = store.fetch_registrations(event_id).await.unwrap().unwrap();
        assert_eq!(registrations.len(), 2);
    }
}
