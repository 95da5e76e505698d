use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0}")]
    Validation(String),

    #[error("event {0} not found")]
    EventNotFound(Uuid),

    #[error("registration {0} not found")]
    RegistrationNotFound(Uuid),

    #[error("registrant {registrant_id} is already registered for event {event_id}")]
    AlreadyRegistered { event_id: Uuid, registrant_id: Uuid },

    #[error("event {event_id} is full ({capacity} places taken)")]
    EventFull { event_id: Uuid, capacity: i32 },

    #[error("capacity {requested} is below the current occupancy of {occupancy}")]
    CapacityBelowOccupancy { requested: i32, occupancy: i32 },

    /// Safe to retry; nothing was committed.
    #[error("{0}")]
    Transient(String),

    #[error(transparent)]
    Store(StoreError),
}

impl RegistryError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, RegistryError::Transient(_))
    }
}

impl From<StoreError> for RegistryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Transient(msg) => RegistryError::Transient(msg),
            other => RegistryError::Store(other),
        }
    }
}
