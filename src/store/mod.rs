//! Persistence seam for events and registrations.
//!
//! Every mutation happens inside an [`EventUnit`]: an exclusive, per-event
//! atomic unit obtained from [`Store::lock_event`]. Changes staged on a unit
//! become visible only on [`EventUnit::commit`]; dropping the unit discards
//! them. Units for different events never block each other.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Event, Registration};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// PostgreSQL error codes that mean "try again": lock_not_available,
/// serialization_failure, deadlock_detected, query_canceled.
const TRANSIENT_SQLSTATES: [&str; 4] = ["55P03", "40001", "40P01", "57014"];

#[derive(Debug, Error)]
pub enum StoreError {
    /// Contention or timeout. Nothing was committed.
    #[error("store temporarily unavailable: {0}")]
    Transient(String),

    #[error("registrant already holds a registration for this event")]
    Duplicate,

    #[error("store invariant violated: {0}")]
    Inconsistent(String),

    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        let transient = match &err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| TRANSIENT_SQLSTATES.iter().any(|state| code == *state)),
            _ => false,
        };
        if transient {
            return StoreError::Transient(err.to_string());
        }

        if let sqlx::Error::Database(db) = &err {
            if db.is_unique_violation() {
                return StoreError::Duplicate;
            }
        }

        StoreError::Database(err)
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError>;

    async fn fetch_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError>;

    /// All events ordered by `starts_at`.
    async fn fetch_events(&self) -> Result<Vec<Event>, StoreError>;

    /// Registrations of an event ordered by `created_at`, or `None` when the
    /// event does not exist.
    async fn fetch_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Option<Vec<Registration>>, StoreError>;

    /// Opens the atomic unit for `event_id`, waiting at most the store's lock
    /// timeout. Returns `None` when the event does not exist.
    async fn lock_event(&self, event_id: Uuid) -> Result<Option<Box<dyn EventUnit>>, StoreError>;
}

/// Exclusive access to one event and its registrations.
#[async_trait]
pub trait EventUnit: Send {
    /// The event as read under the lock, including staged changes.
    fn event(&self) -> &Event;

    async fn save_event(&mut self, event: &Event) -> Result<(), StoreError>;

    /// Fails with [`StoreError::Inconsistent`] while registrations remain.
    async fn remove_event(&mut self) -> Result<(), StoreError>;

    async fn registration_exists(&mut self, registrant_id: Uuid) -> Result<bool, StoreError>;

    /// Fails with [`StoreError::Duplicate`] if the registrant already holds a
    /// registration for this event.
    async fn insert_registration(&mut self, registration: &Registration)
        -> Result<(), StoreError>;

    async fn remove_registration(&mut self, registration_id: Uuid) -> Result<bool, StoreError>;

    async fn remove_all_registrations(&mut self) -> Result<u64, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;
}
