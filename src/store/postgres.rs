use std::time::Duration;

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::{EventUnit, Store, StoreError};
use crate::models::{Event, Registration};

const SQL_INSERT_EVENT: &str = r#"
INSERT INTO events (
  id, title, description, location, starts_at, ends_at,
  capacity, occupancy, created_at, updated_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
"#;

const SQL_SELECT_EVENT: &str = r#"
SELECT id, title, description, location, starts_at, ends_at,
       capacity, occupancy, created_at, updated_at
FROM events
WHERE id = $1
"#;

const SQL_SELECT_EVENTS: &str = r#"
SELECT id, title, description, location, starts_at, ends_at,
       capacity, occupancy, created_at, updated_at
FROM events
ORDER BY starts_at, id
"#;

const SQL_LOCK_EVENT: &str = r#"
SELECT id, title, description, location, starts_at, ends_at,
       capacity, occupancy, created_at, updated_at
FROM events
WHERE id = $1
FOR UPDATE
"#;

const SQL_UPDATE_EVENT: &str = r#"
UPDATE events
SET title = $2,
    description = $3,
    location = $4,
    starts_at = $5,
    ends_at = $6,
    capacity = $7,
    occupancy = $8,
    updated_at = $9
WHERE id = $1
"#;

const SQL_DELETE_EVENT: &str = "DELETE FROM events WHERE id = $1";

const SQL_SELECT_REGISTRATIONS: &str = r#"
SELECT id, event_id, registrant_id,
       contact_name, contact_email, contact_phone, contact_age, contact_position,
       created_at
FROM registrations
WHERE event_id = $1
ORDER BY created_at, id
"#;

const SQL_REGISTRATION_EXISTS: &str = r#"
SELECT EXISTS (
  SELECT 1 FROM registrations WHERE event_id = $1 AND registrant_id = $2
)
"#;

const SQL_INSERT_REGISTRATION: &str = r#"
INSERT INTO registrations (
  id, event_id, registrant_id,
  contact_name, contact_email, contact_phone, contact_age, contact_position,
  created_at
) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
"#;

const SQL_DELETE_REGISTRATION: &str =
    "DELETE FROM registrations WHERE id = $1 AND event_id = $2";

const SQL_DELETE_EVENT_REGISTRATIONS: &str = "DELETE FROM registrations WHERE event_id = $1";

/// PostgreSQL store. The per-event atomic unit is a transaction holding the
/// event's row lock (`SELECT ... FOR UPDATE`), bounded by `lock_timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PgStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        sqlx::query(SQL_INSERT_EVENT)
            .bind(event.id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.location)
            .bind(event.starts_at)
            .bind(event.ends_at)
            .bind(event.capacity)
            .bind(event.occupancy)
            .bind(event.created_at)
            .bind(event.updated_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn fetch_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let event = sqlx::query_as::<_, Event>(SQL_SELECT_EVENT)
            .bind(event_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(event)
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, StoreError> {
        let events = sqlx::query_as::<_, Event>(SQL_SELECT_EVENTS)
            .fetch_all(&self.pool)
            .await?;
        Ok(events)
    }

    async fn fetch_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Option<Vec<Registration>>, StoreError> {
        // One snapshot for both reads so a concurrent cascade cannot slip in
        // between the existence check and the listing.
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ READ ONLY")
            .execute(&mut *tx)
            .await?;

        let exists = sqlx::query(SQL_SELECT_EVENT)
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();
        if !exists {
            return Ok(None);
        }

        let registrations = sqlx::query_as::<_, Registration>(SQL_SELECT_REGISTRATIONS)
            .bind(event_id)
            .fetch_all(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(Some(registrations))
    }

    async fn lock_event(&self, event_id: Uuid) -> Result<Option<Box<dyn EventUnit>>, StoreError> {
        let mut tx = self.pool.begin().await?;

        // Scoped to this transaction; a blocked FOR UPDATE fails with 55P03.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await?;

        let event = sqlx::query_as::<_, Event>(SQL_LOCK_EVENT)
            .bind(event_id)
            .fetch_optional(&mut *tx)
            .await?;

        // Without a row there is nothing to lock; dropping `tx` rolls back.
        Ok(event.map(|event| Box::new(PgUnit { tx, event }) as Box<dyn EventUnit>))
    }
}

struct PgUnit {
    tx: Transaction<'static, Postgres>,
    event: Event,
}

#[async_trait]
impl EventUnit for PgUnit {
    fn event(&self) -> &Event {
        &self.event
    }

    async fn save_event(&mut self, event: &Event) -> Result<(), StoreError> {
        if event.id != self.event.id {
            return Err(StoreError::Inconsistent(format!(
                "unit for event {} cannot write event {}",
                self.event.id, event.id
            )));
        }
        sqlx::query(SQL_UPDATE_EVENT)
            .bind(event.id)
            .bind(&event.title)
            .bind(&event.description)
            .bind(&event.location)
            .bind(event.starts_at)
            .bind(event.ends_at)
            .bind(event.capacity)
            .bind(event.occupancy)
            .bind(event.updated_at)
            .execute(&mut *self.tx)
            .await?;
        self.event = event.clone();
        Ok(())
    }

    async fn remove_event(&mut self) -> Result<(), StoreError> {
        let event_id = self.event.id;
        sqlx::query(SQL_DELETE_EVENT)
            .bind(event_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| match err {
                sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                    StoreError::Inconsistent(format!(
                        "registrations still reference event {event_id}"
                    ))
                }
                other => StoreError::from(other),
            })?;
        Ok(())
    }

    async fn registration_exists(&mut self, registrant_id: Uuid) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(SQL_REGISTRATION_EXISTS)
            .bind(self.event.id)
            .bind(registrant_id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        let contact = &registration.contact;
        sqlx::query(SQL_INSERT_REGISTRATION)
            .bind(registration.id)
            .bind(registration.event_id)
            .bind(registration.registrant_id)
            .bind(&contact.name)
            .bind(&contact.email)
            .bind(&contact.phone)
            .bind(contact.age)
            .bind(&contact.position)
            .bind(registration.created_at)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn remove_registration(&mut self, registration_id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query(SQL_DELETE_REGISTRATION)
            .bind(registration_id)
            .bind(self.event.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn remove_all_registrations(&mut self) -> Result<u64, StoreError> {
        let result = sqlx::query(SQL_DELETE_EVENT_REGISTRATIONS)
            .bind(self.event.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(result.rows_affected())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }
}
