use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use super::{EventUnit, Store, StoreError};
use crate::models::{Event, Registration};

/// Last committed state of one event. Replaced wholesale on commit.
#[derive(Debug, Clone)]
struct Committed {
    event: Arc<Event>,
    /// Commit order, which is also `created_at` order.
    registrations: Arc<Vec<Registration>>,
    deleted: bool,
}

#[derive(Debug)]
struct EventSlot {
    /// The per-event atomic unit. Only writers take it.
    unit: Arc<AsyncMutex<()>>,
    /// Readers take this briefly and never wait on `unit`.
    committed: RwLock<Committed>,
}

impl EventSlot {
    fn snapshot(&self) -> Result<Committed, StoreError> {
        self.committed
            .read()
            .map(|committed| committed.clone())
            .map_err(|_| poisoned("event snapshot"))
    }
}

type SlotHandle = Arc<EventSlot>;
type SlotMap = Arc<Mutex<HashMap<Uuid, SlotHandle>>>;

/// In-process store. Each event has its own async mutex as the per-event
/// atomic unit; reads see the last committed snapshot without taking it.
#[derive(Clone)]
pub struct MemoryStore {
    slots: SlotMap,
    lock_timeout: Duration,
}

impl MemoryStore {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            slots: Arc::new(Mutex::new(HashMap::new())),
            lock_timeout,
        }
    }

    fn slot(&self, event_id: Uuid) -> Result<Option<SlotHandle>, StoreError> {
        let slots = self.slots.lock().map_err(|_| poisoned("event index"))?;
        Ok(slots.get(&event_id).cloned())
    }

    fn all_slots(&self) -> Result<Vec<SlotHandle>, StoreError> {
        let slots = self.slots.lock().map_err(|_| poisoned("event index"))?;
        Ok(slots.values().cloned().collect())
    }

    async fn acquire(&self, slot: &EventSlot) -> Result<OwnedMutexGuard<()>, StoreError> {
        tokio::time::timeout(self.lock_timeout, Arc::clone(&slot.unit).lock_owned())
            .await
            .map_err(|_| {
                StoreError::Transient(format!(
                    "event lock not acquired within {}ms",
                    self.lock_timeout.as_millis()
                ))
            })
    }
}

fn poisoned(what: &str) -> StoreError {
    StoreError::Inconsistent(format!("{what} lock poisoned"))
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_event(&self, event: &Event) -> Result<(), StoreError> {
        let mut slots = self.slots.lock().map_err(|_| poisoned("event index"))?;
        if slots.contains_key(&event.id) {
            return Err(StoreError::Inconsistent(format!(
                "event {} already exists",
                event.id
            )));
        }
        slots.insert(
            event.id,
            Arc::new(EventSlot {
                unit: Arc::new(AsyncMutex::new(())),
                committed: RwLock::new(Committed {
                    event: Arc::new(event.clone()),
                    registrations: Arc::new(Vec::new()),
                    deleted: false,
                }),
            }),
        );
        Ok(())
    }

    async fn fetch_event(&self, event_id: Uuid) -> Result<Option<Event>, StoreError> {
        let Some(slot) = self.slot(event_id)? else {
            return Ok(None);
        };
        let committed = slot.snapshot()?;
        Ok((!committed.deleted).then(|| Event::clone(&committed.event)))
    }

    async fn fetch_events(&self) -> Result<Vec<Event>, StoreError> {
        let mut events = Vec::new();
        for slot in self.all_slots()? {
            let committed = slot.snapshot()?;
            if !committed.deleted {
                events.push(Event::clone(&committed.event));
            }
        }
        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    async fn fetch_registrations(
        &self,
        event_id: Uuid,
    ) -> Result<Option<Vec<Registration>>, StoreError> {
        let Some(slot) = self.slot(event_id)? else {
            return Ok(None);
        };
        let committed = slot.snapshot()?;
        Ok((!committed.deleted).then(|| Vec::clone(&committed.registrations)))
    }

    async fn lock_event(&self, event_id: Uuid) -> Result<Option<Box<dyn EventUnit>>, StoreError> {
        let Some(slot) = self.slot(event_id)? else {
            return Ok(None);
        };
        let guard = self.acquire(&slot).await?;
        // Read after acquiring: nothing else can commit until the guard drops.
        let base = slot.snapshot()?;
        // A deletion may have committed while we were waiting.
        if base.deleted {
            return Ok(None);
        }

        Ok(Some(Box::new(MemoryUnit {
            event: Event::clone(&base.event),
            _guard: guard,
            slot,
            base,
            slots: Arc::clone(&self.slots),
            appended: Vec::new(),
            removed: Vec::new(),
            cleared: false,
            event_removed: false,
        })))
    }
}

/// Stages changes against a locked slot and applies them all on commit.
struct MemoryUnit {
    _guard: OwnedMutexGuard<()>,
    slot: SlotHandle,
    base: Committed,
    slots: SlotMap,
    event: Event,
    appended: Vec<Registration>,
    removed: Vec<Uuid>,
    cleared: bool,
    event_removed: bool,
}

impl MemoryUnit {
    fn committed(&self) -> impl Iterator<Item = &Registration> {
        let visible = !self.cleared;
        self.base
            .registrations
            .iter()
            .filter(move |r| visible && !self.removed.contains(&r.id))
    }

    fn remaining_registrations(&self) -> usize {
        self.committed().count() + self.appended.len()
    }
}

#[async_trait]
impl EventUnit for MemoryUnit {
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
        self.event = event.clone();
        Ok(())
    }

    async fn remove_event(&mut self) -> Result<(), StoreError> {
        let remaining = self.remaining_registrations();
        if remaining > 0 {
            return Err(StoreError::Inconsistent(format!(
                "{remaining} registration(s) still reference event {}",
                self.event.id
            )));
        }
        self.event_removed = true;
        Ok(())
    }

    async fn registration_exists(&mut self, registrant_id: Uuid) -> Result<bool, StoreError> {
        Ok(self
            .committed()
            .chain(self.appended.iter())
            .any(|r| r.registrant_id == registrant_id))
    }

    async fn insert_registration(
        &mut self,
        registration: &Registration,
    ) -> Result<(), StoreError> {
        if self.registration_exists(registration.registrant_id).await? {
            return Err(StoreError::Duplicate);
        }
        self.appended.push(registration.clone());
        Ok(())
    }

    async fn remove_registration(&mut self, registration_id: Uuid) -> Result<bool, StoreError> {
        if let Some(index) = self.appended.iter().position(|r| r.id == registration_id) {
            self.appended.remove(index);
            return Ok(true);
        }
        let committed = self.committed().any(|r| r.id == registration_id);
        if committed {
            self.removed.push(registration_id);
        }
        Ok(committed)
    }

    async fn remove_all_registrations(&mut self) -> Result<u64, StoreError> {
        let count = self.remaining_registrations() as u64;
        self.cleared = true;
        self.removed.clear();
        self.appended.clear();
        Ok(count)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let registrations: Vec<Registration> = self
            .committed()
            .chain(self.appended.iter())
            .cloned()
            .collect();
        let MemoryUnit {
            _guard,
            slot,
            slots,
            event,
            event_removed,
            ..
        } = *self;

        // Both locks are taken before anything is written, so a poisoned lock
        // aborts the commit with nothing applied.
        let mut index = if event_removed {
            Some(slots.lock().map_err(|_| poisoned("event index"))?)
        } else {
            None
        };
        let mut committed = slot
            .committed
            .write()
            .map_err(|_| poisoned("event snapshot"))?;

        if let Some(index) = index.as_mut() {
            index.remove(&event.id);
        }
        *committed = Committed {
            event: Arc::new(event),
            registrations: Arc::new(registrations),
            deleted: event_removed,
        };
        Ok(())
    }
}
