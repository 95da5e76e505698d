use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    pub ends_at: Option<DateTime<Utc>>,
    /// `None` means unlimited.
    pub capacity: Option<i32>,
    pub occupancy: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration state derived from `occupancy` and `capacity`. Never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventState {
    Open,
    Full,
}

impl Event {
    pub fn new(input: NewEvent) -> Self {
        let now = Utc::now().trunc_subsecs(6);
        Self {
            id: Uuid::new_v4(),
            title: input.title.trim().to_string(),
            description: input.description,
            location: input.location,
            starts_at: input.starts_at,
            ends_at: input.ends_at,
            capacity: input.capacity,
            occupancy: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> EventState {
        match self.capacity {
            Some(capacity) if self.occupancy >= capacity => EventState::Full,
            _ => EventState::Open,
        }
    }

    /// Places left, or `None` for an unlimited event.
    pub fn remaining(&self) -> Option<i32> {
        self.capacity
            .map(|capacity| (capacity - self.occupancy).max(0))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub ends_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub capacity: Option<i32>,
}

/// Partial update of an event.
///
/// Nullable fields distinguish "absent" (leave unchanged) from an explicit
/// `null` (clear): `capacity: null` makes the event unlimited.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventPatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, deserialize_with = "present")]
    pub location: Option<Option<String>>,
    #[serde(default)]
    pub starts_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "present")]
    pub ends_at: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "present")]
    pub capacity: Option<Option<i32>>,
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

impl EventPatch {
    /// Applies every present field onto `event`, leaving `occupancy` alone.
    pub fn apply(self, event: &mut Event) {
        if let Some(title) = self.title {
            event.title = title.trim().to_string();
        }
        if let Some(description) = self.description {
            event.description = description;
        }
        if let Some(location) = self.location {
            event.location = location;
        }
        if let Some(starts_at) = self.starts_at {
            event.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            event.ends_at = ends_at;
        }
        if let Some(capacity) = self.capacity {
            event.capacity = capacity;
        }
        event.updated_at = Utc::now().trunc_subsecs(6);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event_with(capacity: Option<i32>, occupancy: i32) -> Event {
        let mut event = Event::new(NewEvent {
            title: "Sunday league".to_string(),
            description: None,
            location: None,
            starts_at: Utc::now(),
            ends_at: None,
            capacity,
        });
        event.occupancy = occupancy;
        event
    }

    #[test]
    fn test_unlimited_event_is_always_open() {
        let event = event_with(None, 10_000);
        assert_eq!(event.state(), EventState::Open);
        assert_eq!(event.remaining(), None);
    }

    #[test]
    fn test_state_turns_full_at_capacity() {
        assert_eq!(event_with(Some(2), 1).state(), EventState::Open);
        assert_eq!(event_with(Some(2), 2).state(), EventState::Full);
        assert_eq!(event_with(Some(2), 1).remaining(), Some(1));
        assert_eq!(event_with(Some(2), 2).remaining(), Some(0));
    }

    #[test]
    fn test_patch_distinguishes_absent_from_null() {
        let absent: EventPatch = serde_json::from_str(r#"{"title":"Renamed"}"#).unwrap();
        assert_eq!(absent.capacity, None);

        let cleared: EventPatch = serde_json::from_str(r#"{"capacity":null}"#).unwrap();
        assert_eq!(cleared.capacity, Some(None));

        let mut event = event_with(Some(4), 3);
        cleared.apply(&mut event);
        assert_eq!(event.capacity, None);
        assert_eq!(event.occupancy, 3);
    }
}
