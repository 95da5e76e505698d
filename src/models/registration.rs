use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use crate::services::error::RegistryError;

const MAX_AGE: i32 = 120;

/// Contact details as submitted by the registrant.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContactInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub age: Option<i32>,
    #[serde(default)]
    pub position: Option<String>,
}

/// Contact details copied by value into a registration.
///
/// Only constructed through [`ContactSnapshot::try_from`], so a snapshot held
/// by the capacity guard has already passed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ContactSnapshot {
    #[sqlx(rename = "contact_name")]
    pub name: String,
    #[sqlx(rename = "contact_email")]
    pub email: String,
    #[sqlx(rename = "contact_phone")]
    pub phone: Option<String>,
    #[sqlx(rename = "contact_age")]
    pub age: Option<i32>,
    #[sqlx(rename = "contact_position")]
    pub position: Option<String>,
}

impl TryFrom<ContactInput> for ContactSnapshot {
    type Error = RegistryError;

    fn try_from(input: ContactInput) -> Result<Self, Self::Error> {
        let name = input.name.trim();
        if name.is_empty() {
            return Err(RegistryError::Validation("contact name is required".into()));
        }

        let email = input.email.trim();
        if email.is_empty() {
            return Err(RegistryError::Validation("contact email is required".into()));
        }
        // Shape only: one '@' between a non-empty local part and domain.
        match email.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') => {}
            _ => {
                return Err(RegistryError::Validation(format!(
                    "'{email}' is not a valid email address"
                )))
            }
        }

        if let Some(age) = input.age {
            if !(0..=MAX_AGE).contains(&age) {
                return Err(RegistryError::Validation(format!(
                    "age must be between 0 and {MAX_AGE}"
                )));
            }
        }

        Ok(Self {
            name: name.to_string(),
            email: email.to_lowercase(),
            phone: non_blank(input.phone),
            age: input.age,
            position: non_blank(input.position),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Registration {
    pub id: Uuid,
    pub event_id: Uuid,
    pub registrant_id: Uuid,
    #[sqlx(flatten)]
    pub contact: ContactSnapshot,
    pub created_at: DateTime<Utc>,
}

impl Registration {
    pub fn new(event_id: Uuid, registrant_id: Uuid, contact: ContactSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_id,
            registrant_id,
            contact,
            // PostgreSQL keeps microseconds.
            created_at: Utc::now().trunc_subsecs(6),
        }
    }
}
