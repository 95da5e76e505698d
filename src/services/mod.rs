pub mod cascade;
pub mod catalog;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod notifier;

pub use cascade::CascadeCoordinator;
pub use catalog::EventCatalog;
pub use error::RegistryError;
pub use guard::{CapacityGuard, RegistrationOutcome};
pub use ledger::RegistrationLedger;
pub use notifier::{
    LogNotifier, Notification, NotificationDispatcher, NotificationError, Notifier,
    WebhookNotifier,
};
