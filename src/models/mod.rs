pub mod event;
pub mod registration;

pub use event::{Event, EventPatch, EventState, NewEvent};
pub use registration::{ContactInput, ContactSnapshot, Registration};
