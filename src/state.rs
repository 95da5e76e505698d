use std::sync::Arc;

use crate::services::{
    CapacityGuard, CascadeCoordinator, EventCatalog, NotificationDispatcher, RegistrationLedger,
};
use crate::store::Store;

/// Shared handles to the registration services, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub catalog: Arc<EventCatalog>,
    pub ledger: Arc<RegistrationLedger>,
    pub guard: Arc<CapacityGuard>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, notifications: NotificationDispatcher) -> Self {
        let cascade = Arc::new(CascadeCoordinator::new(Arc::clone(&store)));
        Self {
            catalog: Arc::new(EventCatalog::new(Arc::clone(&store), cascade)),
            ledger: Arc::new(RegistrationLedger::new(Arc::clone(&store))),
            guard: Arc::new(CapacityGuard::new(store, notifications)),
        }
    }
}
