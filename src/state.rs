use std::sync::Arc;

use crate::auth::Authenticator;
use crate::services::DocumentStore;
use crate::ws::{Broadcaster, PresenceRegistry, UpdateRelay};

/// Shared state handed to every handler and session worker.
#[derive(Clone)]
pub struct AppState {
    pub authenticator: Arc<dyn Authenticator>,
    pub store: Arc<dyn DocumentStore>,
    pub registry: Arc<PresenceRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub relay: Arc<UpdateRelay>,
    pub outbound_queue_capacity: usize,
}

impl AppState {
    pub fn new(
        authenticator: Arc<dyn Authenticator>,
        store: Arc<dyn DocumentStore>,
        outbound_queue_capacity: usize,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let relay = Arc::new(UpdateRelay::new(store.clone(), registry.clone(), broadcaster.clone()));
        Self {
            authenticator,
            store,
            registry,
            broadcaster,
            relay,
            outbound_queue_capacity,
        }
    }
}
