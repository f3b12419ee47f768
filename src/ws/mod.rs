pub mod broadcast;
pub mod connection;
pub mod handler;
pub mod registry;
pub mod relay;
pub mod session;

pub use broadcast::Broadcaster;
pub use connection::{ConnectionHandle, DeliveryError};
pub use handler::attach_handler;
pub use registry::PresenceRegistry;
pub use relay::{ApplyOutcome, UpdateRelay};
pub use session::{SessionError, SessionLifecycle, SessionState};
