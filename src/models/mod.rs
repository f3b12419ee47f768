pub mod participant;
pub mod snapshot;
pub mod messages;
pub mod document;
pub mod health;
pub mod diagnostics;
pub mod error;

pub use participant::*;
pub use snapshot::*;
pub use messages::*;
pub use document::*;
pub use health::*;
pub use diagnostics::*;
pub use error::*;
