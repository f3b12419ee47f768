pub mod memory;
pub mod postgres;

pub use memory::{InjectedFailure, MemoryDocumentStore};
pub use postgres::PgDocumentStore;
