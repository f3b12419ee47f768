pub mod auth_service;
pub mod doc_store;

pub use doc_store::{DocumentStore, StoreError};
