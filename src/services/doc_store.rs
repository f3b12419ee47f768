use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{DocumentId, DocumentSnapshot, ParticipantId};

/// Message shown to clients for any not-found or permission failure.
pub const NOT_FOUND_OR_FORBIDDEN: &str = "document not found or access denied";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("document not found")]
    NotFound,
    #[error("access to document denied")]
    Forbidden,
    /// Backend trouble. `message` is safe to show a client, `source` is not.
    #[error("{message}: {source}")]
    Transient {
        message: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl StoreError {
    pub fn transient(
        message: impl Into<String>,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        StoreError::Transient {
            message: message.into(),
            source: source.into(),
        }
    }

    /// Text that may be handed to a client without leaking backend detail.
    pub fn client_message(&self) -> &str {
        match self {
            StoreError::NotFound | StoreError::Forbidden => NOT_FOUND_OR_FORBIDDEN,
            StoreError::Transient { message, .. } => message,
        }
    }

    pub fn is_not_found_or_forbidden(&self) -> bool {
        matches!(self, StoreError::NotFound | StoreError::Forbidden)
    }
}

/// Persistence backend for document snapshots.
///
/// Every call is scoped to the acting participant; implementations decide
/// what that participant may read or write.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, document: DocumentId, participant: &ParticipantId) -> Result<DocumentSnapshot, StoreError>;

    /// Persist a new title and content, returning the stored snapshot.
    async fn update(
        &self,
        document: DocumentId,
        participant: &ParticipantId,
        title: &str,
        content: &str,
    ) -> Result<DocumentSnapshot, StoreError>;

    async fn delete(&self, document: DocumentId, participant: &ParticipantId) -> Result<(), StoreError>;
}
