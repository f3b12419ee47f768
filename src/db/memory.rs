use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::info;

use crate::models::{DocumentId, DocumentSnapshot, ParticipantId};
use crate::services::doc_store::{DocumentStore, StoreError};

/// Failure a [`MemoryDocumentStore`] can be told to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectedFailure {
    NotFound,
    Transient,
}

struct StoredDocument {
    snapshot: DocumentSnapshot,
    editors: HashSet<ParticipantId>,
}

impl StoredDocument {
    fn can_access(&self, participant: &ParticipantId) -> bool {
        self.snapshot.owner == participant.as_str() || self.editors.contains(participant)
    }
}

/// Process-local document store. Used when no database is configured.
#[derive(Default)]
pub struct MemoryDocumentStore {
    documents: RwLock<HashMap<DocumentId, StoredDocument>>,
    failure: RwLock<Option<InjectedFailure>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: DocumentId, owner: &ParticipantId, title: &str, content: &str) -> DocumentSnapshot {
        let now = Utc::now();
        let snapshot = DocumentSnapshot {
            id,
            title: title.to_string(),
            content: content.to_string(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: now,
        };
        self.documents.write().insert(
            id,
            StoredDocument {
                snapshot: snapshot.clone(),
                editors: HashSet::new(),
            },
        );
        info!("Stored document {} for owner {}", id, owner);
        snapshot
    }

    /// Give `participant` read and edit access to `id`. Returns false if the document is unknown.
    pub fn share(&self, id: DocumentId, participant: &ParticipantId) -> bool {
        match self.documents.write().get_mut(&id) {
            Some(doc) => {
                doc.editors.insert(participant.clone());
                true
            }
            None => false,
        }
    }

    /// Make every following call fail with `failure` (or succeed again with `None`).
    pub fn fail_with(&self, failure: Option<InjectedFailure>) {
        *self.failure.write() = failure;
    }

    fn injected(&self) -> Result<(), StoreError> {
        match *self.failure.read() {
            None => Ok(()),
            Some(InjectedFailure::NotFound) => Err(StoreError::NotFound),
            Some(InjectedFailure::Transient) => Err(StoreError::transient(
                "document service unavailable",
                "injected backend failure",
            )),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, document: DocumentId, participant: &ParticipantId) -> Result<DocumentSnapshot, StoreError> {
        self.injected()?;
        let documents = self.documents.read();
        let doc = documents.get(&document).ok_or(StoreError::NotFound)?;
        if !doc.can_access(participant) {
            return Err(StoreError::Forbidden);
        }
        Ok(doc.snapshot.clone())
    }

    async fn update(
        &self,
        document: DocumentId,
        participant: &ParticipantId,
        title: &str,
        content: &str,
    ) -> Result<DocumentSnapshot, StoreError> {
        self.injected()?;
        let mut documents = self.documents.write();
        let doc = documents.get_mut(&document).ok_or(StoreError::NotFound)?;
        if !doc.can_access(participant) {
            return Err(StoreError::Forbidden);
        }
        doc.snapshot.title = title.to_string();
        doc.snapshot.content = content.to_string();
        doc.snapshot.updated_at = Utc::now();
        Ok(doc.snapshot.clone())
    }

    async fn delete(&self, document: DocumentId, participant: &ParticipantId) -> Result<(), StoreError> {
        self.injected()?;
        let mut documents = self.documents.write();
        let doc = documents.get(&document).ok_or(StoreError::NotFound)?;
        if doc.snapshot.owner != participant.as_str() {
            return Err(StoreError::Forbidden);
        }
        documents.remove(&document);
        info!("Deleted document {}", document);
        Ok(())
    }
}
