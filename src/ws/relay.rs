//! Turns edits into persisted snapshots and the envelopes that announce them.

use std::sync::Arc;

use tracing::{error, info, warn};

use super::broadcast::Broadcaster;
use super::connection::ConnectionHandle;
use super::registry::PresenceRegistry;
use crate::models::{DocumentId, DocumentSnapshot, Envelope, ParticipantId};
use crate::services::doc_store::{DocumentStore, StoreError};

/// What an edit turned into.
#[derive(Debug)]
pub enum ApplyOutcome {
    /// Persisted. Carries the `document_update` for the other participants.
    Accepted(Envelope),
    /// Not persisted. Carries the `error` for the originator only.
    Rejected(Envelope),
}

pub struct UpdateRelay {
    store: Arc<dyn DocumentStore>,
    registry: Arc<PresenceRegistry>,
    broadcaster: Arc<Broadcaster>,
}

impl UpdateRelay {
    pub fn new(store: Arc<dyn DocumentStore>, registry: Arc<PresenceRegistry>, broadcaster: Arc<Broadcaster>) -> Self {
        Self { store, registry, broadcaster }
    }

    pub async fn apply(
        &self,
        document: DocumentId,
        participant: &ParticipantId,
        title: &str,
        content: &str,
    ) -> ApplyOutcome {
        match self.store.update(document, participant, title, content).await {
            Ok(snapshot) => {
                info!("Participant {} updated document {}", participant, document);
                ApplyOutcome::Accepted(Envelope::DocumentUpdate {
                    title: snapshot.title,
                    content: snapshot.content,
                })
            }
            Err(e) => {
                log_store_error(document, participant, &e);
                ApplyOutcome::Rejected(Envelope::error(format!(
                    "Failed to save document: {}",
                    e.client_message()
                )))
            }
        }
    }

    /// Apply an edit received on `origin` and deliver the outcome.
    pub async fn submit(
        &self,
        document: DocumentId,
        participant: &ParticipantId,
        origin: &ConnectionHandle,
        title: &str,
        content: &str,
    ) {
        match self.apply(document, participant, title, content).await {
            ApplyOutcome::Accepted(update) => {
                self.broadcaster.to_others(document, participant, &update);
            }
            ApplyOutcome::Rejected(reply) => {
                let _ = self.broadcaster.unicast(origin, participant, &reply);
            }
        }
    }

    /// Tell every attendee that `actor` changed the document outside of a session.
    pub fn notify_external_update(&self, document: DocumentId, actor: &ParticipantId, snapshot: DocumentSnapshot) -> usize {
        if self.registry.count(document) == 0 {
            return 0;
        }
        self.broadcaster.to_all(
            document,
            &Envelope::DocumentUpdatedExternally {
                document: snapshot,
                user_id: actor.clone(),
            },
        )
    }

    /// Tell every attendee the document is gone, then close their connections.
    ///
    /// Returns how many connections were closed.
    pub fn notify_deleted(&self, document: DocumentId, actor: &ParticipantId) -> usize {
        let attendees = self.registry.take_document(document);
        let deleted = Envelope::DocumentDeleted { user_id: actor.clone() };

        for (participant, handle) in &attendees {
            let _ = self.broadcaster.unicast(handle, participant, &deleted);
            handle.close();
        }

        if !attendees.is_empty() {
            info!(
                "Closed {} connection(s) to deleted document {}",
                attendees.len(),
                document
            );
        }
        attendees.len()
    }
}

fn log_store_error(document: DocumentId, participant: &ParticipantId, e: &StoreError) {
    if e.is_not_found_or_forbidden() {
        warn!("Update of document {} by {} refused: {}", document, participant, e);
    } else {
        error!("Update of document {} by {} failed: {}", document, participant, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{InjectedFailure, MemoryDocumentStore};
    use crate::ws::connection::Outbound;
    use uuid::Uuid;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    struct Fixture {
        store: Arc<MemoryDocumentStore>,
        registry: Arc<PresenceRegistry>,
        relay: UpdateRelay,
        doc: DocumentId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryDocumentStore::new());
        let registry = Arc::new(PresenceRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone()));
        let relay = UpdateRelay::new(store.clone(), registry.clone(), broadcaster);
        let doc = Uuid::new_v4();
        store.insert(doc, &pid("A"), "T", "C");
        store.share(doc, &pid("B"));
        Fixture { store, registry, relay, doc }
    }

    fn attach(f: &Fixture, id: &str) -> (ConnectionHandle, Outbound) {
        let (handle, outbound) = ConnectionHandle::channel(8);
        f.registry.attach(f.doc, pid(id), handle.clone());
        (handle, outbound)
    }

    #[tokio::test]
    async fn accepted_edit_reaches_others_only() {
        let f = fixture();
        let (a, mut a_out) = attach(&f, "A");
        let (_b, mut b_out) = attach(&f, "B");

        f.relay.submit(f.doc, &pid("A"), &a, "T2", "C2").await;

        assert_eq!(
            b_out.try_recv().unwrap(),
            r#"{"type":"document_update","title":"T2","content":"C2"}"#
        );
        assert!(a_out.try_recv().is_none());
    }

    #[tokio::test]
    async fn rejected_edit_goes_to_originator_only() {
        let f = fixture();
        let (a, mut a_out) = attach(&f, "A");
        let (_b, mut b_out) = attach(&f, "B");
        f.store.fail_with(Some(InjectedFailure::Transient));

        f.relay.submit(f.doc, &pid("A"), &a, "T2", "C2").await;

        assert_eq!(
            a_out.try_recv().unwrap(),
            r#"{"type":"error","error":"Failed to save document: document service unavailable"}"#
        );
        assert!(b_out.try_recv().is_none());
    }

    #[tokio::test]
    async fn forbidden_edit_is_reported_generically() {
        let f = fixture();
        let outcome = f.relay.apply(f.doc, &pid("Z"), "T2", "C2").await;
        match outcome {
            ApplyOutcome::Rejected(Envelope::Error { error }) => {
                assert_eq!(error, "Failed to save document: document not found or access denied")
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn external_update_reaches_everyone_when_attended() {
        let f = fixture();
        let snapshot = f.store.get(f.doc, &pid("A")).await.unwrap();
        assert_eq!(f.relay.notify_external_update(f.doc, &pid("A"), snapshot.clone()), 0);

        let (_a, mut a_out) = attach(&f, "A");
        let (_b, mut b_out) = attach(&f, "B");
        assert_eq!(f.relay.notify_external_update(f.doc, &pid("A"), snapshot), 2);

        let frame: serde_json::Value = serde_json::from_str(&a_out.try_recv().unwrap()).unwrap();
        assert_eq!(frame["type"], "document_updated_externally");
        assert_eq!(frame["user_id"], "A");
        assert!(b_out.try_recv().is_some());
    }

    #[tokio::test]
    async fn deletion_notifies_then_closes_everyone() {
        let f = fixture();
        let (a, mut a_out) = attach(&f, "A");
        let (b, mut b_out) = attach(&f, "B");

        assert_eq!(f.relay.notify_deleted(f.doc, &pid("A")), 2);

        assert_eq!(f.registry.count(f.doc), 0);
        assert!(a.is_closed() && b.is_closed());
        let expected = r#"{"type":"document_deleted","user_id":"A"}"#;
        assert_eq!(a_out.recv().await.unwrap(), expected);
        assert_eq!(b_out.recv().await.unwrap(), expected);
        assert!(a_out.recv().await.is_none());
    }
}
