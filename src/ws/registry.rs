//! Presence registry: which participants are attached to which document.

use std::collections::HashMap;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use uuid::Uuid;

use super::connection::ConnectionHandle;
use crate::models::{DocumentId, ParticipantId};

/// Participants of one document and their handles, in attach order.
pub type Participants = IndexMap<ParticipantId, ConnectionHandle>;

#[derive(Default)]
struct DocumentSession {
    participants: Participants,
    // Held while a broadcast walks the participants so two broadcasts on the
    // same document enqueue in one order for every recipient.
    delivery: Mutex<()>,
}

/// Result of [`PresenceRegistry::attach_with`].
#[derive(Debug)]
pub struct Attached {
    /// Participants attached after this attach, in attach order.
    pub active_users: Vec<ParticipantId>,
    /// The handle this participant held before re-attaching, if any.
    pub displaced: Option<ConnectionHandle>,
}

/// Document id -> (participant -> connection handle).
///
/// A document with no participants has no entry. Callbacks passed to the
/// iteration methods run under the registry lock and must not call back
/// into the registry.
#[derive(Default)]
pub struct PresenceRegistry {
    sessions: RwLock<HashMap<DocumentId, DocumentSession>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach `handle` as `participant` on `document`, replacing any previous handle.
    pub fn attach(
        &self,
        document: DocumentId,
        participant: ParticipantId,
        handle: ConnectionHandle,
    ) -> Vec<ParticipantId> {
        self.attach_with(document, participant, handle, |_| {}).active_users
    }

    /// Attach and run `on_attached` before any other registry operation can
    /// observe the new participant.
    ///
    /// `on_attached` sees every participant, the new one included. Anything it
    /// queues is ahead of every later broadcast on the document.
    pub fn attach_with<F>(
        &self,
        document: DocumentId,
        participant: ParticipantId,
        handle: ConnectionHandle,
        on_attached: F,
    ) -> Attached
    where
        F: FnOnce(&Participants),
    {
        let mut sessions = self.sessions.write();
        let session = sessions.entry(document).or_default();

        let displaced = session.participants.shift_remove(&participant);
        session.participants.insert(participant, handle);

        let active_users: Vec<ParticipantId> = session.participants.keys().cloned().collect();
        on_attached(&session.participants);

        Attached { active_users, displaced }
    }

    /// Remove `participant` from `document`. No-op when absent.
    pub fn detach(&self, document: DocumentId, participant: &ParticipantId) {
        let mut sessions = self.sessions.write();
        if let Some(session) = sessions.get_mut(&document) {
            session.participants.shift_remove(participant);
            if session.participants.is_empty() {
                sessions.remove(&document);
            }
        }
    }

    /// Remove `participant` only while it is still bound to connection
    /// `conn_id`, then run `on_detached` with the remaining participants
    /// before the lock is released.
    ///
    /// Returns whether an entry was removed. A participant that re-attached on
    /// a newer connection is left alone and `on_detached` does not run.
    pub fn detach_with<F>(
        &self,
        document: DocumentId,
        participant: &ParticipantId,
        conn_id: Uuid,
        on_detached: F,
    ) -> bool
    where
        F: FnOnce(&Participants),
    {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get_mut(&document) else {
            return false;
        };

        let matches = session
            .participants
            .get(participant)
            .is_some_and(|handle| handle.conn_id() == conn_id);
        if !matches {
            return false;
        }

        session.participants.shift_remove(participant);
        on_detached(&session.participants);
        if session.participants.is_empty() {
            sessions.remove(&document);
        }
        true
    }

    pub fn count(&self, document: DocumentId) -> usize {
        self.sessions
            .read()
            .get(&document)
            .map_or(0, |session| session.participants.len())
    }

    /// Visit every attached participant of `document`.
    pub fn for_each<F>(&self, document: DocumentId, mut visit: F)
    where
        F: FnMut(&ParticipantId, &ConnectionHandle),
    {
        let sessions = self.sessions.read();
        if let Some(session) = sessions.get(&document) {
            for (participant, handle) in &session.participants {
                visit(participant, handle);
            }
        }
    }

    /// Like [`for_each`](Self::for_each), serialized against other ordered
    /// walks of the same document.
    pub fn for_each_ordered<F>(&self, document: DocumentId, mut visit: F)
    where
        F: FnMut(&ParticipantId, &ConnectionHandle),
    {
        let sessions = self.sessions.read();
        if let Some(session) = sessions.get(&document) {
            let _delivery = session.delivery.lock();
            for (participant, handle) in &session.participants {
                visit(participant, handle);
            }
        }
    }

    /// Detach everyone from `document` at once and hand back their handles.
    pub fn take_document(&self, document: DocumentId) -> Vec<(ParticipantId, ConnectionHandle)> {
        self.sessions
            .write()
            .remove(&document)
            .map(|session| session.participants.into_iter().collect())
            .unwrap_or_default()
    }

    /// Number of documents with at least one participant.
    pub fn session_count(&self) -> usize {
        self.sessions.read().len()
    }

    /// Number of attached connections across all documents.
    pub fn connection_count(&self) -> usize {
        self.sessions
            .read()
            .values()
            .map(|session| session.participants.len())
            .sum()
    }
}

#[cfg(test)]
impl PresenceRegistry {
    pub(crate) fn is_attached(&self, document: DocumentId, participant: &ParticipantId) -> bool {
        self.sessions
            .read()
            .get(&document)
            .is_some_and(|session| session.participants.contains_key(participant))
    }

    /// Participants of `document` in attach order.
    fn participants(&self, document: DocumentId) -> Vec<ParticipantId> {
        self.sessions
            .read()
            .get(&document)
            .map(|session| session.participants.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Copy of the participants and handles currently attached to `document`.
    fn snapshot(&self, document: DocumentId) -> Vec<(ParticipantId, ConnectionHandle)> {
        self.sessions
            .read()
            .get(&document)
            .map(|session| {
                session
                    .participants
                    .iter()
                    .map(|(p, h)| (p.clone(), h.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
