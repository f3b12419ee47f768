//! Fan-out of envelopes to the participants of a document.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, warn};

use super::connection::{encode, ConnectionHandle, DeliveryError};
use super::registry::{Participants, PresenceRegistry};
use crate::models::{DocumentId, Envelope, ParticipantId};

#[derive(Debug, Default)]
pub struct BroadcastStats {
    pub messages_sent: AtomicU64,
    pub messages_dropped: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastStatsSnapshot {
    pub messages_sent: u64,
    pub messages_dropped: u64,
}

impl BroadcastStats {
    pub fn snapshot(&self) -> BroadcastStatsSnapshot {
        BroadcastStatsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }

    fn record(&self, result: Result<(), DeliveryError>) -> bool {
        match result {
            Ok(()) => {
                self.messages_sent.fetch_add(1, Ordering::Relaxed);
                true
            }
            Err(_) => {
                self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }
}

pub struct Broadcaster {
    registry: Arc<PresenceRegistry>,
    stats: BroadcastStats,
}

impl Broadcaster {
    pub fn new(registry: Arc<PresenceRegistry>) -> Self {
        Self {
            registry,
            stats: BroadcastStats::default(),
        }
    }

    pub fn stats(&self) -> BroadcastStatsSnapshot {
        self.stats.snapshot()
    }

    /// Send to every participant of `document` except `exclude`.
    ///
    /// Returns how many recipients accepted the envelope. A failed recipient
    /// is logged and skipped.
    pub fn to_others(&self, document: DocumentId, exclude: &ParticipantId, envelope: &Envelope) -> usize {
        self.deliver(document, Some(exclude), envelope)
    }

    /// Send to every participant of `document`.
    pub fn to_all(&self, document: DocumentId, envelope: &Envelope) -> usize {
        self.deliver(document, None, envelope)
    }

    /// Send to everyone in `participants` except `exclude`.
    ///
    /// For registry hooks, which already hold the lock and see the
    /// participants directly. Nothing else can broadcast on the document
    /// while the hook runs.
    pub fn to_others_of(
        &self,
        document: DocumentId,
        participants: &Participants,
        exclude: &ParticipantId,
        envelope: &Envelope,
    ) -> usize {
        let Ok(text) = encode(envelope) else {
            return 0;
        };
        let mut delivered = 0;
        for (participant, handle) in participants {
            if self.fan_out_one(document, Some(exclude), participant, handle, &text, envelope) {
                delivered += 1;
            }
        }
        self.log_fan_out(document, envelope, delivered);
        delivered
    }

    /// Send to a single connection.
    pub fn unicast(
        &self,
        handle: &ConnectionHandle,
        participant: &ParticipantId,
        envelope: &Envelope,
    ) -> Result<(), DeliveryError> {
        let result = handle.send(envelope);
        if let Err(e) = &result {
            warn!(
                "Failed to deliver '{}' to participant {}: {}",
                envelope.kind(),
                participant,
                e
            );
        }
        self.stats.record(result);
        result
    }

    fn deliver(&self, document: DocumentId, exclude: Option<&ParticipantId>, envelope: &Envelope) -> usize {
        let Ok(text) = encode(envelope) else {
            return 0;
        };

        let mut delivered = 0;
        self.registry.for_each_ordered(document, |participant, handle| {
            if self.fan_out_one(document, exclude, participant, handle, &text, envelope) {
                delivered += 1;
            }
        });
        self.log_fan_out(document, envelope, delivered);
        delivered
    }

    fn fan_out_one(
        &self,
        document: DocumentId,
        exclude: Option<&ParticipantId>,
        participant: &ParticipantId,
        handle: &ConnectionHandle,
        text: &str,
        envelope: &Envelope,
    ) -> bool {
        if exclude == Some(participant) {
            return false;
        }
        let result = handle.send_text(text.to_string());
        if let Err(e) = &result {
            warn!(
                "Failed to deliver '{}' to participant {} on document {}: {}",
                envelope.kind(),
                participant,
                document,
                e
            );
        }
        self.stats.record(result)
    }

    fn log_fan_out(&self, document: DocumentId, envelope: &Envelope, delivered: usize) {
        debug!(
            "Broadcast '{}' on document {} reached {} participant(s)",
            envelope.kind(),
            document,
            delivered
        );
    }
}
