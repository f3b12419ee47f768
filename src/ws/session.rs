//! Per-connection protocol: authorize, sync, relay, tear down.

use std::fmt::{self, Display};

use axum::extract::ws::Message;
use axum::http::StatusCode;
use futures_util::{Sink, Stream, StreamExt};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use super::connection::{run_writer, ConnectionHandle, DeliveryError};
use crate::auth::AuthError;
use crate::models::{parse_inbound, ApiError, DocumentId, DocumentSnapshot, Envelope, ErrorResponse, InboundError, ParticipantId};
use crate::services::doc_store::StoreError;
use crate::state::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Authorizing,
    Syncing,
    Active,
    Closing,
    Closed,
}

impl Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Authorizing => "authorizing",
            SessionState::Syncing => "syncing",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// State of one connection's session.
#[derive(Debug)]
pub struct SessionLifecycle {
    document: DocumentId,
    state: SessionState,
}

impl SessionLifecycle {
    pub fn new(document: DocumentId) -> Self {
        Self { document, state: SessionState::Connecting }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn document(&self) -> DocumentId {
        self.document
    }

    pub fn transition(&mut self, next: SessionState) -> Result<(), InvalidTransition> {
        use SessionState::*;
        let allowed = matches!(
            (self.state, next),
            (Connecting, Authorizing)
                | (Authorizing, Syncing)
                | (Authorizing, Closed)
                | (Syncing, Active)
                | (Syncing, Closed)
                | (Active, Closing)
                | (Closing, Closed)
        );
        if !allowed {
            return Err(InvalidTransition { from: self.state, to: next });
        }
        debug!("Session on document {}: {} -> {}", self.document, self.state, next);
        self.state = next;
        Ok(())
    }

    fn advance(&mut self, next: SessionState) {
        if let Err(e) = self.transition(next) {
            error!("{} on document {}", e, self.document);
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    AuthFailure(#[from] AuthError),
    #[error("document not found or access denied")]
    NotFoundOrForbidden,
    #[error("document store failure: {0}")]
    TransientStoreFailure(#[source] StoreError),
    #[error("delivery to peer failed: {0}")]
    PeerDeliveryFailure(#[from] DeliveryError),
    #[error("malformed message: {0}")]
    MalformedMessage(#[from] InboundError),
}

impl From<StoreError> for SessionError {
    fn from(e: StoreError) -> Self {
        if e.is_not_found_or_forbidden() {
            SessionError::NotFoundOrForbidden
        } else {
            SessionError::TransientStoreFailure(e)
        }
    }
}

impl SessionError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            SessionError::AuthFailure(e) => e.status_code(),
            SessionError::NotFoundOrForbidden => StatusCode::NOT_FOUND,
            SessionError::TransientStoreFailure(_) => StatusCode::SERVICE_UNAVAILABLE,
            SessionError::PeerDeliveryFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SessionError::MalformedMessage(_) => StatusCode::BAD_REQUEST,
        }
    }

    /// Rejection returned instead of an upgrade.
    pub fn to_api_error(&self) -> ApiError {
        match self {
            SessionError::AuthFailure(e) => e.to_api_error(),
            SessionError::NotFoundOrForbidden => ErrorResponse::reply(self.status_code(), "Document not found"),
            SessionError::TransientStoreFailure(e) => ErrorResponse::reply(self.status_code(), e.client_message()),
            _ => ErrorResponse::reply(self.status_code(), "Session could not be opened"),
        }
    }
}

/// An authorized participant and the snapshot they will be synced with.
#[derive(Debug)]
pub struct PendingSession {
    lifecycle: SessionLifecycle,
    participant: ParticipantId,
    snapshot: DocumentSnapshot,
}

impl PendingSession {
    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    pub fn snapshot(&self) -> &DocumentSnapshot {
        &self.snapshot
    }
}

/// Authenticate and fetch the document before the transport is upgraded.
///
/// Failing here leaves no trace in the registry.
pub async fn prepare(
    state: &AppState,
    document: DocumentId,
    credential: Option<&str>,
) -> Result<PendingSession, SessionError> {
    let mut lifecycle = SessionLifecycle::new(document);
    lifecycle.advance(SessionState::Authorizing);

    let validated = match credential {
        Some(credential) => state.authenticator.validate(credential).await,
        None => Err(AuthError::MissingCredential),
    };
    let participant = match validated {
        Ok(participant) => participant,
        Err(e) => {
            warn!("Rejected connection to document {}: {}", document, e);
            lifecycle.advance(SessionState::Closed);
            return Err(e.into());
        }
    };

    lifecycle.advance(SessionState::Syncing);
    let snapshot = match state.store.get(document, &participant).await {
        Ok(snapshot) => snapshot,
        Err(e) => {
            if e.is_not_found_or_forbidden() {
                warn!("Participant {} cannot open document {}: {}", participant, document, e);
            } else {
                error!("Failed to load document {} for {}: {}", document, participant, e);
            }
            lifecycle.advance(SessionState::Closed);
            return Err(e.into());
        }
    };

    Ok(PendingSession { lifecycle, participant, snapshot })
}

// Runs exactly once per connection, whichever way the session ends.
struct SessionTeardown {
    state: AppState,
    lifecycle: SessionLifecycle,
    participant: ParticipantId,
    handle: ConnectionHandle,
}

impl Drop for SessionTeardown {
    fn drop(&mut self) {
        let document = self.lifecycle.document();
        if self.lifecycle.state() == SessionState::Active {
            self.lifecycle.advance(SessionState::Closing);
        }

        self.handle.close();

        let broadcaster = &self.state.broadcaster;
        let participant = &self.participant;
        self.state
            .registry
            .detach_with(document, participant, self.handle.conn_id(), |remaining| {
                broadcaster.to_others_of(
                    document,
                    remaining,
                    participant,
                    &Envelope::UserLeft { user_id: participant.clone() },
                );
            });

        self.lifecycle.advance(SessionState::Closed);
        info!("Participant {} left document {}", self.participant, document);
    }
}

/// Drive an upgraded connection until it closes.
pub async fn run<St, Si>(state: AppState, pending: PendingSession, mut stream: St, sink: Si)
where
    St: Stream<Item = Result<Message, axum::Error>> + Unpin + Send,
    Si: Sink<Message> + Unpin + Send + 'static,
    Si::Error: Display,
{
    let PendingSession { lifecycle, participant, snapshot } = pending;
    let document = lifecycle.document();

    let (handle, outbound) = ConnectionHandle::channel(state.outbound_queue_capacity);
    let conn_id = handle.conn_id();
    let writer = tokio::spawn(run_writer(sink, outbound, conn_id));

    let mut init_sent = Ok(());
    let broadcaster = &state.broadcaster;
    let attached = state.registry.attach_with(document, participant.clone(), handle.clone(), |participants| {
        init_sent = handle.send(&Envelope::Init {
            document: snapshot,
            active_users: participants.keys().cloned().collect(),
        });
        broadcaster.to_others_of(
            document,
            participants,
            &participant,
            &Envelope::UserJoined { user_id: participant.clone() },
        );
    });

    let mut teardown = SessionTeardown {
        state: state.clone(),
        lifecycle,
        participant: participant.clone(),
        handle: handle.clone(),
    };
    teardown.lifecycle.advance(SessionState::Active);

    if let Some(displaced) = attached.displaced {
        info!(
            "Participant {} re-attached to document {}, closing connection {}",
            participant,
            document,
            displaced.conn_id()
        );
        displaced.close();
    }
    if let Err(e) = init_sent {
        warn!("{}", SessionError::from(e));
    }

    info!(
        "Participant {} joined document {} ({} attached)",
        participant,
        document,
        attached.active_users.len()
    );

    let closed = handle.closed();
    tokio::pin!(closed);

    loop {
        tokio::select! {
            _ = &mut closed => {
                debug!("Connection {} closed by server", conn_id);
                break;
            }
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    dispatch(&state, document, &participant, &handle, &text).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    debug!("Receive error on connection {}: {}", conn_id, e);
                    break;
                }
            }
        }
    }

    drop(teardown);
    if let Err(e) = writer.await {
        error!("Writer task for connection {} failed: {}", conn_id, e);
    }
}

async fn dispatch(
    state: &AppState,
    document: DocumentId,
    participant: &ParticipantId,
    handle: &ConnectionHandle,
    text: &str,
) {
    match parse_inbound(text) {
        Ok(Envelope::DocumentUpdate { title, content }) => {
            state.relay.submit(document, participant, handle, &title, &content).await;
        }
        Ok(envelope @ (Envelope::CursorPosition { .. } | Envelope::Selection { .. })) => {
            state.broadcaster.to_others(document, participant, &envelope);
        }
        Ok(Envelope::Ping) => {
            let _ = state.broadcaster.unicast(handle, participant, &Envelope::Pong);
        }
        Ok(other) => {
            warn!("Dropping '{}' message from {}", other.kind(), participant);
        }
        Err(e) => {
            warn!("Dropping message from {} on document {}: {}", participant, document, SessionError::from(e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::Duration as TokenTtl;
    use futures_util::{sink, stream};
    use tokio::sync::mpsc;
    use uuid::Uuid;

    use crate::auth::JwtAuthenticator;
    use crate::db::{InjectedFailure, MemoryDocumentStore};

    const SECRET: &str = "session-test-secret";

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    struct Harness {
        state: AppState,
        store: Arc<MemoryDocumentStore>,
        jwt: JwtAuthenticator,
        doc: DocumentId,
    }

    fn harness() -> Harness {
        let jwt = JwtAuthenticator::new(SECRET).unwrap();
        let store = Arc::new(MemoryDocumentStore::new());
        let doc = Uuid::new_v4();
        store.insert(doc, &pid("A"), "T", "C");
        store.share(doc, &pid("B"));
        let state = AppState::new(Arc::new(jwt.clone()), store.clone(), 32);
        Harness { state, store, jwt, doc }
    }

    impl Harness {
        fn token(&self, user: &str) -> String {
            self.jwt.issue_token(user, TokenTtl::minutes(5)).unwrap()
        }
    }

    /// Client side of an in-memory connection.
    struct Client {
        to_server: mpsc::UnboundedSender<Result<Message, axum::Error>>,
        from_server: mpsc::UnboundedReceiver<Message>,
        worker: tokio::task::JoinHandle<()>,
    }

    impl Client {
        fn send(&self, text: &str) {
            self.to_server.send(Ok(Message::Text(text.to_string()))).unwrap();
        }

        async fn next_json(&mut self) -> serde_json::Value {
            match tokio::time::timeout(Duration::from_secs(2), self.from_server.recv()).await {
                Ok(Some(Message::Text(text))) => serde_json::from_str(&text).unwrap(),
                other => panic!("expected a text frame, got {:?}", other),
            }
        }

        async fn assert_silent(&mut self) {
            let next = tokio::time::timeout(Duration::from_millis(100), self.from_server.recv()).await;
            assert!(next.is_err(), "unexpected frame: {:?}", next);
        }

        async fn disconnect(self) {
            self.to_server.send(Ok(Message::Close(None))).unwrap();
            self.worker.await.unwrap();
        }
    }

    async fn connect(h: &Harness, user: &str) -> Client {
        let pending = prepare(&h.state, h.doc, Some(h.token(user).as_str())).await.unwrap();

        let (to_server, inbound) = mpsc::unbounded_channel();
        let (outbound, from_server) = mpsc::unbounded_channel();
        let stream = Box::pin(stream::unfold(inbound, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }));
        let sink = Box::pin(sink::unfold(outbound, |tx, msg: Message| async move {
            tx.send(msg).map_err(|_| "client gone")?;
            Ok::<_, &'static str>(tx)
        }));

        let worker = tokio::spawn(run(h.state.clone(), pending, stream, sink));
        Client { to_server, from_server, worker }
    }

    #[test]
    fn lifecycle_allows_only_forward_transitions() {
        let mut lifecycle = SessionLifecycle::new(Uuid::new_v4());
        assert!(lifecycle.transition(SessionState::Active).is_err());
        lifecycle.transition(SessionState::Authorizing).unwrap();
        lifecycle.transition(SessionState::Syncing).unwrap();
        lifecycle.transition(SessionState::Active).unwrap();
        assert_eq!(
            lifecycle.transition(SessionState::Syncing),
            Err(InvalidTransition { from: SessionState::Active, to: SessionState::Syncing })
        );
        lifecycle.transition(SessionState::Closing).unwrap();
        lifecycle.transition(SessionState::Closed).unwrap();
        assert!(lifecycle.transition(SessionState::Closing).is_err());
    }

    #[tokio::test]
    async fn prepare_rejects_bad_credentials_without_registry_effect() {
        let h = harness();
        let missing = prepare(&h.state, h.doc, None).await.unwrap_err();
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

        let invalid = prepare(&h.state, h.doc, Some("not-a-token")).await.unwrap_err();
        assert!(matches!(invalid, SessionError::AuthFailure(_)));
        assert_eq!(h.state.registry.session_count(), 0);
    }

    #[tokio::test]
    async fn prepare_maps_store_failures() {
        let h = harness();
        let unknown = prepare(&h.state, Uuid::new_v4(), Some(h.token("A").as_str())).await.unwrap_err();
        assert_eq!(unknown.status_code(), StatusCode::NOT_FOUND);

        let stranger = prepare(&h.state, h.doc, Some(h.token("Z").as_str())).await.unwrap_err();
        assert!(matches!(stranger, SessionError::NotFoundOrForbidden));

        h.store.fail_with(Some(InjectedFailure::Transient));
        let transient = prepare(&h.state, h.doc, Some(h.token("A").as_str())).await.unwrap_err();
        assert_eq!(transient.status_code(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(transient.to_api_error().1.0.error, "document service unavailable");
        assert_eq!(h.state.registry.count(h.doc), 0);
    }

    #[tokio::test]
    async fn two_participants_collaborate() {
        let h = harness();

        let mut a = connect(&h, "A").await;
        let init = a.next_json().await;
        assert_eq!(init["type"], "init");
        assert_eq!(init["active_users"], serde_json::json!(["A"]));
        assert_eq!(init["document"]["title"], "T");

        let mut b = connect(&h, "B").await;
        let init = b.next_json().await;
        assert_eq!(init["active_users"], serde_json::json!(["A", "B"]));
        assert_eq!(a.next_json().await, serde_json::json!({"type": "user_joined", "user_id": "B"}));

        a.send(r#"{"type":"document_update","title":"T2","content":"C2"}"#);
        assert_eq!(
            b.next_json().await,
            serde_json::json!({"type": "document_update", "title": "T2", "content": "C2"})
        );
        a.assert_silent().await;

        b.disconnect().await;
        assert_eq!(a.next_json().await, serde_json::json!({"type": "user_left", "user_id": "B"}));
        assert_eq!(h.state.registry.count(h.doc), 1);
    }

    #[tokio::test]
    async fn ping_cursor_and_garbage() {
        let h = harness();
        let mut a = connect(&h, "A").await;
        let mut b = connect(&h, "B").await;
        a.next_json().await;
        a.next_json().await;
        b.next_json().await;

        a.send("not json");
        a.send(r#"{"type":"teleport"}"#);
        a.send(r#"{"type":"ping"}"#);
        assert_eq!(a.next_json().await, serde_json::json!({"type": "pong"}));

        a.send(r#"{"type":"cursor_position","position":7}"#);
        assert_eq!(b.next_json().await, serde_json::json!({"type": "cursor_position", "position": 7}));
        a.assert_silent().await;
    }

    #[tokio::test]
    async fn failed_edit_is_reported_to_sender_only() {
        let h = harness();
        let mut a = connect(&h, "A").await;
        let mut b = connect(&h, "B").await;
        a.next_json().await;
        a.next_json().await;
        b.next_json().await;

        h.store.fail_with(Some(InjectedFailure::Transient));
        a.send(r#"{"type":"document_update","title":"T2","content":"C2"}"#);

        let reply = a.next_json().await;
        assert_eq!(reply["type"], "error");
        assert_eq!(reply["error"], "Failed to save document: document service unavailable");
        b.assert_silent().await;

        a.send(r#"{"type":"ping"}"#);
        assert_eq!(a.next_json().await["type"], "pong");
    }

    #[tokio::test]
    async fn reattach_replaces_previous_connection_quietly() {
        let h = harness();
        let mut b = connect(&h, "B").await;
        b.next_json().await;

        let mut first = connect(&h, "A").await;
        first.next_json().await;
        b.next_json().await;

        let mut second = connect(&h, "A").await;
        let init = second.next_json().await;
        assert_eq!(init["active_users"], serde_json::json!(["B", "A"]));

        assert!(matches!(first.from_server.recv().await, Some(Message::Close(None))));
        first.worker.await.unwrap();

        assert_eq!(b.next_json().await["type"], "user_joined");
        b.assert_silent().await;
        assert!(h.state.registry.is_attached(h.doc, &pid("A")));
        assert_eq!(h.state.registry.count(h.doc), 2);
    }

    #[tokio::test]
    async fn deletion_closes_every_session() {
        let h = harness();
        let mut a = connect(&h, "A").await;
        let mut b = connect(&h, "B").await;
        a.next_json().await;
        a.next_json().await;
        b.next_json().await;

        h.state.relay.notify_deleted(h.doc, &pid("A"));

        assert_eq!(a.next_json().await, serde_json::json!({"type": "document_deleted", "user_id": "A"}));
        assert_eq!(b.next_json().await, serde_json::json!({"type": "document_deleted", "user_id": "A"}));
        assert!(matches!(a.from_server.recv().await, Some(Message::Close(None))));
        a.worker.await.unwrap();
        b.worker.await.unwrap();
        assert_eq!(h.state.registry.session_count(), 0);
    }
}
