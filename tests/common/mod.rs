//! Shared fixtures: a full server on an ephemeral port backed by the memory store.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use penfeel_collab::auth::JwtAuthenticator;
use penfeel_collab::db::MemoryDocumentStore;
use penfeel_collab::models::ParticipantId;
use penfeel_collab::{build_router, AppState, Config};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use uuid::Uuid;

pub const SECRET: &str = "integration-secret";

pub type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub store: Arc<MemoryDocumentStore>,
    pub jwt: JwtAuthenticator,
    /// Owned by "A", shared with "B".
    pub doc: Uuid,
}

pub fn pid(id: &str) -> ParticipantId {
    ParticipantId::new(id).unwrap()
}

pub fn test_state() -> (AppState, Arc<MemoryDocumentStore>, JwtAuthenticator, Uuid) {
    let jwt = JwtAuthenticator::new(SECRET).unwrap();
    let store = Arc::new(MemoryDocumentStore::new());
    let doc = Uuid::new_v4();
    store.insert(doc, &pid("A"), "T", "C");
    store.share(doc, &pid("B"));
    let state = AppState::new(Arc::new(jwt.clone()), store.clone(), 64);
    (state, store, jwt, doc)
}

pub async fn spawn_server() -> TestServer {
    let (state, store, jwt, doc) = test_state();
    let app = build_router(state.clone(), &Config::default());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state, store, jwt, doc }
}

impl TestServer {
    pub fn token(&self, user: &str) -> String {
        self.jwt.issue_token(user, chrono::Duration::minutes(5)).unwrap()
    }

    pub fn ws_url(&self, doc: Uuid, token: &str) -> String {
        format!("ws://{}/api/v1/documents/{}/ws?token={}", self.addr, doc, token)
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn connect(&self, user: &str) -> Socket {
        let (socket, _) = connect_async(self.ws_url(self.doc, &self.token(user))).await.unwrap();
        socket
    }
}

/// Next JSON text frame, failing the test after two seconds.
pub async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection ended")
            .expect("transport error");
        match frame {
            Message::Text(_) => return serde_json::from_str(frame.to_text().unwrap()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("expected a text frame, got {:?}", other),
        }
    }
}

/// Assert nothing arrives for a short while.
pub async fn assert_silent(socket: &mut Socket) {
    let next = tokio::time::timeout(Duration::from_millis(150), socket.next()).await;
    assert!(next.is_err(), "unexpected frame: {:?}", next);
}

pub async fn send_json(socket: &mut Socket, value: Value) {
    socket.send(Message::text(value.to_string())).await.unwrap();
}

/// Wait until the server answers the socket with a close frame or drops it.
pub async fn expect_closed(socket: &mut Socket) {
    loop {
        match tokio::time::timeout(Duration::from_secs(2), socket.next())
            .await
            .expect("timed out waiting for close")
        {
            Some(Ok(Message::Close(_))) | None | Some(Err(_)) => return,
            Some(Ok(_)) => continue,
        }
    }
}

/// Poll `check` until it holds or a second passes.
pub async fn eventually(mut check: impl FnMut() -> bool) {
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(check(), "condition not reached in time");
}
