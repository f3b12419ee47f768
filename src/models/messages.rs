use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use super::{DocumentSnapshot, ParticipantId};

/// A typed message exchanged over a collaboration connection.
///
/// Serialized as a flat JSON object whose `type` field names the kind.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Envelope {
    Init {
        document: DocumentSnapshot,
        active_users: Vec<ParticipantId>,
    },
    UserJoined {
        user_id: ParticipantId,
    },
    UserLeft {
        user_id: ParticipantId,
    },
    DocumentUpdate {
        title: String,
        content: String,
    },
    DocumentUpdatedExternally {
        document: DocumentSnapshot,
        user_id: ParticipantId,
    },
    CursorPosition {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    Selection {
        #[serde(flatten)]
        fields: Map<String, Value>,
    },
    DocumentDeleted {
        user_id: ParticipantId,
    },
    Ping,
    Pong,
    Error {
        error: String,
    },
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Init { .. } => "init",
            Envelope::UserJoined { .. } => "user_joined",
            Envelope::UserLeft { .. } => "user_left",
            Envelope::DocumentUpdate { .. } => "document_update",
            Envelope::DocumentUpdatedExternally { .. } => "document_updated_externally",
            Envelope::CursorPosition { .. } => "cursor_position",
            Envelope::Selection { .. } => "selection",
            Envelope::DocumentDeleted { .. } => "document_deleted",
            Envelope::Ping => "ping",
            Envelope::Pong => "pong",
            Envelope::Error { .. } => "error",
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Envelope::Error { error: message.into() }
    }
}

/// Kinds a client is allowed to send.
const INBOUND_KINDS: &[&str] = &["document_update", "cursor_position", "selection", "ping"];

#[derive(Debug, Error)]
pub enum InboundError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),
    #[error("message has no string 'type' field")]
    MissingType,
    #[error("unrecognized message type '{0}'")]
    Unrecognized(String),
    #[error("invalid '{kind}' message: {source}")]
    Malformed {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Parse one inbound text frame.
///
/// Kinds outside of what a client may send are reported as
/// [`InboundError::Unrecognized`] even when the server knows them.
pub fn parse_inbound(text: &str) -> Result<Envelope, InboundError> {
    let value: Value = serde_json::from_str(text).map_err(InboundError::NotJson)?;
    let kind = value
        .get("type")
        .and_then(Value::as_str)
        .ok_or(InboundError::MissingType)?
        .to_string();

    if !INBOUND_KINDS.contains(&kind.as_str()) {
        return Err(InboundError::Unrecognized(kind));
    }

    serde_json::from_value(value).map_err(|source| InboundError::Malformed { kind, source })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use uuid::Uuid;

    fn pid(id: &str) -> ParticipantId {
        ParticipantId::new(id).unwrap()
    }

    #[test]
    fn init_has_exact_wire_shape() {
        let now = Utc::now();
        let doc_id = Uuid::new_v4();
        let env = Envelope::Init {
            document: DocumentSnapshot {
                id: doc_id,
                title: "T".into(),
                content: "C".into(),
                owner: "A".into(),
                created_at: now,
                updated_at: now,
            },
            active_users: vec![pid("A"), pid("B")],
        };

        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "init");
        assert_eq!(value["active_users"], json!(["A", "B"]));
        assert_eq!(value["document"]["id"], json!(doc_id));
        assert_eq!(value["document"]["title"], "T");
        assert_eq!(value.as_object().unwrap().len(), 3);
    }

    #[test]
    fn presence_and_control_shapes() {
        assert_eq!(
            serde_json::to_value(Envelope::UserJoined { user_id: pid("B") }).unwrap(),
            json!({"type": "user_joined", "user_id": "B"})
        );
        assert_eq!(
            serde_json::to_value(Envelope::DocumentDeleted { user_id: pid("A") }).unwrap(),
            json!({"type": "document_deleted", "user_id": "A"})
        );
        assert_eq!(serde_json::to_value(Envelope::Pong).unwrap(), json!({"type": "pong"}));
        assert_eq!(
            serde_json::to_value(Envelope::error("nope")).unwrap(),
            json!({"type": "error", "error": "nope"})
        );
    }

    #[test]
    fn parses_document_update() {
        let env = parse_inbound(r#"{"type":"document_update","title":"T2","content":"C2"}"#).unwrap();
        assert_eq!(
            env,
            Envelope::DocumentUpdate { title: "T2".into(), content: "C2".into() }
        );
    }

    #[test]
    fn cursor_fields_pass_through_untouched() {
        let raw = json!({"type": "cursor_position", "position": 12, "meta": {"color": "red"}});
        let env = parse_inbound(&raw.to_string()).unwrap();
        assert!(matches!(env, Envelope::CursorPosition { .. }));
        assert_eq!(serde_json::to_value(&env).unwrap(), raw);
    }

    #[test]
    fn ping_needs_no_payload() {
        assert_eq!(parse_inbound(r#"{"type":"ping"}"#).unwrap(), Envelope::Ping);
    }

    #[test]
    fn rejects_bad_frames() {
        assert!(matches!(parse_inbound("ping"), Err(InboundError::NotJson(_))));
        assert!(matches!(parse_inbound(r#"{"title":"x"}"#), Err(InboundError::MissingType)));
        assert!(matches!(
            parse_inbound(r#"{"type":"document_update","title":"x"}"#),
            Err(InboundError::Malformed { .. })
        ));
    }

    #[test]
    fn server_only_kinds_are_unrecognized() {
        assert!(matches!(
            parse_inbound(r#"{"type":"init"}"#),
            Err(InboundError::Unrecognized(kind)) if kind == "init"
        ));
        assert!(matches!(
            parse_inbound(r#"{"type":"wave"}"#),
            Err(InboundError::Unrecognized(kind)) if kind == "wave"
        ));
    }
}
