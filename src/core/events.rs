//! Wire protocol: events exchanged with clients over the websocket
//! transport, plus the internal pairing notification type.
//!
//! Frames are JSON objects tagged with a `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::profile::{AgeBand, ChatType, Gender, RawPreferences, RawProfile};

/// Client-to-server events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Declare an anonymous profile; creates the session
    Register { profile: RawProfile },

    /// Partial profile update
    UpdateProfile { profile: RawProfile },

    /// Enter the matching queue
    FindMatch { preferences: RawPreferences },

    /// Leave the matching queue
    CancelSearch,

    /// Text message to the current room's peer
    ChatMessage { text: String },

    /// WebRTC negotiation blobs, forwarded opaquely
    WebrtcOffer { payload: Value },
    WebrtcAnswer { payload: Value },
    IceCandidate { payload: Value },

    /// Peer-to-peer media channel lifecycle, reported by the client
    WebrtcConnected,
    WebrtcDisconnected,

    /// Client-observed media quality problem
    QualityIssue { detail: String },

    TypingStart,
    TypingStop,

    /// Report the current peer
    Report { reason: String },

    /// End the current chat
    EndChat,
}

/// Server-to-client events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Registered {
        user_id: String,
        online_count: usize,
    },
    ProfileUpdated,
    OnlineCount {
        count: usize,
    },
    Queued {
        position: i64,
        online_count: usize,
    },
    SearchCancelled,
    MatchFound {
        room_id: String,
        chat_type: ChatType,
        peer: PeerInfo,
    },
    ChatMessage {
        sender_type: String,
        text: String,
        sequence: u64,
        timestamp: DateTime<Utc>,
    },
    MessageSent {
        sequence: u64,
    },
    PeerTyping {
        typing: bool,
    },
    WebrtcOffer {
        sender_id: String,
        payload: Value,
    },
    WebrtcAnswer {
        sender_id: String,
        payload: Value,
    },
    IceCandidate {
        sender_id: String,
        payload: Value,
    },
    ReportSubmitted,
    Ended {
        reason: String,
        duration_seconds: u64,
        message_count: usize,
    },
    SessionExpired,
    Stats {
        online_users: usize,
        active_rooms: usize,
    },
    Error {
        code: String,
        message: String,
    },
}

impl ServerEvent {
    /// Events after which the transport is closed by the server.
    pub fn closes_connection(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

/// What a matched user learns about the stranger on the other side.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub gender: Gender,
    pub age: AgeBand,
    pub location: Option<String>,
    pub shared_interests: usize,
}

/// Posted by the match loop, consumed by the dispatcher.
#[derive(Debug, Clone)]
pub struct MatchPair {
    pub user_a: String,
    pub user_b: String,
    pub chat_type: ChatType,
    pub wait_a_ms: i64,
    pub wait_b_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let frame = r#"{"type":"chat_message","text":"hi"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::ChatMessage { ref text } if text == "hi"));

        let frame = r#"{"type":"find_match","preferences":{"gender":"any","chat_type":"text"}}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::FindMatch { .. }));

        let frame = r#"{"type":"typing_start"}"#;
        let event: ClientEvent = serde_json::from_str(frame).unwrap();
        assert!(matches!(event, ClientEvent::TypingStart));
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::Queued {
            position: 3,
            online_count: 7,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "queued");
        assert_eq!(json["position"], 3);

        let event = ServerEvent::Ended {
            reason: "stranger_left".to_string(),
            duration_seconds: 42,
            message_count: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "ended");
        assert_eq!(json["reason"], "stranger_left");
    }

    #[test]
    fn test_signaling_payload_roundtrips_verbatim() {
        let payload = serde_json::json!({"sdp": "v=0...", "nested": {"a": [1, 2, 3]}});
        let event = ServerEvent::WebrtcOffer {
            sender_id: "u1".to_string(),
            payload: payload.clone(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["payload"], payload);
    }
}
