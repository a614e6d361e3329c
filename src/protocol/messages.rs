//! # Protocol Messages
//!
//! Typed representations of the AudioHook JSON envelope and its per-kind
//! parameter payloads, plus the two codec entry points:
//!
//! - [`parse_client_message`]: resolve the `type` discriminator first, then
//!   structurally validate the parameters for that kind. Unrecognized
//!   discriminators produce [`ClientMessageBody::Unknown`] so the caller can
//!   log them without ever routing them into protocol logic.
//! - [`ServerMessage`]: outbound envelope built by the session actor with the
//!   sequence numbers it owns.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version carried in every envelope.
pub const PROTOCOL_VERSION: &str = "2";

/// Server-to-client message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMessageType {
    Opened,
    Pong,
    Updated,
    Closed,
    Disconnect,
    Event,
}

/// Reason codes for a server-initiated `disconnect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisconnectReason {
    Unauthorized,
    Error,
}

/// Reason codes the client supplies on `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloseReason {
    End,
    Error,
    Disconnect,
    #[serde(other)]
    Unknown,
}

/// One negotiated media channel descriptor. Immutable for the life of the
/// session once echoed back in `opened`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaChannel {
    #[serde(rename = "type")]
    pub media_type: String,
    #[serde(rename = "format")]
    pub codec: String,
    #[serde(rename = "rate")]
    pub sample_rate: u32,
    /// Ordered channel labels, e.g. `["external", "internal"]`.
    pub channels: Vec<String>,
}

/// Caller/callee identity carried on `open`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParticipantInfo {
    pub ani: String,
    #[serde(rename = "aniName")]
    pub ani_name: String,
    pub dnis: String,
}

/// Parameters of a client `open` message.
#[derive(Debug, Clone, Deserialize)]
pub struct OpenParameters {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub participant: ParticipantInfo,
    pub media: Vec<MediaChannel>,
    #[serde(default)]
    pub language: Option<String>,
}

/// Parameters of a client `ping` message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PingParameters {
    /// Round-trip time the client measured for the previous ping, as a
    /// duration string.
    pub rtt: Option<String>,
}

/// Parameters of a client `update` message.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateParameters {
    pub language: String,
}

/// Parameters of a client `close` message.
#[derive(Debug, Clone, Deserialize)]
pub struct CloseParameters {
    pub reason: CloseReason,
}

/// Parameters of a server `opened` reply.
#[derive(Debug, Clone, Serialize)]
pub struct OpenedParameters {
    #[serde(rename = "startPaused")]
    pub start_paused: bool,
    pub media: Vec<MediaChannel>,
}

/// Parameters of a server `disconnect` message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisconnectParameters {
    pub reason: DisconnectReason,
    pub info: String,
}

/// The kind-specific payload of a parsed client message.
#[derive(Debug, Clone)]
pub enum ClientMessageBody {
    Open(OpenParameters),
    Ping(PingParameters),
    Update(UpdateParameters),
    Close(CloseParameters),
    /// Unrecognized `type` discriminator. Kept only so the caller can log it;
    /// never reaches routing logic.
    Unknown { kind: String },
}

/// A validated inbound client message: common envelope fields plus the typed
/// per-kind payload.
#[derive(Debug, Clone)]
pub struct ClientMessage {
    pub version: String,
    pub id: String,
    pub seq: u64,
    /// The last server sequence number the client observed.
    pub serverseq: u64,
    /// Cursor into the audio timeline, as a duration string.
    pub position: String,
    pub body: ClientMessageBody,
}

/// Raw envelope used during the two-phase parse: discriminator first,
/// structural validation of `parameters` second.
#[derive(Debug, Deserialize)]
struct RawClientEnvelope {
    version: String,
    id: String,
    #[serde(rename = "type")]
    kind: String,
    seq: u64,
    #[serde(default)]
    serverseq: u64,
    #[serde(default)]
    position: String,
    #[serde(default)]
    parameters: Value,
}

/// Parse an inbound text frame into a typed [`ClientMessage`].
///
/// Resolution order matches the protocol: the `type` field selects the
/// message kind, and only then are the parameters validated against that
/// kind's schema. A malformed envelope or malformed parameters for a known
/// kind is an error (the caller logs and drops the frame); an unknown kind is
/// not an error and parses into [`ClientMessageBody::Unknown`].
pub fn parse_client_message(text: &str) -> Result<ClientMessage, serde_json::Error> {
    let raw: RawClientEnvelope = serde_json::from_str(text)?;

    let body = match raw.kind.as_str() {
        "open" => ClientMessageBody::Open(serde_json::from_value(raw.parameters)?),
        "ping" => ClientMessageBody::Ping(serde_json::from_value(raw.parameters)?),
        "update" => ClientMessageBody::Update(serde_json::from_value(raw.parameters)?),
        "close" => ClientMessageBody::Close(serde_json::from_value(raw.parameters)?),
        other => ClientMessageBody::Unknown {
            kind: other.to_string(),
        },
    };

    Ok(ClientMessage {
        version: raw.version,
        id: raw.id,
        seq: raw.seq,
        serverseq: raw.serverseq,
        position: raw.position,
        body,
    })
}

/// Outbound server message envelope.
///
/// `seq` is the server-owned counter, incremented exactly once per outbound
/// message by the session actor before this envelope is built; `clientseq`
/// acknowledges the most recent client sequence number observed.
#[derive(Debug, Clone, Serialize)]
pub struct ServerMessage {
    pub version: &'static str,
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ServerMessageType,
    pub seq: u64,
    pub clientseq: u64,
    pub parameters: Value,
}

impl ServerMessage {
    pub fn new(
        id: impl Into<String>,
        kind: ServerMessageType,
        seq: u64,
        clientseq: u64,
        parameters: Value,
    ) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            id: id.into(),
            kind,
            seq,
            clientseq,
            parameters,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn open_frame() -> String {
        json!({
            "version": "2",
            "type": "open",
            "seq": 1,
            "serverseq": 0,
            "id": "e160e428-53e2-487c-977d-96989bf5c99d",
            "position": "PT0S",
            "parameters": {
                "conversationId": "090eaa2f-72fa-480a-83e0-8667ff89c0ec",
                "participant": {
                    "ani": "+1-555-555-1234",
                    "aniName": "John Doe",
                    "dnis": "+1-800-555-6789"
                },
                "media": [
                    {
                        "type": "audio",
                        "format": "PCMU",
                        "channels": ["external", "internal"],
                        "rate": 8000
                    }
                ],
                "language": "en-US"
            }
        })
        .to_string()
    }

    #[test]
    fn test_parse_open_message() {
        let msg = parse_client_message(&open_frame()).unwrap();
        assert_eq!(msg.version, "2");
        assert_eq!(msg.seq, 1);
        assert_eq!(msg.position, "PT0S");

        match msg.body {
            ClientMessageBody::Open(params) => {
                assert_eq!(params.conversation_id, "090eaa2f-72fa-480a-83e0-8667ff89c0ec");
                assert_eq!(params.participant.ani_name, "John Doe");
                assert_eq!(params.media.len(), 1);
                assert_eq!(params.media[0].codec, "PCMU");
                assert_eq!(params.media[0].sample_rate, 8000);
                assert_eq!(params.media[0].channels, vec!["external", "internal"]);
            }
            other => panic!("expected open, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_ping_with_and_without_rtt() {
        let with_rtt = json!({
            "version": "2", "type": "ping", "seq": 3, "id": "s", "position": "PT2S",
            "parameters": {"rtt": "PT0.05S"}
        })
        .to_string();
        let msg = parse_client_message(&with_rtt).unwrap();
        match msg.body {
            ClientMessageBody::Ping(p) => assert_eq!(p.rtt.as_deref(), Some("PT0.05S")),
            other => panic!("expected ping, got {:?}", other),
        }

        let without = json!({
            "version": "2", "type": "ping", "seq": 4, "id": "s", "position": "PT3S",
            "parameters": {}
        })
        .to_string();
        let msg = parse_client_message(&without).unwrap();
        assert!(matches!(msg.body, ClientMessageBody::Ping(PingParameters { rtt: None })));
    }

    #[test]
    fn test_parse_close_with_unlisted_reason() {
        let frame = json!({
            "version": "2", "type": "close", "seq": 9, "id": "s", "position": "PT9S",
            "parameters": {"reason": "shutdown"}
        })
        .to_string();
        let msg = parse_client_message(&frame).unwrap();
        match msg.body {
            ClientMessageBody::Close(p) => assert_eq!(p.reason, CloseReason::Unknown),
            other => panic!("expected close, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_falls_back_without_error() {
        let frame = json!({
            "version": "2", "type": "resumed", "seq": 2, "id": "s", "position": "PT1S",
            "parameters": {"anything": true}
        })
        .to_string();
        let msg = parse_client_message(&frame).unwrap();
        match msg.body {
            ClientMessageBody::Unknown { kind } => assert_eq!(kind, "resumed"),
            other => panic!("expected unknown, got {:?}", other),
        }
    }

    #[test]
    fn test_malformed_parameters_for_known_kind_is_an_error() {
        // `open` without a conversationId must fail validation, not fall back
        let frame = json!({
            "version": "2", "type": "open", "seq": 1, "id": "s", "position": "PT0S",
            "parameters": {"media": []}
        })
        .to_string();
        assert!(parse_client_message(&frame).is_err());
    }

    #[test]
    fn test_server_message_wire_shape() {
        let msg = ServerMessage::new(
            "session-1",
            ServerMessageType::Opened,
            1,
            1,
            serde_json::to_value(OpenedParameters {
                start_paused: false,
                media: vec![MediaChannel {
                    media_type: "audio".into(),
                    codec: "PCMU".into(),
                    sample_rate: 8000,
                    channels: vec!["external".into()],
                }],
            })
            .unwrap(),
        );

        let value: Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value["version"], "2");
        assert_eq!(value["type"], "opened");
        assert_eq!(value["seq"], 1);
        assert_eq!(value["clientseq"], 1);
        assert_eq!(value["parameters"]["startPaused"], false);
        assert_eq!(value["parameters"]["media"][0]["format"], "PCMU");
        assert_eq!(value["parameters"]["media"][0]["rate"], 8000);
    }

    #[test]
    fn test_opened_parameters_echo_every_descriptor() {
        let media: Vec<MediaChannel> = (0..3)
            .map(|i| MediaChannel {
                media_type: "audio".into(),
                codec: "PCMU".into(),
                sample_rate: 8000,
                channels: vec![format!("channel-{}", i)],
            })
            .collect();

        let value = serde_json::to_value(OpenedParameters {
            start_paused: false,
            media: media.clone(),
        })
        .unwrap();

        assert_eq!(value["startPaused"], false);
        assert_eq!(value["media"].as_array().unwrap().len(), media.len());
        assert_eq!(value["media"][2]["channels"][0], "channel-2");
    }

    #[test]
    fn test_disconnect_reason_serialization() {
        let params = DisconnectParameters {
            reason: DisconnectReason::Unauthorized,
            info: "Invalid API Key".into(),
        };
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["reason"], "unauthorized");
        assert_eq!(value["info"], "Invalid API Key");
    }
}
