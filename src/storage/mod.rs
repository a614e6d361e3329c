//! # Conversation Storage
//!
//! Persistence boundary for conversations. A conversation outlives the
//! WebSocket session that carried its audio: the session actor creates the
//! record on `open`, the speech provider appends transcript and summary items
//! as recognition finalizes them, and teardown flips the active flag.
//!
//! The store is an effectively-append-only collaborator: the protocol core
//! only ever appends items or sets the active flag, never performs
//! read-modify-write transactions. Store failures are logged by callers and
//! must never break a protocol exchange.

pub mod memory;

use crate::protocol::MediaChannel;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use memory::InMemoryConversationStore;

/// One finalized transcript fragment. Append-only; never mutated after append.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    /// Index of the media channel this fragment was recognized on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u32>,
    pub text: String,
    /// Start offset as an ISO-8601 duration string, e.g. `PT1.23S`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    /// End offset as an ISO-8601 duration string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

/// One agent-assist summary fragment, marked with the transcript offset it
/// covers up to. Same append-only treatment as [`TranscriptItem`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryItem {
    pub text: String,
    #[serde(rename = "transcriptionEnd")]
    pub transcription_end: String,
}

/// The stored record for one conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    pub session_id: String,
    pub active: bool,
    pub ani: String,
    pub ani_name: String,
    pub dnis: String,
    /// The media descriptor selected for recognition at `open`.
    pub media: MediaChannel,
    /// Latest audio-timeline cursor reported by the client.
    pub position: String,
    /// Round-trip time samples collected from `ping` messages.
    #[serde(default)]
    pub rtt: Vec<String>,
    #[serde(default)]
    pub transcript: Vec<TranscriptItem>,
    #[serde(default)]
    pub summary: Vec<SummaryItem>,
}

/// Async storage contract for conversations.
///
/// Implementations must tolerate appends against unknown conversation ids
/// gracefully (return an error, never panic): providers can race teardown.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Insert a new conversation record, replacing any previous record with
    /// the same id.
    async fn create(&self, conversation: Conversation) -> anyhow::Result<()>;

    async fn get(&self, conversation_id: &str) -> anyhow::Result<Option<Conversation>>;

    /// List conversations, optionally filtered by the active flag.
    async fn list(&self, active: Option<bool>) -> anyhow::Result<Vec<Conversation>>;

    async fn set_active(&self, conversation_id: &str, active: bool) -> anyhow::Result<()>;

    async fn append_transcript(
        &self,
        conversation_id: &str,
        item: TranscriptItem,
    ) -> anyhow::Result<()>;

    async fn append_summary(&self, conversation_id: &str, item: SummaryItem)
        -> anyhow::Result<()>;

    /// Record a client-reported round-trip time sample.
    async fn append_rtt(&self, conversation_id: &str, rtt: String) -> anyhow::Result<()>;

    /// Update the audio-timeline cursor for a conversation.
    async fn update_position(&self, conversation_id: &str, position: String)
        -> anyhow::Result<()>;

    /// Release any backend resources. Called once at server shutdown.
    async fn close(&self) -> anyhow::Result<()>;
}
