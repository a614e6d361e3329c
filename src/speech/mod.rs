//! # Speech Provider Interface
//!
//! Abstraction over the recognition backend. The protocol core consumes this
//! trait and never implements it: a provider owns its own per-session state
//! (keyed by session id in a provider-internal arena), runs recognition in a
//! background task per session, and reaches the outside world only through
//! the callables injected via [`SessionContext`].
//!
//! ## Threading contract:
//! Recognition results produced on provider tasks are marshaled back into the
//! owning connection actor via [`EmitServerEvent`]; providers never write to
//! the socket or touch session sequence numbers directly.

pub mod assist;
pub mod remote;

use crate::events::EventSink;
use crate::protocol::MediaChannel;
use crate::storage::ConversationStore;
use actix::prelude::*;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

pub use assist::{AgentAssist, WindowedSummarizer};
pub use remote::RemoteSpeechProvider;

/// Opaque handle to a provider-owned session. The core stores it in the
/// session record and passes it around without ever inspecting it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderSessionId(Uuid);

impl ProviderSessionId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProviderSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Request from a provider task to emit a protocol `event` message to the
/// client. Delivered through the connection actor's mailbox so the actor
/// remains the only writer of the socket and of `server_seq`.
#[derive(Message)]
#[rtype(result = "()")]
pub struct EmitServerEvent {
    pub entities: Vec<Value>,
}

/// Callbacks and collaborators handed to a provider when a session is
/// initialized. Everything a provider needs to reach the outside world
/// arrives here; providers hold no reference to the session actor's
/// internals.
#[derive(Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub conversation_id: String,
    /// Recognition language negotiated at `open`.
    pub language: String,
    /// Mailbox of the owning connection actor, for `event` messages.
    pub emitter: Recipient<EmitServerEvent>,
    pub store: Arc<dyn ConversationStore>,
    pub events: Arc<dyn EventSink>,
}

/// The contract every recognition backend implements.
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Allocate provider-side session state and start the background
    /// recognition task for this session's audio stream. Called at most once
    /// per session; a second call for the same id is ignored with a warning.
    async fn initialize_session(
        &self,
        session_id: &str,
        ctx: SessionContext,
        media: MediaChannel,
    ) -> anyhow::Result<ProviderSessionId>;

    /// Append raw audio bytes to the session's input stream. A frame for an
    /// uninitialized session is logged and dropped, never an error to the
    /// caller: clients can misbehave and send audio outside the valid window.
    async fn handle_audio_frame(&self, session_id: &str, data: Vec<u8>);

    /// Signal end-of-audio and wait for the recognition task and all derived
    /// work (assist summaries) to finish. Tolerates a failed recognition task
    /// so one provider error can never hang session teardown.
    async fn shutdown_session(&self, session_id: &str);

    /// Process-wide cleanup at server shutdown, independent of any session.
    async fn close(&self);
}
