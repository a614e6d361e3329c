//! # Event Publishing
//!
//! Fire-and-forget telemetry boundary. The session core and the speech
//! provider publish lifecycle and transcript events here; a failed publish is
//! logged and swallowed so the sink can never break a live session.
//!
//! [`entity`] holds the builders for the protocol-level `event` message
//! payloads (transcript and agent-assist entities) sent to the *client*,
//! which are distinct from the telemetry published through the sink.

pub mod entity;

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

/// Telemetry event types published by the server.
pub const EVENT_SESSION_STARTED: &str = "session-started";
pub const EVENT_SESSION_CLOSED: &str = "session-closed";
pub const EVENT_PARTIAL_TRANSCRIPT: &str = "partial-transcript";

/// Append-only telemetry sink shared by all sessions.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one event. Callers treat errors as non-fatal.
    async fn publish(
        &self,
        event_type: &str,
        conversation_id: &str,
        payload: Value,
        properties: HashMap<String, String>,
    ) -> anyhow::Result<()>;

    /// Release sink resources at server shutdown.
    async fn close(&self) -> anyhow::Result<()>;
}

/// Default sink: writes events to the structured log. Stands in wherever no
/// external event-stream backend is configured.
#[derive(Debug, Default)]
pub struct LogEventSink;

#[async_trait]
impl EventSink for LogEventSink {
    async fn publish(
        &self,
        event_type: &str,
        conversation_id: &str,
        payload: Value,
        properties: HashMap<String, String>,
    ) -> anyhow::Result<()> {
        debug!(
            event_type = %event_type,
            conversation_id = %conversation_id,
            properties = ?properties,
            payload = %payload,
            "Publishing event"
        );
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
