//! Streaming speech provider backed by a remote recognition service.
//!
//! One background task per session connects to the configured recognizer
//! WebSocket, forwards decoded PCM16 audio, and consumes JSON recognition
//! results until the upstream closes. Finalized utterances are persisted,
//! emitted to the client as `transcript` event entities, published to the
//! telemetry sink, and fanned out to the agent-assist summarizer. All of
//! those side effects run on the provider task and reach the session only
//! through the injected [`SessionContext`] callables.
//!
//! ## Upstream wire contract:
//! - server → recognizer: one JSON `start` frame (language, sample rate,
//!   channel count), then binary PCM16 frames, then a JSON `stop` frame.
//! - recognizer → server: JSON result frames with `text`, optional `channel`,
//!   and `offset`/`duration` in 100 ns ticks plus per-word detail.

use super::{
    AgentAssist, EmitServerEvent, ProviderSessionId, SessionContext, SpeechProvider,
    WindowedSummarizer,
};
use crate::audio::mulaw;
use crate::events::entity::{
    build_agent_assist_entity, build_agent_assist_utterance, build_transcript_entity,
    RecognizedWord,
};
use crate::events::EVENT_PARTIAL_TRANSCRIPT;
use crate::protocol::{ticks_to_duration, MediaChannel};
use crate::storage::{SummaryItem, TranscriptItem};
use anyhow::Context;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Channel label reported to the client on transcript entities.
const CHANNEL_ID: &str = "CUSTOMER";

/// Per-session provider state, kept in the provider's own arena and never
/// exposed to the protocol core.
struct ProviderSession {
    id: ProviderSessionId,
    audio_tx: mpsc::UnboundedSender<Vec<u8>>,
    recognize_task: JoinHandle<()>,
}

/// One recognition result frame from the upstream service.
#[derive(Debug, Deserialize)]
struct RemoteResult {
    text: String,
    #[serde(default)]
    channel: Option<u32>,
    /// Start offset in 100 ns ticks.
    #[serde(default)]
    offset: u64,
    /// Duration in 100 ns ticks.
    #[serde(default)]
    duration: u64,
    #[serde(default)]
    words: Vec<RemoteWord>,
}

#[derive(Debug, Deserialize)]
struct RemoteWord {
    word: String,
    #[serde(default = "default_confidence")]
    confidence: f64,
    #[serde(default)]
    offset: u64,
    #[serde(default)]
    duration: u64,
}

fn default_confidence() -> f64 {
    0.85
}

pub struct RemoteSpeechProvider {
    endpoint: String,
    assist_window: usize,
    sessions: Mutex<HashMap<String, ProviderSession>>,
}

impl RemoteSpeechProvider {
    pub fn new(endpoint: impl Into<String>, assist_window: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            assist_window,
            sessions: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SpeechProvider for RemoteSpeechProvider {
    async fn initialize_session(
        &self,
        session_id: &str,
        ctx: SessionContext,
        media: MediaChannel,
    ) -> anyhow::Result<ProviderSessionId> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(session_id) {
            warn!("[{}] Provider session already initialized", session_id);
            return Ok(existing.id);
        }

        let (audio_tx, audio_rx) = mpsc::unbounded_channel();
        let id = ProviderSessionId::new();
        let assist: Arc<dyn AgentAssist> = Arc::new(WindowedSummarizer::new(self.assist_window));
        let endpoint = self.endpoint.clone();
        let task_session_id = session_id.to_string();

        let recognize_task = tokio::spawn(async move {
            if let Err(e) =
                run_recognition(endpoint, task_session_id.clone(), ctx, media, audio_rx, assist)
                    .await
            {
                error!("[{}] Recognition error: {:#}", task_session_id, e);
            }
        });

        sessions.insert(
            session_id.to_string(),
            ProviderSession {
                id,
                audio_tx,
                recognize_task,
            },
        );

        info!("[{}] Provider session initialized", session_id);
        Ok(id)
    }

    async fn handle_audio_frame(&self, session_id: &str, data: Vec<u8>) {
        let sessions = self.sessions.lock().await;
        match sessions.get(session_id) {
            Some(session) => {
                if session.audio_tx.send(data).is_err() {
                    warn!("[{}] Recognition task gone, dropping frame", session_id);
                }
            }
            None => error!("[{}] Session not initialized", session_id),
        }
    }

    async fn shutdown_session(&self, session_id: &str) {
        let session = {
            let mut sessions = self.sessions.lock().await;
            sessions.remove(session_id)
        };

        let Some(session) = session else {
            error!("[{}] Session not initialized", session_id);
            return;
        };

        // Dropping the sender signals end-of-audio to the recognition task
        drop(session.audio_tx);
        if let Err(e) = session.recognize_task.await {
            error!("[{}] Recognition task failed: {}", session_id, e);
        }
        info!("[{}] Provider session shut down", session_id);
    }

    async fn close(&self) {
        let mut sessions = self.sessions.lock().await;
        for (session_id, session) in sessions.drain() {
            debug!("[{}] Aborting recognition task at shutdown", session_id);
            session.recognize_task.abort();
        }
    }
}

/// Drive one session's recognition: stream audio up, consume results, then
/// settle all derived assist work before returning.
async fn run_recognition(
    endpoint: String,
    session_id: String,
    ctx: SessionContext,
    media: MediaChannel,
    mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
    assist: Arc<dyn AgentAssist>,
) -> anyhow::Result<()> {
    let (ws, _) = connect_async(&endpoint)
        .await
        .with_context(|| format!("connecting to recognizer at {}", endpoint))?;
    let (mut sink, mut stream) = ws.split();

    let start = json!({
        "type": "start",
        "language": ctx.language,
        "sampleRate": media.sample_rate,
        "channels": media.channels.len(),
    });
    sink.send(Message::Text(start.to_string()))
        .await
        .context("sending start frame")?;

    info!("[{}] Starting continuous recognition", session_id);

    let is_multichannel = media.channels.len() > 1;
    let is_mulaw = media.codec.eq_ignore_ascii_case("PCMU");
    let mut assist_tasks: Vec<JoinHandle<()>> = Vec::new();
    let mut audio_done = false;

    loop {
        tokio::select! {
            frame = audio_rx.recv(), if !audio_done => {
                match frame {
                    Some(bytes) => {
                        let pcm = if is_mulaw {
                            mulaw::decode_to_pcm16_le(&bytes)
                        } else {
                            bytes
                        };
                        if let Err(e) = sink.send(Message::Binary(pcm)).await {
                            warn!("[{}] Audio forward failed: {}", session_id, e);
                            break;
                        }
                    }
                    None => {
                        audio_done = true;
                        let stop = json!({"type": "stop"}).to_string();
                        if let Err(e) = sink.send(Message::Text(stop)).await {
                            warn!("[{}] Stop frame failed: {}", session_id, e);
                            break;
                        }
                    }
                }
            }
            result = stream.next() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(task) =
                            handle_result(&session_id, &ctx, is_multichannel, &assist, &text).await
                        {
                            assist_tasks.push(task);
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!("[{}] Recognizer stream error: {}", session_id, e);
                        break;
                    }
                }
            }
        }
    }

    info!("[{}] Recognition stopped", session_id);

    // Settle derived work before teardown continues: pending assist tasks
    // first, then the final summary flush.
    if !assist_tasks.is_empty() {
        debug!(
            "[{}] Awaiting {} assist tasks",
            session_id,
            assist_tasks.len()
        );
        for task in assist_tasks {
            if let Err(e) = task.await {
                warn!("[{}] Assist task failed: {}", session_id, e);
            }
        }
    }

    if let Some(summary) = assist.flush_summary().await {
        emit_summary(&ctx, &summary, "PT0S", "PT1S", "end").await;
    }

    Ok(())
}

/// Handle one finalized recognition result. Persistence and telemetry are
/// awaited on the recognition task so transcript items land in the order the
/// recognizer finalized them. Returns the handle of the assist task spawned
/// for the utterance, if any.
async fn handle_result(
    session_id: &str,
    ctx: &SessionContext,
    is_multichannel: bool,
    assist: &Arc<dyn AgentAssist>,
    text_frame: &str,
) -> Option<JoinHandle<()>> {
    let result: RemoteResult = match serde_json::from_str(text_frame) {
        Ok(result) => result,
        Err(e) => {
            warn!("[{}] Unparseable recognition result: {}", session_id, e);
            return None;
        }
    };

    if result.text.is_empty() {
        return None;
    }

    let text = normalize_transcript_text(&result.text);
    let start = ticks_to_duration(result.offset);
    let end = ticks_to_duration(result.offset + result.duration);
    let channel = if is_multichannel { result.channel } else { Some(1) };

    let words: Vec<RecognizedWord> = result
        .words
        .iter()
        .map(|w| RecognizedWord {
            word: w.word.clone(),
            confidence: w.confidence,
            offset_ticks: w.offset,
            duration_ticks: w.duration,
        })
        .collect();

    let item = TranscriptItem {
        channel,
        text: text.clone(),
        start: Some(start),
        end: Some(end.clone()),
    };

    let entity = build_transcript_entity(
        CHANNEL_ID,
        &text,
        &words,
        true,
        result.offset,
        result.duration,
        &ctx.language,
    );

    // Persist and publish before the next result is taken off the stream;
    // failures are logged, never fatal
    if let Err(e) = ctx
        .store
        .append_transcript(&ctx.conversation_id, item.clone())
        .await
    {
        error!("[{}] Transcript persist failed: {:#}", session_id, e);
    }
    if let Err(e) = ctx
        .events
        .publish(
            EVENT_PARTIAL_TRANSCRIPT,
            &ctx.conversation_id,
            serde_json::to_value(&item).unwrap_or_default(),
            HashMap::new(),
        )
        .await
    {
        error!("[{}] Event publish failed: {:#}", session_id, e);
    }

    ctx.emitter.do_send(EmitServerEvent {
        entities: vec![entity],
    });

    // Derived assist work runs on its own task; awaited at shutdown
    let first_word_offset = result.words.first().map_or(result.offset, |w| w.offset);
    let position = ticks_to_duration(first_word_offset);
    let duration = ticks_to_duration(result.duration);
    let assist = assist.clone();
    let ctx = ctx.clone();
    Some(tokio::spawn(async move {
        if let Some(summary) = assist.on_transcription(&text).await {
            emit_summary(&ctx, &summary, &position, &duration, &end).await;
        }
    }))
}

/// Persist one summary item and emit it to the client as an agent-assist
/// entity.
async fn emit_summary(
    ctx: &SessionContext,
    summary: &str,
    position: &str,
    duration: &str,
    transcription_end: &str,
) {
    let item = SummaryItem {
        text: summary.to_string(),
        transcription_end: transcription_end.to_string(),
    };
    if let Err(e) = ctx.store.append_summary(&ctx.conversation_id, item).await {
        warn!("[{}] Summary persist failed: {:#}", ctx.session_id, e);
    }

    let utterance = build_agent_assist_utterance(
        position,
        summary,
        &ctx.language,
        default_confidence(),
        CHANNEL_ID,
        true,
        duration,
    );
    let entity = build_agent_assist_entity(vec![utterance], vec![]);
    ctx.emitter.do_send(EmitServerEvent {
        entities: vec![entity],
    });
}

/// Ensure an utterance starts with a capital letter and ends with sentence
/// punctuation before it is persisted or shown to an agent.
fn normalize_transcript_text(text: &str) -> String {
    let mut chars = text.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };

    let mut normalized: String = first.to_uppercase().chain(chars).collect();
    if !matches!(normalized.chars().last(), Some('.' | '!' | '?')) {
        normalized.push('.');
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogEventSink;
    use crate::storage::{Conversation, ConversationStore, InMemoryConversationStore};
    use actix::{Actor, Context as ActorContext, Handler};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct EventCollector;

    impl Actor for EventCollector {
        type Context = ActorContext<Self>;
    }

    impl Handler<EmitServerEvent> for EventCollector {
        type Result = ();

        fn handle(&mut self, _msg: EmitServerEvent, _ctx: &mut Self::Context) {}
    }

    /// Store whose first transcript append stalls. A later append can only
    /// overtake it if result handling runs detached from the recognition task.
    struct StallingStore {
        inner: InMemoryConversationStore,
        stalled: AtomicBool,
    }

    impl StallingStore {
        fn new() -> Self {
            Self {
                inner: InMemoryConversationStore::new(),
                stalled: AtomicBool::new(false),
            }
        }
    }

    #[async_trait]
    impl ConversationStore for StallingStore {
        async fn create(&self, conversation: Conversation) -> anyhow::Result<()> {
            self.inner.create(conversation).await
        }

        async fn get(&self, conversation_id: &str) -> anyhow::Result<Option<Conversation>> {
            self.inner.get(conversation_id).await
        }

        async fn list(&self, active: Option<bool>) -> anyhow::Result<Vec<Conversation>> {
            self.inner.list(active).await
        }

        async fn set_active(&self, conversation_id: &str, active: bool) -> anyhow::Result<()> {
            self.inner.set_active(conversation_id, active).await
        }

        async fn append_transcript(
            &self,
            conversation_id: &str,
            item: TranscriptItem,
        ) -> anyhow::Result<()> {
            if !self.stalled.swap(true, Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.append_transcript(conversation_id, item).await
        }

        async fn append_summary(
            &self,
            conversation_id: &str,
            item: SummaryItem,
        ) -> anyhow::Result<()> {
            self.inner.append_summary(conversation_id, item).await
        }

        async fn append_rtt(&self, conversation_id: &str, rtt: String) -> anyhow::Result<()> {
            self.inner.append_rtt(conversation_id, rtt).await
        }

        async fn update_position(
            &self,
            conversation_id: &str,
            position: String,
        ) -> anyhow::Result<()> {
            self.inner.update_position(conversation_id, position).await
        }

        async fn close(&self) -> anyhow::Result<()> {
            self.inner.close().await
        }
    }

    fn test_conversation() -> Conversation {
        Conversation {
            id: "conv-1".to_string(),
            session_id: "sess-1".to_string(),
            active: true,
            ani: String::new(),
            ani_name: String::new(),
            dnis: String::new(),
            media: MediaChannel {
                media_type: "audio".to_string(),
                codec: "PCMU".to_string(),
                sample_rate: 8000,
                channels: vec!["external".to_string()],
            },
            position: String::new(),
            rtt: vec![],
            transcript: vec![],
            summary: vec![],
        }
    }

    #[actix_web::test]
    async fn test_results_persist_in_finalization_order() {
        let store = Arc::new(StallingStore::new());
        store.create(test_conversation()).await.unwrap();

        let ctx = SessionContext {
            session_id: "sess-1".to_string(),
            conversation_id: "conv-1".to_string(),
            language: "en-US".to_string(),
            emitter: EventCollector.start().recipient(),
            store: store.clone(),
            events: Arc::new(LogEventSink),
        };
        let assist: Arc<dyn AgentAssist> = Arc::new(WindowedSummarizer::new(10));

        let first = json!({"text": "one", "offset": 0, "duration": 10_000_000}).to_string();
        let second =
            json!({"text": "two", "offset": 10_000_000, "duration": 10_000_000}).to_string();

        let mut tasks = Vec::new();
        if let Some(task) = handle_result("sess-1", &ctx, false, &assist, &first).await {
            tasks.push(task);
        }
        if let Some(task) = handle_result("sess-1", &ctx, false, &assist, &second).await {
            tasks.push(task);
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Both items landed, in the order they were finalized
        let stored = store.get("conv-1").await.unwrap().unwrap();
        let texts: Vec<&str> = stored
            .transcript
            .iter()
            .map(|item| item.text.as_str())
            .collect();
        assert_eq!(texts, vec!["One.", "Two."]);
    }

    #[test]
    fn test_normalize_adds_capital_and_period() {
        assert_eq!(normalize_transcript_text("hello there"), "Hello there.");
    }

    #[test]
    fn test_normalize_keeps_existing_punctuation() {
        assert_eq!(normalize_transcript_text("is that so?"), "Is that so?");
        assert_eq!(normalize_transcript_text("Done."), "Done.");
    }

    #[test]
    fn test_normalize_empty_text() {
        assert_eq!(normalize_transcript_text(""), "");
    }

    #[test]
    fn test_remote_result_parsing_defaults() {
        let frame = r#"{"text": "hello", "offset": 12300000, "duration": 5000000}"#;
        let result: RemoteResult = serde_json::from_str(frame).unwrap();
        assert_eq!(result.text, "hello");
        assert_eq!(result.channel, None);
        assert!(result.words.is_empty());

        let with_words = r#"{
            "text": "hello world",
            "channel": 2,
            "offset": 0,
            "duration": 10000000,
            "words": [{"word": "hello", "offset": 0, "duration": 5000000}]
        }"#;
        let result: RemoteResult = serde_json::from_str(with_words).unwrap();
        assert_eq!(result.channel, Some(2));
        assert_eq!(result.words.len(), 1);
        // Confidence falls back to the default when the backend omits it
        assert!((result.words[0].confidence - 0.85).abs() < 1e-9);
    }
}
