//! # AudioHook WebSocket Handler
//!
//! The session manager: accepts a connection per session on
//! `/audiohook/ws`, validates the handshake headers, then runs the protocol
//! receive loop as an Actix actor until the socket goes away.
//!
//! ## Protocol flow:
//! 1. **Handshake**: required headers are validated before the session is
//!    registered; failures are answered with a `disconnect` frame and an
//!    immediate close (1008 for a missing session id, 3000 for auth).
//! 2. **Open**: the client's `open` negotiates media and creates the
//!    conversation record; the server replies `opened`.
//! 3. **Streaming**: text frames carry control messages, binary frames carry
//!    codec-encoded audio routed to the speech provider.
//! 4. **Close**: the client's `close` drains the provider, then the server
//!    replies `closed` and shuts the socket with 1000.
//!
//! ## Actor model:
//! Each connection is one actor; the actor's mailbox serializes every state
//! mutation and socket write, so the session owns `server_seq` without locks.
//! Background work (provider init, persistence) runs on spawned tasks and
//! marshals results back through actor messages, never by touching state
//! directly. Audio frames are funneled through a single forwarding task per
//! session so they reach the provider in arrival order.

use crate::config::AuthConfig;
use crate::protocol::{
    ClientMessage, ClientMessageBody, DisconnectParameters, DisconnectReason, MediaChannel,
    OpenParameters, OpenedParameters, ServerMessage, ServerMessageType,
};
use crate::session::{SessionPhase, SessionState};
use crate::speech::{EmitServerEvent, ProviderSessionId, SessionContext, SpeechProvider};
use crate::state::AppState;
use crate::storage::Conversation;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Required handshake headers.
const HEADER_SESSION_ID: &str = "audiohook-session-id";
const HEADER_CORRELATION_ID: &str = "audiohook-correlation-id";
const HEADER_API_KEY: &str = "x-api-key";
const HEADER_SIGNATURE: &str = "signature";
const HEADER_SIGNATURE_INPUT: &str = "signature-input";

/// Identity extracted from a valid handshake.
#[derive(Debug, PartialEq)]
pub struct Handshake {
    pub session_id: String,
    pub correlation_id: String,
}

/// A handshake failure and the exact wire reply it maps to.
#[derive(Debug, PartialEq)]
pub struct HandshakeRejection {
    pub reason: DisconnectReason,
    pub info: &'static str,
    pub close_code: u16,
}

/// Validate the upgrade request's headers against the configured credentials.
///
/// Order matters and matches the close-code contract: session id first
/// (1008), then API key (3000), then signature material (3000). Signature
/// *verification* is not performed: a request presenting any signature
/// material, or arriving while a shared secret is configured, passes. This is
/// a documented gap, not a security property.
pub fn validate_headers(
    req: &HttpRequest,
    auth: &AuthConfig,
) -> Result<Handshake, HandshakeRejection> {
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
    };

    let session_id = header(HEADER_SESSION_ID).ok_or(HandshakeRejection {
        reason: DisconnectReason::Error,
        info: "No session ID provided",
        close_code: 1008,
    })?;

    if header(HEADER_API_KEY) != Some(auth.api_key.as_str()) {
        return Err(HandshakeRejection {
            reason: DisconnectReason::Unauthorized,
            info: "Invalid API Key",
            close_code: 3000,
        });
    }

    let has_signature_material = header(HEADER_SIGNATURE).is_some()
        || header(HEADER_SIGNATURE_INPUT).is_some()
        || !auth.client_secret.is_empty();
    if !has_signature_material {
        return Err(HandshakeRejection {
            reason: DisconnectReason::Unauthorized,
            info: "Invalid signature",
            close_code: 3000,
        });
    }

    let correlation_id = header(HEADER_CORRELATION_ID)
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    Ok(Handshake {
        session_id: session_id.to_string(),
        correlation_id,
    })
}

/// Build the `disconnect` frame used on every pre-session failure path.
///
/// The open handshake has not happened yet when these are sent, so the wire
/// always carries `seq=1, clientseq=1`.
fn disconnect_frame(session_id: &str, reason: DisconnectReason, info: &str) -> String {
    let message = ServerMessage::new(
        session_id,
        ServerMessageType::Disconnect,
        1,
        1,
        json!(DisconnectParameters {
            reason,
            info: info.to_string(),
        }),
    );
    serde_json::to_string(&message).unwrap_or_default()
}

/// Session id carried on rejection frames. Falls back to `unknown` when the
/// client supplied no usable session id header.
fn rejection_session_id(req: &HttpRequest) -> &str {
    req.headers()
        .get(HEADER_SESSION_ID)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .unwrap_or("unknown")
}

/// Minimal actor for rejected handshakes: deliver the `disconnect` frame,
/// close with the mandated code, stop. No session is ever registered.
struct RejectedSocket {
    frame: String,
    close_code: u16,
}

impl Actor for RejectedSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        ctx.text(self.frame.clone());
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::from(self.close_code),
            description: None,
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectedSocket {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}

/// Marshals the result of the spawned `open` work back into the actor.
#[derive(Message)]
#[rtype(result = "()")]
struct OpenCompleted {
    provider_session: Option<ProviderSessionId>,
    media: Vec<MediaChannel>,
}

/// Marshals the completion of provider drain during `close` handling.
#[derive(Message)]
#[rtype(result = "()")]
struct CloseCompleted;

/// Feed queued audio frames to the provider one at a time. The single
/// consuming task keeps frames in arrival order even when the provider
/// suspends mid-frame.
async fn forward_audio(
    provider: Arc<dyn SpeechProvider>,
    session_id: String,
    mut audio_rx: mpsc::UnboundedReceiver<Vec<u8>>,
) {
    while let Some(frame) = audio_rx.recv().await {
        provider.handle_audio_frame(&session_id, frame).await;
    }
    debug!("[{}] Audio forwarding finished", session_id);
}

/// What the routing step asks the actor to do next.
enum RouteOutcome {
    /// Write this reply to the socket.
    Reply(ServerMessage),
    /// Run the `open` workflow.
    Open(OpenParameters),
    /// Run the `close` workflow.
    Close,
    /// Nothing to send.
    Ignored,
}

/// WebSocket actor for one AudioHook session.
pub struct AudioHookSocket {
    state: SessionState,
    correlation_id: String,
    app: web::Data<AppState>,
    /// Inbound end of the session's audio pipeline plus the forwarding task
    /// draining it. Dropping the sender ends the task after queued frames.
    audio_forward: Option<(mpsc::UnboundedSender<Vec<u8>>, JoinHandle<()>)>,
}

impl AudioHookSocket {
    pub fn new(handshake: Handshake, app: web::Data<AppState>) -> Self {
        Self {
            state: SessionState::new(handshake.session_id),
            correlation_id: handshake.correlation_id,
            app,
            audio_forward: None,
        }
    }

    /// Build one outbound message, claiming the next `server_seq` and
    /// acknowledging the latest client seq.
    fn next_message(
        &mut self,
        kind: ServerMessageType,
        parameters: serde_json::Value,
    ) -> ServerMessage {
        let seq = self.state.next_server_seq();
        ServerMessage::new(
            self.state.session_id.clone(),
            kind,
            seq,
            self.state.client_seq,
            parameters,
        )
    }

    /// Serialize and write one server message. A serialization or write
    /// failure is logged and swallowed; the next read surfaces a dead socket.
    fn write_message(&mut self, ctx: &mut ws::WebsocketContext<Self>, message: ServerMessage) {
        match serde_json::to_string(&message) {
            Ok(text) => ctx.text(text),
            Err(e) => error!(
                "[{}] Failed to serialize {:?} message: {}",
                self.state.session_id, message.kind, e
            ),
        }
    }

    fn send_server_message(
        &mut self,
        ctx: &mut ws::WebsocketContext<Self>,
        kind: ServerMessageType,
        parameters: serde_json::Value,
    ) {
        let message = self.next_message(kind, parameters);
        self.write_message(ctx, message);
    }

    /// Best-effort position-cursor update on the conversation record.
    fn persist_position(&self, position: &str) {
        if position.is_empty() {
            return;
        }
        let Some(conversation_id) = self.state.conversation_id.clone() else {
            return;
        };
        let store = self.app.store.clone();
        let position = position.to_string();
        tokio::spawn(async move {
            if let Err(e) = store.update_position(&conversation_id, position).await {
                debug!("Position update failed for {}: {:#}", conversation_id, e);
            }
        });
    }

    fn handle_open(&mut self, params: OpenParameters, ctx: &mut ws::WebsocketContext<Self>) {
        if self.state.phase != SessionPhase::Uninitialized {
            // Duplicate opens from flaky clients are tolerated, not fatal
            warn!(
                "[{}] Ignoring open message in phase {:?}",
                self.state.session_id, self.state.phase
            );
            return;
        }

        let Some(media) = params.media.first().cloned() else {
            warn!(
                "[{}] Open message carries no media descriptors, ignoring",
                self.state.session_id
            );
            return;
        };

        let config = self.app.get_config();
        let language = params
            .language
            .clone()
            .unwrap_or(config.speech.default_language);

        self.state.phase = SessionPhase::OpenPending;
        self.state.conversation_id = Some(params.conversation_id.clone());
        self.state.media = Some(media.clone());
        self.state.language = Some(language.clone());
        self.app
            .registry
            .set_conversation(&self.state.session_id, &params.conversation_id);

        info!(
            "[{}] Opening session for conversation {}",
            self.state.session_id, params.conversation_id
        );

        let session_id = self.state.session_id.clone();
        let store = self.app.store.clone();
        let events = self.app.events.clone();
        let provider = self.app.provider.clone();
        let addr = ctx.address();
        let media_list = params.media.clone();

        let session_ctx = SessionContext {
            session_id: session_id.clone(),
            conversation_id: params.conversation_id.clone(),
            language,
            emitter: addr.clone().recipient(),
            store: store.clone(),
            events: events.clone(),
        };

        tokio::spawn(async move {
            let conversation = Conversation {
                id: params.conversation_id.clone(),
                session_id: session_id.clone(),
                active: true,
                ani: params.participant.ani,
                ani_name: params.participant.ani_name,
                dnis: params.participant.dnis,
                media: media.clone(),
                position: "PT0S".to_string(),
                rtt: Vec::new(),
                transcript: Vec::new(),
                summary: Vec::new(),
            };

            if let Err(e) = store.create(conversation).await {
                error!("[{}] Failed to create conversation record: {:#}", session_id, e);
            }

            if let Err(e) = events
                .publish(
                    crate::events::EVENT_SESSION_STARTED,
                    &params.conversation_id,
                    json!({"sessionId": session_id}),
                    Default::default(),
                )
                .await
            {
                debug!("[{}] Event publish failed: {:#}", session_id, e);
            }

            // A provider failure is logged and the session continues without
            // recognition: audio frames are dropped, the close handshake
            // still completes normally.
            let provider_session = match provider
                .initialize_session(&session_id, session_ctx, media)
                .await
            {
                Ok(id) => Some(id),
                Err(e) => {
                    error!(
                        "[{}] Speech provider initialization failed: {:#}",
                        session_id, e
                    );
                    None
                }
            };

            addr.do_send(OpenCompleted {
                provider_session,
                media: media_list,
            });
        });
    }

    fn handle_close(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.state.phase != SessionPhase::Active {
            warn!(
                "[{}] Ignoring close message in phase {:?}",
                self.state.session_id, self.state.phase
            );
            return;
        }

        self.state.phase = SessionPhase::Closing;
        info!("[{}] Close requested, draining provider", self.state.session_id);

        let session_id = self.state.session_id.clone();
        let provider = self.app.provider.clone();
        let needs_drain = self.state.provider_session.take().is_some();
        let forward = self.audio_forward.take();
        let addr = ctx.address();

        tokio::spawn(async move {
            // Let queued audio frames reach the provider before end-of-audio
            if let Some((audio_tx, forward_task)) = forward {
                drop(audio_tx);
                if let Err(e) = forward_task.await {
                    warn!("[{}] Audio forwarding task failed: {}", session_id, e);
                }
            }
            if needs_drain {
                provider.shutdown_session(&session_id).await;
            }
            addr.do_send(CloseCompleted);
        });
    }

    /// Route one inbound control message. Seq acknowledgment, the position
    /// cursor, and RTT samples are recorded here for every message kind;
    /// replies that need no socket-lifecycle work come back ready to write.
    fn route(&mut self, msg: ClientMessage) -> RouteOutcome {
        // Acknowledge the latest client seq on everything sent after this
        self.state.observe_client_seq(msg.seq);
        self.persist_position(&msg.position);

        match msg.body {
            ClientMessageBody::Open(params) => RouteOutcome::Open(params),
            ClientMessageBody::Ping(params) => {
                if let (Some(rtt), Some(conversation_id)) =
                    (params.rtt, self.state.conversation_id.clone())
                {
                    let store = self.app.store.clone();
                    tokio::spawn(async move {
                        if let Err(e) = store.append_rtt(&conversation_id, rtt).await {
                            debug!("RTT append failed for {}: {:#}", conversation_id, e);
                        }
                    });
                }
                RouteOutcome::Reply(self.next_message(ServerMessageType::Pong, json!({})))
            }
            ClientMessageBody::Update(params) => {
                if self.state.phase != SessionPhase::Active {
                    warn!(
                        "[{}] Ignoring update message in phase {:?}",
                        self.state.session_id, self.state.phase
                    );
                    return RouteOutcome::Ignored;
                }
                info!(
                    "[{}] Language updated to {}",
                    self.state.session_id, params.language
                );
                self.state.language = Some(params.language);
                RouteOutcome::Reply(self.next_message(ServerMessageType::Updated, json!({})))
            }
            ClientMessageBody::Close(params) => {
                debug!(
                    "[{}] Client close reason: {:?}",
                    self.state.session_id, params.reason
                );
                RouteOutcome::Close
            }
            ClientMessageBody::Unknown { kind } => {
                warn!(
                    "[{}] Unrecognized message type '{}', ignoring",
                    self.state.session_id, kind
                );
                RouteOutcome::Ignored
            }
        }
    }

    fn handle_client_message(&mut self, msg: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match self.route(msg) {
            RouteOutcome::Reply(message) => self.write_message(ctx, message),
            RouteOutcome::Open(params) => self.handle_open(params, ctx),
            RouteOutcome::Close => self.handle_close(ctx),
            RouteOutcome::Ignored => {}
        }
    }
}

impl Actor for AudioHookSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!(
            "[{}] Session accepted (correlation {})",
            self.state.session_id, self.correlation_id
        );
        self.app
            .registry
            .register(&self.state.session_id, &self.correlation_id);
        self.app.increment_active_sessions();
    }

    /// Single teardown path for every exit: graceful close, network drop,
    /// protocol error, server shutdown. Best-effort, never propagates.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("[{}] Session stopped", self.state.session_id);

        let session_id = self.state.session_id.clone();
        let conversation_id = self.state.conversation_id.clone();
        // Abrupt disconnects skip the close handshake; the provider still
        // has to be drained exactly once.
        let needs_drain = self.state.provider_session.take().is_some();
        let forward = self.audio_forward.take();

        self.app.registry.deregister(&session_id);
        self.app.decrement_active_sessions();

        let store = self.app.store.clone();
        let events = self.app.events.clone();
        let provider = self.app.provider.clone();

        tokio::spawn(async move {
            if let Some((audio_tx, forward_task)) = forward {
                drop(audio_tx);
                if let Err(e) = forward_task.await {
                    warn!("[{}] Audio forwarding task failed: {}", session_id, e);
                }
            }
            if needs_drain {
                provider.shutdown_session(&session_id).await;
            }

            if let Some(conversation_id) = conversation_id {
                if let Err(e) = store.set_active(&conversation_id, false).await {
                    debug!(
                        "Failed to mark conversation {} inactive: {:#}",
                        conversation_id, e
                    );
                }
                if let Err(e) = events
                    .publish(
                        crate::events::EVENT_SESSION_CLOSED,
                        &conversation_id,
                        json!({"sessionId": session_id}),
                        Default::default(),
                    )
                    .await
                {
                    debug!("[{}] Event publish failed: {:#}", session_id, e);
                }
            }
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for AudioHookSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => {
                match crate::protocol::parse_client_message(&text) {
                    Ok(message) => self.handle_client_message(message, ctx),
                    Err(e) => {
                        // Malformed control frames are dropped, not fatal
                        warn!(
                            "[{}] Dropping malformed message: {}",
                            self.state.session_id, e
                        );
                    }
                }
            }
            Ok(ws::Message::Binary(data)) => {
                if self.state.accepts_audio() {
                    // Synchronous enqueue onto the per-session pipeline keeps
                    // frames in arrival order
                    if let Some((audio_tx, _)) = &self.audio_forward {
                        if audio_tx.send(data.to_vec()).is_err() {
                            warn!(
                                "[{}] Audio forwarding task gone, dropping frame",
                                self.state.session_id
                            );
                        }
                    }
                } else {
                    debug!(
                        "[{}] Dropping {}-byte audio frame in phase {:?}",
                        self.state.session_id,
                        data.len(),
                        self.state.phase
                    );
                }
            }
            Ok(ws::Message::Ping(data)) => ctx.pong(&data),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Close(reason)) => {
                info!("[{}] Socket closed: {:?}", self.state.session_id, reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(
                    "[{}] Unexpected continuation frame",
                    self.state.session_id
                );
            }
            Ok(ws::Message::Nop) => {}
            Err(e) => {
                error!("[{}] Protocol error: {}", self.state.session_id, e);
                ctx.stop();
            }
        }
    }
}

impl Handler<OpenCompleted> for AudioHookSocket {
    type Result = ();

    fn handle(&mut self, msg: OpenCompleted, ctx: &mut Self::Context) {
        if self.state.phase != SessionPhase::OpenPending {
            // The client went away while open work was in flight
            debug!(
                "[{}] Discarding open completion in phase {:?}",
                self.state.session_id, self.state.phase
            );
            return;
        }

        self.state.provider_session = msg.provider_session;
        self.state.phase = SessionPhase::Active;

        if self.state.provider_session.is_some() {
            let (audio_tx, audio_rx) = mpsc::unbounded_channel();
            let forward_task = tokio::spawn(forward_audio(
                self.app.provider.clone(),
                self.state.session_id.clone(),
                audio_rx,
            ));
            self.audio_forward = Some((audio_tx, forward_task));
        }

        let parameters = serde_json::to_value(OpenedParameters {
            start_paused: false,
            media: msg.media,
        })
        .unwrap_or_else(|_| json!({}));
        self.send_server_message(ctx, ServerMessageType::Opened, parameters);

        info!("[{}] Session active", self.state.session_id);
    }
}

impl Handler<CloseCompleted> for AudioHookSocket {
    type Result = ();

    fn handle(&mut self, _msg: CloseCompleted, ctx: &mut Self::Context) {
        self.send_server_message(ctx, ServerMessageType::Closed, json!({}));
        self.state.phase = SessionPhase::Closed;
        info!("[{}] Session closed", self.state.session_id);

        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Normal,
            description: None,
        }));
        ctx.stop();
    }
}

impl Handler<EmitServerEvent> for AudioHookSocket {
    type Result = ();

    fn handle(&mut self, msg: EmitServerEvent, ctx: &mut Self::Context) {
        // Events are only meaningful while the client can still act on them
        if matches!(self.state.phase, SessionPhase::Closed) {
            return;
        }
        self.send_server_message(
            ctx,
            ServerMessageType::Event,
            json!({"entities": msg.entities}),
        );
    }
}

/// WebSocket endpoint handler: validates the handshake, then upgrades.
///
/// Rejections still complete the upgrade so the `disconnect` frame can be
/// delivered over the WebSocket before the mandated close code.
pub async fn audiohook_websocket(
    req: HttpRequest,
    stream: web::Payload,
    app_state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let config = app_state.get_config();

    let handshake = match validate_headers(&req, &config.auth) {
        Ok(handshake) => handshake,
        Err(rejection) => {
            let session_id = rejection_session_id(&req);
            warn!(
                "Rejecting connection for session '{}': {}",
                session_id, rejection.info
            );
            return ws::start(
                RejectedSocket {
                    frame: disconnect_frame(session_id, rejection.reason, rejection.info),
                    close_code: rejection.close_code,
                },
                &req,
                stream,
            );
        }
    };

    if app_state.registry.len() >= config.performance.max_concurrent_sessions {
        warn!(
            "Rejecting session {}: at capacity ({} active)",
            handshake.session_id,
            app_state.registry.len()
        );
        return ws::start(
            RejectedSocket {
                frame: disconnect_frame(
                    &handshake.session_id,
                    DisconnectReason::Error,
                    "Maximum concurrent sessions reached",
                ),
                close_code: 1008,
            },
            &req,
            stream,
        );
    }

    info!(
        "New connection for session {} (correlation {})",
        handshake.session_id, handshake.correlation_id
    );
    ws::start(AudioHookSocket::new(handshake, app_state), &req, stream)
}
