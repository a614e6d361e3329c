//! # AudioHook Server - Main Application Entry Point
//!
//! Boots the server: environment file, structured logging, layered
//! configuration, collaborator wiring (conversation store, event sink, speech
//! provider), then the Actix HTTP server carrying the WebSocket endpoint and
//! the conversation viewer API. Shutdown drains the server before closing
//! the collaborators.

mod audio;
mod config;
mod error;
mod events;
mod handlers;
mod health;
mod middleware;
mod protocol;
mod session;
mod speech;
mod state;
mod storage;
mod websocket;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use config::AppConfig;
use events::{EventSink as _, LogEventSink};
use speech::{RemoteSpeechProvider, SpeechProvider as _};
use state::AppState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use storage::{ConversationStore as _, InMemoryConversationStore};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

static SHUTDOWN_SIGNAL: AtomicBool = AtomicBool::new(false);

#[actix_web::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    info!("Starting audiohook-server v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Configuration loaded: {}:{}",
        config.server.host, config.server.port
    );

    let store = Arc::new(InMemoryConversationStore::new());
    let events = Arc::new(LogEventSink);
    let provider = Arc::new(RemoteSpeechProvider::new(
        config.speech.recognizer_url.clone(),
        config.speech.assist_window,
    ));
    let app_state = AppState::new(
        config.clone(),
        store.clone(),
        events.clone(),
        provider.clone(),
    );
    let bind_addr = format!("{}:{}", config.server.host, config.server.port);

    setup_signal_handlers();

    info!("Starting HTTP server on {}", bind_addr);

    let server = HttpServer::new({
        let app_state = app_state.clone();
        move || {
            let cors = Cors::default()
                .allow_any_origin()
                .allow_any_method()
                .allow_any_header()
                .max_age(3600);

            App::new()
                .app_data(web::Data::new(app_state.clone()))
                .wrap(cors)
                .wrap(middleware::MetricsMiddleware)
                .wrap(middleware::RequestLogging)
                .route("/audiohook/ws", web::get().to(websocket::audiohook_websocket))
                .service(
                    web::scope("/api/v1")
                        .route("/health", web::get().to(health::health_check))
                        .route("/metrics", web::get().to(health::detailed_metrics))
                        .route(
                            "/conversations",
                            web::get().to(handlers::list_conversations),
                        )
                        .route(
                            "/conversations/{id}",
                            web::get().to(handlers::get_conversation),
                        ),
                )
                .route("/health", web::get().to(health::health_check))
        }
    })
    .bind(&bind_addr)?
    .run();

    let server_handle = server.handle();
    let server_task = tokio::spawn(server);

    tokio::select! {
        result = server_task => {
            match result {
                Ok(Err(e)) => error!("Server error: {}", e),
                Err(e) => error!("Server task error: {}", e),
                Ok(Ok(())) => {}
            }
        }
        _ = wait_for_shutdown() => {
            info!("Shutdown signal received, stopping server...");
            server_handle.stop(true).await;
        }
    }

    // Collaborators close only after the server stops accepting traffic, so
    // no live session can observe a closed store or provider
    provider.close().await;
    if let Err(e) = store.close().await {
        error!("Store close failed: {:#}", e);
    }
    if let Err(e) = events.close().await {
        error!("Event sink close failed: {:#}", e);
    }

    info!("Server stopped gracefully");
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "audiohook_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install SIGTERM/SIGINT handlers that flip the global shutdown flag.
fn setup_signal_handlers() {
    tokio::spawn(async {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler");
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
            .expect("Failed to install SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM"),
            _ = sigint.recv() => info!("Received SIGINT"),
        }

        SHUTDOWN_SIGNAL.store(true, Ordering::SeqCst);
    });
}

async fn wait_for_shutdown() {
    while !SHUTDOWN_SIGNAL.load(Ordering::SeqCst) {
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
    }
}
