//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor via
//! `web::Data`. Configuration and metrics sit behind `Arc<RwLock<..>>`;
//! the collaborators (store, event sink, speech provider) are trait objects
//! so a deployment can swap implementations without touching the core.

use crate::config::AppConfig;
use crate::events::EventSink;
use crate::session::SessionRegistry;
use crate::speech::SpeechProvider;
use crate::storage::ConversationStore;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

/// Shared application state. Cloning is cheap; all fields are `Arc`s or
/// copies of immutable data.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<RwLock<AppConfig>>,
    pub metrics: Arc<RwLock<AppMetrics>>,
    /// Active-session table shared by every connection actor.
    pub registry: Arc<SessionRegistry>,
    pub store: Arc<dyn ConversationStore>,
    pub events: Arc<dyn EventSink>,
    pub provider: Arc<dyn SpeechProvider>,
    pub start_time: Instant,
}

/// Server-wide request and session metrics.
#[derive(Debug, Default)]
pub struct AppMetrics {
    pub request_count: u64,
    pub error_count: u64,
    pub active_sessions: u32,
    /// Per-endpoint request counts and latency accumulators.
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        store: Arc<dyn ConversationStore>,
        events: Arc<dyn EventSink>,
        provider: Arc<dyn SpeechProvider>,
    ) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            registry: Arc::new(SessionRegistry::new()),
            store,
            events,
            provider,
            start_time: Instant::now(),
        }
    }

    /// Snapshot the current configuration.
    pub fn get_config(&self) -> AppConfig {
        self.config.read().unwrap().clone()
    }

    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.request_count += 1;
    }

    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.error_count += 1;
    }

    /// Record one completed request against its endpoint's accumulators.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap();
        let endpoint_metric = metrics
            .endpoint_metrics
            .entry(endpoint.to_string())
            .or_default();

        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    pub fn increment_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        metrics.active_sessions += 1;
    }

    pub fn decrement_active_sessions(&self) {
        let mut metrics = self.metrics.write().unwrap();
        if metrics.active_sessions > 0 {
            metrics.active_sessions -= 1;
        }
    }

    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        let metrics = self.metrics.read().unwrap();
        AppMetrics {
            request_count: metrics.request_count,
            error_count: metrics.error_count,
            active_sessions: metrics.active_sessions,
            endpoint_metrics: metrics.endpoint_metrics.clone(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}
