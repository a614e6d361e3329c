//! Agent-assist summarization.
//!
//! A narrow seam over whatever produces "agent assist" output from the live
//! transcript. The bundled [`WindowedSummarizer`] is deliberately simple: it
//! batches utterances and emits a rolling digest every `window` utterances,
//! with a final flush of whatever remains at session end. A model-backed
//! summarizer implements the same trait.

use async_trait::async_trait;
use tokio::sync::Mutex;

/// Summarization seam consumed by the speech provider.
#[async_trait]
pub trait AgentAssist: Send + Sync {
    /// Feed one finalized utterance. Returns a summary when one is due.
    async fn on_transcription(&self, text: &str) -> Option<String>;

    /// Summarize any utterances not yet covered by a previous summary.
    /// Called once when recognition ends.
    async fn flush_summary(&self) -> Option<String>;
}

/// Emits a digest of the last `window` utterances every `window` utterances.
pub struct WindowedSummarizer {
    window: usize,
    pending: Mutex<Vec<String>>,
}

impl WindowedSummarizer {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    fn digest(utterances: &[String]) -> String {
        utterances.join(" ")
    }
}

#[async_trait]
impl AgentAssist for WindowedSummarizer {
    async fn on_transcription(&self, text: &str) -> Option<String> {
        let mut pending = self.pending.lock().await;
        pending.push(text.to_string());
        if pending.len() >= self.window {
            let summary = Self::digest(&pending);
            pending.clear();
            Some(summary)
        } else {
            None
        }
    }

    async fn flush_summary(&self) -> Option<String> {
        let mut pending = self.pending.lock().await;
        if pending.is_empty() {
            return None;
        }
        let summary = Self::digest(&pending);
        pending.clear();
        Some(summary)
    }
}
