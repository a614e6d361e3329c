//! Per-connection session state.
//!
//! Owned exclusively by the connection actor: all mutation happens on the
//! actor's mailbox, so no locking is needed here. Background tasks that need
//! to affect a session marshal a message into the actor instead of touching
//! this struct.

use crate::protocol::MediaChannel;
use crate::speech::ProviderSessionId;

/// Protocol state machine phase for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connection accepted, no `open` seen yet.
    Uninitialized,
    /// `open` received; provider initialization in flight.
    OpenPending,
    /// `opened` sent; audio frames are routed to the provider.
    Active,
    /// `close` received; provider finalization in flight.
    Closing,
    /// `closed` sent; the socket is going away.
    Closed,
}

/// Mutable state for one live session.
#[derive(Debug)]
pub struct SessionState {
    /// Protocol-supplied session identifier, the key into the active table.
    pub session_id: String,
    /// Learned from `open`; `None` until then.
    pub conversation_id: Option<String>,
    /// Last client sequence number observed; echoed as `clientseq` on replies.
    pub client_seq: u64,
    /// Server-owned counter, incremented exactly once per outbound message.
    server_seq: u64,
    /// Media descriptor selected for recognition at `open`.
    pub media: Option<MediaChannel>,
    /// Recognition language, updatable via `update`.
    pub language: Option<String>,
    /// Opaque handle issued by the speech provider; the core only stores it.
    pub provider_session: Option<ProviderSessionId>,
    pub phase: SessionPhase,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            conversation_id: None,
            client_seq: 0,
            server_seq: 0,
            media: None,
            language: None,
            provider_session: None,
            phase: SessionPhase::Uninitialized,
        }
    }

    /// Record the sequence number of an inbound client message. Called before
    /// any reply is produced so replies always acknowledge the latest message.
    pub fn observe_client_seq(&mut self, seq: u64) {
        self.client_seq = seq;
    }

    /// Claim the next server sequence number. Strictly increasing by one,
    /// starting at 1 for the first outbound message.
    pub fn next_server_seq(&mut self) -> u64 {
        self.server_seq += 1;
        self.server_seq
    }

    pub fn server_seq(&self) -> u64 {
        self.server_seq
    }

    /// Whether binary audio frames should be forwarded to the provider.
    pub fn accepts_audio(&self) -> bool {
        self.phase == SessionPhase::Active && self.provider_session.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_session_defaults() {
        let state = SessionState::new("s1");
        assert_eq!(state.phase, SessionPhase::Uninitialized);
        assert_eq!(state.client_seq, 0);
        assert_eq!(state.server_seq(), 0);
        assert!(state.conversation_id.is_none());
        assert!(!state.accepts_audio());
    }

    #[test]
    fn test_server_seq_strictly_increments() {
        let mut state = SessionState::new("s1");
        let seqs: Vec<u64> = (0..5).map(|_| state.next_server_seq()).collect();
        assert_eq!(seqs, vec![1, 2, 3, 4, 5]);
        assert_eq!(state.server_seq(), 5);
    }

    #[test]
    fn test_client_seq_tracks_latest() {
        let mut state = SessionState::new("s1");
        state.observe_client_seq(1);
        state.observe_client_seq(2);
        state.observe_client_seq(7);
        assert_eq!(state.client_seq, 7);
    }

    #[test]
    fn test_accepts_audio_requires_active_and_provider() {
        let mut state = SessionState::new("s1");
        state.phase = SessionPhase::Active;
        assert!(!state.accepts_audio());

        state.provider_session = Some(ProviderSessionId::new());
        assert!(state.accepts_audio());

        state.phase = SessionPhase::Closing;
        assert!(!state.accepts_audio());
    }
}
