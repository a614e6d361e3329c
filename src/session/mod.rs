//! # Session Management
//!
//! Per-connection protocol state and the shared active-session table.
//!
//! ## Session Lifecycle:
//! 1. **Uninitialized**: socket accepted, nothing negotiated
//! 2. **OpenPending**: `open` received, provider initialization in flight
//! 3. **Active**: `opened` sent, audio frames accepted
//! 4. **Closing**: `close` received, provider finalization in flight
//! 5. **Closed**: `closed` sent, socket shutting down
//!
//! There is no reconnection or resumption: a session that leaves the table
//! for any reason is gone for good.

pub mod registry;
pub mod state;

pub use registry::SessionRegistry;
pub use state::{SessionPhase, SessionState};
