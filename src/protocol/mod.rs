//! # AudioHook Protocol
//!
//! Wire-level message model for the AudioHook session protocol: the JSON
//! envelope exchanged over the WebSocket text channel, the typed client and
//! server message kinds, and the duration formatting convention used for all
//! timing offsets that cross the protocol boundary.
//!
//! ## Message Flow:
//! - **Client → Server**: `open`, `ping`, `update`, `close` (JSON text frames)
//! - **Server → Client**: `opened`, `pong`, `updated`, `closed`, `disconnect`, `event`
//! - **Client → Server**: raw codec-encoded audio (binary frames, after `opened`)
//!
//! Unknown client message types parse into a fallback variant that is logged
//! and never routed to business logic.

pub mod messages;

pub use messages::{
    parse_client_message, ClientMessage, ClientMessageBody, CloseParameters, CloseReason,
    DisconnectParameters, DisconnectReason, MediaChannel, OpenParameters, OpenedParameters,
    ParticipantInfo, PingParameters, ServerMessage, ServerMessageType, UpdateParameters,
    PROTOCOL_VERSION,
};

/// Number of 100-nanosecond ticks per second, the unit some recognition
/// backends report offsets in.
pub const TICKS_PER_SECOND: u64 = 10_000_000;

/// Format a tick offset as an ISO-8601 duration string (`PT<seconds>S`, two
/// decimal places), the representation used for every timing value on the wire.
pub fn ticks_to_duration(ticks: u64) -> String {
    format!("PT{:.2}S", ticks as f64 / TICKS_PER_SECOND as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ticks_to_duration_formatting() {
        assert_eq!(ticks_to_duration(0), "PT0.00S");
        assert_eq!(ticks_to_duration(12_300_000), "PT1.23S");
        assert_eq!(ticks_to_duration(10_000_000), "PT1.00S");
        // Sub-tick precision rounds to two decimals
        assert_eq!(ticks_to_duration(15_555_555), "PT1.56S");
    }
}
