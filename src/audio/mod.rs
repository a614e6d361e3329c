//! # Audio Format Handling
//!
//! Helpers for the audio formats that cross the wire. Telephony clients send
//! G.711 mu-law (PCMU) at 8 kHz; the recognition backend consumes 16-bit
//! little-endian PCM. Decoding happens inside the speech provider's
//! background task, never on the connection actor.

pub mod mulaw;
