//! HTTP handlers for the conversation viewer surface. These sit next to, not
//! inside, the protocol core: they only read what sessions have persisted.

pub mod conversations;

pub use conversations::{get_conversation, list_conversations};
