//! Banter Protocol - Types shared between the chat client and the service
//!
//! This crate defines the wire shape of the conversation endpoint (turn
//! requests, stream records and their classification) and the transcript
//! entry types the client renders.

pub mod session_id;
pub mod transcript;
pub mod wire;

#[cfg(test)]
mod tests;

// Re-exports
pub use session_id::SessionId;
pub use transcript::{EntryMetadata, Role, TranscriptEntry};
pub use wire::{
    DecodeError, HistoryMessage, RawStreamEvent, SessionHistory, StreamSignal, TurnReply,
    TurnRequest, decode_record,
};
