//! Banter Engine - Chat-stream consumption and conversation state.
//!
//! This crate contains the working core of the Banter client:
//! - Stream framing over the raw transport bytes
//! - The conversation store (transcript plus status flags)
//! - The session controller that runs one streaming turn at a time
//! - The HTTP client for the conversation service
//!
//! NOTE: This crate should NOT contain any UI/TUI code.
//! Rendering and input belong to the embedding application.

#![deny(clippy::print_stdout, clippy::print_stderr)]

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod store;
pub mod streaming;

#[cfg(test)]
mod tests;

// Re-exports
pub use client::{ChatBackend, SignalStream};
pub use config::{ChatConfig, DEFAULT_BASE_URL};
pub use error::{BanterError, Result};
pub use session::{ChatSession, TurnOutcome, TurnPhase};
pub use store::{ConversationStore, SharedConversationStore};
pub use streaming::EventFramer;

// Protocol re-export so embedders depend on one crate
pub use banter_protocol as protocol;
