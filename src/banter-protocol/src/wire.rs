//! Wire types for the conversation endpoint.
//!
//! A streaming turn arrives as newline-delimited `data: ` records, each
//! carrying one JSON object in which every field is optional. The
//! decoder classifies each record into exactly one [`StreamSignal`] so
//! downstream code never re-inspects raw fields.

use std::fmt;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::session_id::SessionId;
use crate::transcript::{EntryMetadata, Role};

/// Request body for one conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TurnRequest {
    /// User message text.
    pub message: String,
    /// Session to continue; omitted on the first turn so the service
    /// mints a fresh one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Whether the reply should arrive as an event stream.
    pub stream: bool,
}

impl TurnRequest {
    /// Build a streaming turn request.
    pub fn streaming(message: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self {
            message: message.into(),
            session_id,
            stream: true,
        }
    }

    /// Build a request whose reply arrives as a single body.
    pub fn blocking(message: impl Into<String>, session_id: Option<SessionId>) -> Self {
        Self {
            message: message.into(),
            session_id,
            stream: false,
        }
    }
}

/// One stream record exactly as the service encodes it.
///
/// The service sets whichever fields apply; classification into a
/// [`StreamSignal`] decides what the record means.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct RawStreamEvent {
    /// Incremental reply text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Session identifier, sent on assignment and again on completion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    /// Set to `true` on the final record of a successful stream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub done: Option<bool>,
    /// Failure text when the service aborts the reply.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RawStreamEvent {
    /// Classify this record as exactly one signal.
    ///
    /// Precedence when several fields are present: error, then
    /// completion, then session assignment, then content. Returns
    /// `None` when no recognized field is set.
    pub fn classify(self) -> Option<StreamSignal> {
        match self.error {
            Some(error) if !error.is_empty() => return Some(StreamSignal::StreamError(error)),
            _ => {}
        }
        if self.done == Some(true) {
            return Some(StreamSignal::Completed {
                session_id: self.session_id,
            });
        }
        if let Some(session_id) = self.session_id {
            return Some(StreamSignal::SessionAssigned(session_id));
        }
        self.content.map(StreamSignal::Fragment)
    }
}

/// A decoded stream record.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamSignal {
    /// Incremental assistant text to append to the reply in progress.
    Fragment(String),
    /// The service assigned a session identifier to this conversation.
    SessionAssigned(SessionId),
    /// Normal end of the stream. The service repeats its session
    /// identifier on this final record.
    Completed { session_id: Option<SessionId> },
    /// Service-reported failure; terminal for the stream.
    StreamError(String),
}

/// Why a stream record failed to decode.
#[derive(Debug)]
pub enum DecodeError {
    /// The payload was not a valid JSON object for the record schema.
    Json(serde_json::Error),
    /// The payload parsed but carried no recognized field.
    UnrecognizedShape,
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json(e) => write!(f, "invalid record JSON: {e}"),
            Self::UnrecognizedShape => write!(f, "record carries no recognized field"),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Json(e) => Some(e),
            Self::UnrecognizedShape => None,
        }
    }
}

impl From<serde_json::Error> for DecodeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// Decode one framed record payload into a typed signal.
///
/// Unknown JSON fields are ignored so the service can grow the record
/// shape without breaking older clients.
pub fn decode_record(payload: &str) -> Result<StreamSignal, DecodeError> {
    let event: RawStreamEvent = serde_json::from_str(payload)?;
    event.classify().ok_or(DecodeError::UnrecognizedShape)
}

/// Reply body for a non-streaming turn.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TurnReply {
    pub message: String,
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

/// One message of a server-stored conversation history.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HistoryMessage {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<EntryMetadata>,
}

/// Server-stored history for one session.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SessionHistory {
    pub session_id: SessionId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
}
