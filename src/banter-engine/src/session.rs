//! Stream session control.
//!
//! One [`ChatSession`] owns the lifecycle of a conversation: it runs a
//! single streaming turn at a time through an explicit phase machine,
//! remembers the server-assigned session identifier across turns, and
//! supports cooperative cancellation and history erasure.

use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use banter_protocol::{SessionId, StreamSignal, TranscriptEntry};

use crate::client::{ChatBackend, SignalStream};
use crate::config::ChatConfig;
use crate::error::Result;
use crate::store::{ConversationStore, SharedConversationStore};

/// Phase of the turn lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnPhase {
    /// No turn in flight.
    #[default]
    Idle,
    /// Request submitted, awaiting the response status.
    Sending,
    /// Response open, signals flowing.
    Streaming,
    /// Last turn ended normally.
    Completed,
    /// Last turn ended with a recorded failure.
    Failed,
    /// Last turn was cancelled by the caller.
    Cancelled,
}

impl TurnPhase {
    /// Check if a turn currently occupies the transport.
    pub fn is_active(self) -> bool {
        matches!(self, Self::Sending | Self::Streaming)
    }

    /// Check if this phase ends a turn.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check whether the machine may move from this phase to `next`.
    pub fn can_advance_to(self, next: TurnPhase) -> bool {
        use TurnPhase::*;
        matches!(
            (self, next),
            (Idle, Sending)
                | (Sending, Streaming)
                | (Sending, Failed)
                | (Sending, Cancelled)
                | (Streaming, Completed)
                | (Streaming, Failed)
                | (Streaming, Cancelled)
                | (Completed, Idle)
                | (Failed, Idle)
                | (Cancelled, Idle)
        )
    }
}

/// How one send request ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Stream ended normally.
    Completed,
    /// Turn failed; the store's last error says why.
    Failed,
    /// Caller cancelled mid-turn; partial content is kept.
    Cancelled,
    /// Rejected without side effects: a turn was already in flight.
    RejectedBusy,
    /// Rejected without side effects: the trimmed message was empty.
    RejectedEmpty,
}

/// Controller state behind the session mutex.
#[derive(Debug, Default)]
struct SessionState {
    phase: TurnPhase,
    server_session: Option<SessionId>,
    active_cancel: Option<CancellationToken>,
}

/// Orchestrates streaming turns for one conversation.
///
/// Methods take `&self`; callers may invoke `cancel` or inspect state
/// from another task while `send_message` runs.
pub struct ChatSession {
    backend: ChatBackend,
    store: SharedConversationStore,
    state: Mutex<SessionState>,
}

impl ChatSession {
    /// Create a session writing into the given store.
    pub fn new(backend: ChatBackend, store: SharedConversationStore) -> Self {
        Self {
            backend,
            store,
            state: Mutex::new(SessionState::default()),
        }
    }

    /// Build a session and its store straight from configuration.
    pub fn from_config(config: &ChatConfig) -> Result<Self> {
        let backend = ChatBackend::new(config)?;
        let store = ConversationStore::with_panel_visible(config.panel_visible_on_start);
        Ok(Self::new(backend, store.into_shared()))
    }

    /// Shared store handle.
    pub fn store(&self) -> SharedConversationStore {
        Arc::clone(&self.store)
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> TurnPhase {
        self.state.lock().unwrap().phase
    }

    /// Server-assigned session identifier, once one has arrived.
    pub fn server_session(&self) -> Option<SessionId> {
        self.state.lock().unwrap().server_session.clone()
    }

    /// Run one streaming turn to completion.
    ///
    /// Appends the user entry and an empty assistant placeholder, opens
    /// the stream, applies each signal to the store in framed order,
    /// and reports how the turn ended. Failures are recorded in the
    /// store rather than returned as errors; a blank message or an
    /// already-active turn is rejected before any state changes.
    pub async fn send_message(&self, message: &str) -> TurnOutcome {
        let message = message.trim();
        if message.is_empty() {
            tracing::debug!("ignoring blank message");
            return TurnOutcome::RejectedEmpty;
        }

        let (cancel, session_id) = {
            let mut state = self.state.lock().unwrap();
            if state.phase.is_active() {
                tracing::debug!(phase = ?state.phase, "turn already in flight, ignoring send");
                return TurnOutcome::RejectedBusy;
            }

            advance(&mut state.phase, TurnPhase::Sending);
            let token = CancellationToken::new();
            state.active_cancel = Some(token.clone());
            (token, state.server_session.clone())
        };

        {
            let mut store = self.store.lock().unwrap();
            store.append_entry(TranscriptEntry::user(message));
            store.append_entry(TranscriptEntry::assistant(""));
            store.set_sending(true);
            store.set_error(None);
        }

        tracing::info!(session = ?session_id, "sending message");

        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!("turn cancelled before the stream opened");
                TurnOutcome::Cancelled
            }
            opened = self.backend.open_turn_stream(message, session_id, cancel.clone()) => {
                match opened {
                    Ok(stream) => {
                        advance(&mut self.state.lock().unwrap().phase, TurnPhase::Streaming);
                        self.store.lock().unwrap().set_streaming(true);
                        self.drive_stream(stream, &cancel).await
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "turn request failed");
                        self.store.lock().unwrap().set_error(Some(e.to_string()));
                        TurnOutcome::Failed
                    }
                }
            }
        };

        self.settle_turn(outcome);
        tracing::info!(outcome = ?outcome, "turn finished");
        outcome
    }

    /// Apply decoded signals to the store until the stream ends.
    ///
    /// Kept free of transport concerns so tests can feed it from a
    /// plain channel.
    async fn drive_stream(
        &self,
        mut stream: SignalStream,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::info!("turn cancelled mid-stream");
                    return TurnOutcome::Cancelled;
                }
                item = stream.next() => item,
            };

            match item {
                // Connection closed without an explicit final record.
                None => return TurnOutcome::Completed,
                Some(Ok(StreamSignal::Fragment(text))) => {
                    self.store.lock().unwrap().append_to_last_assistant(&text);
                }
                Some(Ok(StreamSignal::SessionAssigned(id))) => {
                    self.adopt_session(id);
                }
                Some(Ok(StreamSignal::Completed { session_id })) => {
                    if let Some(id) = session_id {
                        self.adopt_session(id);
                    }
                    return TurnOutcome::Completed;
                }
                Some(Ok(StreamSignal::StreamError(message))) => {
                    tracing::warn!(error = %message, "service reported a stream failure");
                    self.store.lock().unwrap().set_error(Some(message));
                    return TurnOutcome::Failed;
                }
                Some(Err(e)) => {
                    tracing::warn!(error = %e, "transport failed mid-stream");
                    self.store.lock().unwrap().set_error(Some(e.to_string()));
                    return TurnOutcome::Failed;
                }
            }
        }
    }

    /// Keep the first identifier the service assigns; later ones are
    /// ignored.
    fn adopt_session(&self, id: SessionId) {
        let mut state = self.state.lock().unwrap();
        if state.server_session.is_none() {
            tracing::info!(session = %id, "service assigned session");
            state.server_session = Some(id);
        }
    }

    /// Record the terminal phase, return to idle and release the token.
    fn settle_turn(&self, outcome: TurnOutcome) {
        let terminal = match outcome {
            TurnOutcome::Completed => TurnPhase::Completed,
            TurnOutcome::Failed => TurnPhase::Failed,
            TurnOutcome::Cancelled => TurnPhase::Cancelled,
            TurnOutcome::RejectedBusy | TurnOutcome::RejectedEmpty => return,
        };

        {
            let mut state = self.state.lock().unwrap();
            advance(&mut state.phase, terminal);
            advance(&mut state.phase, TurnPhase::Idle);
            state.active_cancel = None;
        }

        let mut store = self.store.lock().unwrap();
        store.set_sending(false);
        store.set_streaming(false);
    }

    /// Cancel the in-flight turn, if any.
    ///
    /// Idempotent: calling again, or calling with no turn in flight,
    /// has no effect. Partial assistant content stays in the
    /// transcript.
    pub fn cancel(&self) {
        let state = self.state.lock().unwrap();
        if let Some(token) = &state.active_cancel {
            tracing::info!("cancellation requested");
            token.cancel();
        }
    }

    /// Erase the conversation.
    ///
    /// Cancels any active stream, forgets the session identifier,
    /// requests server-side deletion and empties the local transcript.
    /// A deletion failure is logged and the local reset proceeds; the
    /// next send negotiates a fresh session either way.
    pub async fn clear_history(&self) {
        self.cancel();

        let session_id = self.state.lock().unwrap().server_session.take();

        if let Some(session_id) = &session_id
            && let Err(e) = self.backend.delete_history(session_id).await
        {
            tracing::warn!(session = %session_id, error = %e, "failed to delete server-side history");
        }

        self.store.lock().unwrap().clear_transcript();
        tracing::info!("conversation cleared");
    }
}

/// Move the phase, logging any transition outside the lifecycle table.
fn advance(phase: &mut TurnPhase, next: TurnPhase) {
    if !phase.can_advance_to(next) {
        tracing::warn!(from = ?phase, to = ?next, "unexpected turn phase transition");
    }
    *phase = next;
}
