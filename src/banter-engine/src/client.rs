//! Conversation service client.
//!
//! Opens streaming turns against the service and exposes the decoded
//! record stream; also covers the non-streaming turn variant and the
//! server-side history endpoints.

use std::pin::Pin;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use banter_protocol::{
    SessionHistory, SessionId, StreamSignal, TurnReply, TurnRequest, decode_record,
};

use crate::config::ChatConfig;
use crate::error::{BanterError, Result};
use crate::streaming::EventFramer;

/// Decoded signals of one streaming turn, in framed order.
pub type SignalStream = Pin<Box<dyn Stream<Item = Result<StreamSignal>> + Send>>;

/// Signals buffered between the transport reader and the consumer.
const SIGNAL_CHANNEL_CAPACITY: usize = 100;

/// Client for the conversation service.
#[derive(Clone)]
pub struct ChatBackend {
    http: reqwest::Client,
    base_url: String,
    chunk_timeout: Duration,
    request_timeout: Duration,
}

impl ChatBackend {
    /// Build a backend from configuration.
    ///
    /// The client carries no overall request timeout so a streaming
    /// reply can run as long as it keeps producing data; the per-chunk
    /// timeout guards against stalls, and non-streaming calls set their
    /// own deadline per request.
    pub fn new(config: &ChatConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .tcp_nodelay(true)
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            chunk_timeout: config.chunk_timeout(),
            request_timeout: config.request_timeout(),
        })
    }

    /// Service root this backend talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn turn_url(&self) -> String {
        format!("{}/chat/", self.base_url)
    }

    fn history_url(&self, session_id: &SessionId) -> String {
        format!("{}/chat/history/{}", self.base_url, session_id)
    }

    /// Open a streaming turn.
    ///
    /// Resolves once the response status arrives. The returned stream
    /// yields decoded signals until the service closes the connection,
    /// a failure ends the turn, or `cancel` fires; cancelling drops the
    /// transport immediately.
    pub async fn open_turn_stream(
        &self,
        message: &str,
        session_id: Option<SessionId>,
        cancel: CancellationToken,
    ) -> Result<SignalStream> {
        let url = self.turn_url();
        let request = TurnRequest::streaming(message, session_id);

        tracing::debug!(url = %url, session = ?request.session_id, "opening turn stream");

        let response = self
            .http
            .post(&url)
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = extract_error_message(&body, status.as_u16());
            tracing::warn!(status = %status, error = %message, "turn request rejected");
            return Err(BanterError::service(status.as_u16(), message));
        }

        let (tx, rx) = mpsc::channel::<Result<StreamSignal>>(SIGNAL_CHANNEL_CAPACITY);
        let chunk_timeout = self.chunk_timeout;

        tokio::spawn(async move {
            let mut framer = EventFramer::new();
            let mut body = response.bytes_stream();

            loop {
                let chunk = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        tracing::debug!("turn stream cancelled, releasing transport");
                        break;
                    }
                    chunk = tokio::time::timeout(chunk_timeout, body.next()) => chunk,
                };

                match chunk {
                    // Timed out waiting for the next chunk.
                    Err(_) => {
                        let seconds = chunk_timeout.as_secs();
                        tracing::warn!(seconds, "turn stream stalled");
                        let _ = tx.send(Err(BanterError::StreamStalled { seconds })).await;
                        break;
                    }
                    // Service closed the connection.
                    Ok(None) => {
                        if framer.has_partial() {
                            tracing::debug!(
                                pending = framer.pending_bytes(),
                                "discarding unterminated trailing data"
                            );
                        }
                        break;
                    }
                    Ok(Some(Err(e))) => {
                        let _ = tx.send(Err(BanterError::stream(e.to_string()))).await;
                        break;
                    }
                    Ok(Some(Ok(bytes))) => {
                        let mut consumer_gone = false;
                        for payload in framer.push(&bytes) {
                            match decode_record(&payload) {
                                Ok(signal) => {
                                    if tx.send(Ok(signal)).await.is_err() {
                                        consumer_gone = true;
                                        break;
                                    }
                                }
                                Err(e) => {
                                    tracing::debug!(
                                        error = %e,
                                        payload = %payload,
                                        "skipping undecodable record"
                                    );
                                }
                            }
                        }
                        if consumer_gone {
                            break;
                        }
                    }
                }
            }
        });

        Ok(Box::pin(ReceiverStream::new(rx)))
    }

    /// Run one turn without streaming; the whole reply arrives at once.
    pub async fn send_turn_blocking(
        &self,
        message: &str,
        session_id: Option<SessionId>,
    ) -> Result<TurnReply> {
        let url = self.turn_url();
        let request = TurnRequest::blocking(message, session_id);

        let response = self
            .http
            .post(&url)
            .json(&request)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<TurnReply>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BanterError::service(
                status.as_u16(),
                extract_error_message(&body, status.as_u16()),
            ))
        }
    }

    /// Fetch the server-stored history for a session.
    pub async fn fetch_history(&self, session_id: &SessionId) -> Result<SessionHistory> {
        let url = self.history_url(session_id);

        let response = self
            .http
            .get(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(response.json::<SessionHistory>().await?)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BanterError::service(
                status.as_u16(),
                extract_error_message(&body, status.as_u16()),
            ))
        }
    }

    /// Delete the server-stored history for a session.
    pub async fn delete_history(&self, session_id: &SessionId) -> Result<()> {
        let url = self.history_url(session_id);

        let response = self
            .http
            .delete(&url)
            .timeout(self.request_timeout)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            tracing::info!(session = %session_id, "deleted server-side history");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(BanterError::service(
                status.as_u16(),
                extract_error_message(&body, status.as_u16()),
            ))
        }
    }
}

/// Pull a displayable message out of a service error body.
///
/// The service wraps failures as `{"detail": "..."}`; fall back to the
/// raw body, then to the bare status code.
fn extract_error_message(body: &str, status: u16) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body)
        && let Some(detail) = value.get("detail").and_then(|d| d.as_str())
    {
        return detail.to_string();
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {status}")
    } else {
        trimmed.chars().take(200).collect()
    }
}
