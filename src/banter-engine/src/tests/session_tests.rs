//! End-to-end turn lifecycle tests against a mock service.

use std::sync::Arc;
use std::time::Duration;

use banter_protocol::{Role, SessionId};

use crate::client::ChatBackend;
use crate::config::ChatConfig;
use crate::session::{ChatSession, TurnOutcome, TurnPhase};
use crate::store::{ConversationStore, SharedConversationStore};

fn session_for(server: &wiremock::MockServer) -> (Arc<ChatSession>, SharedConversationStore) {
    let store = ConversationStore::new().into_shared();
    let backend = ChatBackend::new(&ChatConfig::with_base_url(server.uri())).expect("backend");
    let session = Arc::new(ChatSession::new(backend, Arc::clone(&store)));
    (session, store)
}

fn stream_body(records: &[&str]) -> String {
    let mut body = String::new();
    for record in records {
        body.push_str("data: ");
        body.push_str(record);
        body.push_str("\n\n");
    }
    body
}

async fn mount_turn(server: &wiremock::MockServer, records: &[&str]) {
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_raw(stream_body(records), "text/event-stream"),
        )
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_streamed_turn_updates_transcript() {
    let server = wiremock::MockServer::start().await;
    mount_turn(
        &server,
        &[
            "{\"content\":\"Hello\"}",
            "{\"content\":\" there\"}",
            "{\"done\":true,\"session_id\":\"sess-1\"}",
        ],
    )
    .await;

    let (session, store) = session_for(&server);
    let outcome = session.send_message("hi").await;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(session.phase(), TurnPhase::Idle);
    assert_eq!(session.server_session(), Some(SessionId::new("sess-1")));

    let store = store.lock().unwrap();
    assert_eq!(store.len(), 2);
    assert_eq!(store.entries()[0].role, Role::User);
    assert_eq!(store.entries()[0].content, "hi");
    assert_eq!(store.entries()[1].role, Role::Assistant);
    assert_eq!(store.entries()[1].content, "Hello there");
    assert!(!store.is_sending());
    assert!(!store.is_streaming());
    assert!(store.last_error().is_none());
}

#[tokio::test]
async fn test_input_is_trimmed_before_sending() {
    let server = wiremock::MockServer::start().await;
    mount_turn(&server, &["{\"done\":true,\"session_id\":\"sess-1\"}"]).await;

    let (session, store) = session_for(&server);
    let outcome = session.send_message("  hi  \n").await;

    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(store.lock().unwrap().entries()[0].content, "hi");
}

#[tokio::test]
async fn test_stream_error_marks_turn_failed() {
    let server = wiremock::MockServer::start().await;
    mount_turn(
        &server,
        &["{\"content\":\"par\"}", "{\"error\":\"model overloaded\"}"],
    )
    .await;

    let (session, store) = session_for(&server);
    let outcome = session.send_message("hi").await;

    assert_eq!(outcome, TurnOutcome::Failed);
    assert_eq!(session.phase(), TurnPhase::Idle);

    let store = store.lock().unwrap();
    assert_eq!(store.last_error(), Some("model overloaded"));
    // Content streamed before the failure is kept.
    assert_eq!(store.entries()[1].content, "par");
    assert!(!store.is_sending());
    assert!(!store.is_streaming());
}

#[tokio::test]
async fn test_error_status_marks_turn_failed() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(wiremock::ResponseTemplate::new(503).set_body_raw(
            serde_json::json!({"detail": "service warming up"}).to_string(),
            "application/json",
        ))
        .mount(&server)
        .await;

    let (session, store) = session_for(&server);
    let outcome = session.send_message("hi").await;

    assert_eq!(outcome, TurnOutcome::Failed);

    let store = store.lock().unwrap();
    assert_eq!(store.len(), 2);
    // The placeholder stays empty when the request is rejected outright.
    assert_eq!(store.entries()[1].content, "");
    assert!(
        store
            .last_error()
            .expect("error recorded")
            .contains("service warming up")
    );
    assert!(!store.is_sending());
    assert!(!store.is_streaming());
}

#[tokio::test]
async fn test_second_send_rejected_while_busy() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_raw(
                    stream_body(&["{\"done\":true,\"session_id\":\"sess-1\"}"]),
                    "text/event-stream",
                )
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let (session, store) = session_for(&server);

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_message("first").await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    {
        let store = store.lock().unwrap();
        assert!(store.is_sending());
        // The response status has not arrived yet.
        assert!(!store.is_streaming());
    }

    let second = session.send_message("second").await;
    assert_eq!(second, TurnOutcome::RejectedBusy);

    assert_eq!(first.await.expect("join"), TurnOutcome::Completed);

    let store = store.lock().unwrap();
    // Only the first turn's entries exist.
    assert_eq!(store.len(), 2);
    assert_eq!(store.entries()[0].content, "first");
}

#[tokio::test]
async fn test_cancel_mid_turn_clears_flags_and_allows_resend() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_raw(
                    stream_body(&["{\"done\":true,\"session_id\":\"sess-1\"}"]),
                    "text/event-stream",
                )
                .set_delay(Duration::from_secs(30)),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_turn(&server, &["{\"done\":true,\"session_id\":\"sess-2\"}"]).await;

    let (session, store) = session_for(&server);

    let first = {
        let session = Arc::clone(&session);
        tokio::spawn(async move { session.send_message("first").await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    session.cancel();

    assert_eq!(first.await.expect("join"), TurnOutcome::Cancelled);
    assert_eq!(session.phase(), TurnPhase::Idle);
    {
        let store = store.lock().unwrap();
        assert!(!store.is_sending());
        assert!(!store.is_streaming());
        assert!(store.last_error().is_none());
        // Cancelled turn leaves its entries in place.
        assert_eq!(store.len(), 2);
    }

    // A second cancel after the turn ended changes nothing.
    session.cancel();

    let outcome = session.send_message("second").await;
    assert_eq!(outcome, TurnOutcome::Completed);
    assert_eq!(store.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn test_session_id_echoed_on_next_turn() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
            stream_body(&["{\"done\":true,\"session_id\":\"sess-1\"}"]),
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;

    // The second turn only matches when the request carries the
    // session identifier learned on the first.
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .and(wiremock::matchers::body_partial_json(
            serde_json::json!({"session_id": "sess-1"}),
        ))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
            stream_body(&["{\"done\":true,\"session_id\":\"sess-1\"}"]),
            "text/event-stream",
        ))
        .mount(&server)
        .await;

    let (session, _store) = session_for(&server);

    assert_eq!(session.send_message("first").await, TurnOutcome::Completed);
    assert_eq!(session.server_session(), Some(SessionId::new("sess-1")));

    assert_eq!(session.send_message("second").await, TurnOutcome::Completed);
    assert_eq!(session.server_session(), Some(SessionId::new("sess-1")));
}

#[tokio::test]
async fn test_clear_history_deletes_and_renegotiates() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
            stream_body(&["{\"content\":\"Reply\"}", "{\"done\":true,\"session_id\":\"sess-1\"}"]),
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_turn(&server, &["{\"done\":true,\"session_id\":\"sess-2\"}"]).await;
    wiremock::Mock::given(wiremock::matchers::method("DELETE"))
        .and(wiremock::matchers::path("/chat/history/sess-1"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
            serde_json::json!({"success": true}).to_string(),
            "application/json",
        ))
        .mount(&server)
        .await;

    let (session, store) = session_for(&server);

    assert_eq!(session.send_message("first").await, TurnOutcome::Completed);
    assert_eq!(store.lock().unwrap().len(), 2);

    session.clear_history().await;

    assert!(store.lock().unwrap().is_empty());
    assert_eq!(session.server_session(), None);

    // The next turn starts a fresh session.
    assert_eq!(session.send_message("again").await, TurnOutcome::Completed);
    assert_eq!(session.server_session(), Some(SessionId::new("sess-2")));
}

#[tokio::test]
async fn test_clear_history_resets_even_if_delete_fails() {
    let server = wiremock::MockServer::start().await;
    mount_turn(&server, &["{\"done\":true,\"session_id\":\"sess-1\"}"]).await;
    wiremock::Mock::given(wiremock::matchers::method("DELETE"))
        .and(wiremock::matchers::path("/chat/history/sess-1"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let (session, store) = session_for(&server);
    session.send_message("hello").await;

    session.clear_history().await;

    assert!(store.lock().unwrap().is_empty());
    assert_eq!(session.server_session(), None);
    assert!(store.lock().unwrap().last_error().is_none());
}

#[tokio::test]
async fn test_clear_history_without_session_only_resets_locally() {
    let server = wiremock::MockServer::start().await;
    let (session, store) = session_for(&server);

    // Nothing was ever sent; there is no session to delete.
    session.clear_history().await;

    assert!(store.lock().unwrap().is_empty());
    assert_eq!(session.server_session(), None);
    assert_eq!(session.phase(), TurnPhase::Idle);
}

#[tokio::test]
async fn test_failed_turn_error_clears_on_next_send() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
            stream_body(&["{\"error\":\"boom\"}"]),
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_turn(&server, &["{\"done\":true,\"session_id\":\"sess-1\"}"]).await;

    let (session, store) = session_for(&server);

    assert_eq!(session.send_message("first").await, TurnOutcome::Failed);
    {
        let store = store.lock().unwrap();
        assert_eq!(store.last_error(), Some("boom"));
        // The placeholder never received content.
        assert_eq!(store.entries()[1].content, "");
    }

    assert_eq!(session.send_message("retry").await, TurnOutcome::Completed);
    assert!(store.lock().unwrap().last_error().is_none());
}

#[tokio::test]
async fn test_session_assignment_from_later_stream_is_ignored() {
    let server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/chat/"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_raw(
            stream_body(&["{\"done\":true,\"session_id\":\"sess-1\"}"]),
            "text/event-stream",
        ))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_turn(&server, &["{\"done\":true,\"session_id\":\"sess-9\"}"]).await;

    let (session, _store) = session_for(&server);

    assert_eq!(session.send_message("first").await, TurnOutcome::Completed);
    assert_eq!(session.send_message("second").await, TurnOutcome::Completed);

    // The identifier learned on the first turn sticks.
    assert_eq!(session.server_session(), Some(SessionId::new("sess-1")));
}
