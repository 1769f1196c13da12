//! Conversation store.
//!
//! Single owner of the transcript and the status flags the UI renders.
//! Every mutation goes through the operations here; collaborators hold
//! the shared handle and lock briefly, never across an await.

use std::sync::{Arc, Mutex};

use banter_protocol::TranscriptEntry;

/// Handle the session controller and the UI both hold.
pub type SharedConversationStore = Arc<Mutex<ConversationStore>>;

/// Ordered transcript plus conversation status flags.
#[derive(Debug, Default)]
pub struct ConversationStore {
    transcript: Vec<TranscriptEntry>,
    is_sending: bool,
    is_streaming: bool,
    last_error: Option<String>,
    panel_visible: bool,
}

impl ConversationStore {
    /// Create an empty store with all flags cleared.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store with the panel visibility preset.
    pub fn with_panel_visible(visible: bool) -> Self {
        Self {
            panel_visible: visible,
            ..Self::default()
        }
    }

    /// Wrap in the shared handle collaborators hold.
    pub fn into_shared(self) -> SharedConversationStore {
        Arc::new(Mutex::new(self))
    }

    /// Append an entry at the tail of the transcript.
    pub fn append_entry(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }

    /// Concatenate a fragment onto the tail entry when that entry is an
    /// assistant entry. Any other tail makes this a no-op, so a stray
    /// late fragment can never corrupt the transcript.
    pub fn append_to_last_assistant(&mut self, fragment: &str) {
        match self.transcript.last_mut() {
            Some(entry) if entry.is_assistant() => entry.content.push_str(fragment),
            _ => {}
        }
    }

    /// Mark a request as submitted or settled.
    pub fn set_sending(&mut self, sending: bool) {
        self.is_sending = sending;
    }

    /// Mark reply bytes as flowing or stopped.
    pub fn set_streaming(&mut self, streaming: bool) {
        self.is_streaming = streaming;
    }

    /// Record or clear the last surfaced failure.
    pub fn set_error(&mut self, error: Option<String>) {
        self.last_error = error;
    }

    /// Show or hide the conversation panel.
    pub fn set_panel_visible(&mut self, visible: bool) {
        self.panel_visible = visible;
    }

    /// Flip panel visibility.
    pub fn toggle_panel(&mut self) {
        self.panel_visible = !self.panel_visible;
    }

    /// Empty the transcript and clear the last error. Status flags are
    /// left to the controller that owns them.
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.last_error = None;
    }

    /// All entries in order.
    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.transcript
    }

    /// The tail entry, if any.
    pub fn last_entry(&self) -> Option<&TranscriptEntry> {
        self.transcript.last()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.transcript.len()
    }

    /// Check if the transcript is empty.
    pub fn is_empty(&self) -> bool {
        self.transcript.is_empty()
    }

    pub fn is_sending(&self) -> bool {
        self.is_sending
    }

    pub fn is_streaming(&self) -> bool {
        self.is_streaming
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn panel_visible(&self) -> bool {
        self.panel_visible
    }
}

#[cfg(test)]
mod tests {
    use banter_protocol::TranscriptEntry;

    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut store = ConversationStore::new();

        store.append_entry(TranscriptEntry::user("first"));
        store.append_entry(TranscriptEntry::assistant("second"));

        assert_eq!(store.len(), 2);
        assert_eq!(store.entries()[0].content, "first");
        assert_eq!(store.entries()[1].content, "second");
    }

    #[test]
    fn test_append_to_last_assistant_concatenates() {
        let mut store = ConversationStore::new();
        store.append_entry(TranscriptEntry::user("question"));
        store.append_entry(TranscriptEntry::assistant(""));

        store.append_to_last_assistant("Hel");
        store.append_to_last_assistant("lo ");
        store.append_to_last_assistant("there");

        assert_eq!(store.last_entry().expect("entry").content, "Hello there");
    }

    #[test]
    fn test_append_to_last_assistant_ignores_user_tail() {
        let mut store = ConversationStore::new();
        store.append_entry(TranscriptEntry::assistant("done"));
        store.append_entry(TranscriptEntry::user("next question"));

        store.append_to_last_assistant("stray");

        assert_eq!(store.entries()[0].content, "done");
        assert_eq!(store.entries()[1].content, "next question");
    }

    #[test]
    fn test_append_to_last_assistant_ignores_empty_transcript() {
        let mut store = ConversationStore::new();

        store.append_to_last_assistant("stray");

        assert!(store.is_empty());
    }

    #[test]
    fn test_clear_transcript_drops_entries_and_error() {
        let mut store = ConversationStore::new();
        store.append_entry(TranscriptEntry::user("hi"));
        store.set_error(Some("boom".to_string()));
        store.set_panel_visible(true);

        store.clear_transcript();

        assert!(store.is_empty());
        assert!(store.last_error().is_none());
        // Panel visibility is unrelated to the transcript.
        assert!(store.panel_visible());
    }

    #[test]
    fn test_clear_transcript_leaves_flags_to_controller() {
        let mut store = ConversationStore::new();
        store.set_sending(true);
        store.set_streaming(true);

        store.clear_transcript();

        assert!(store.is_sending());
        assert!(store.is_streaming());
    }

    #[test]
    fn test_toggle_panel() {
        let mut store = ConversationStore::new();
        assert!(!store.panel_visible());

        store.toggle_panel();
        assert!(store.panel_visible());

        store.toggle_panel();
        assert!(!store.panel_visible());
    }

    #[test]
    fn test_with_panel_visible() {
        let store = ConversationStore::with_panel_visible(true);
        assert!(store.panel_visible());
        assert!(store.is_empty());
    }

    #[test]
    fn test_error_set_and_clear() {
        let mut store = ConversationStore::new();

        store.set_error(Some("timeout".to_string()));
        assert_eq!(store.last_error(), Some("timeout"));

        store.set_error(None);
        assert!(store.last_error().is_none());
    }
}
