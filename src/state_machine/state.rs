//! Conversation state types

use super::message::{ChatMessage, MessageBody, LOADING_MESSAGE_ID};
use crate::wisdom::{Passage, WisdomRequest};
use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Stage
// ============================================================================

/// Position in the reflection flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[default]
    Initial,
    AwaitingInput,
    /// Clarification call in flight
    LoadingClarify,
    AwaitingResponse,
    /// Wisdom retrieval in flight, or failed and waiting for a retry
    LoadingVoices,
    ShowingVoices,
    VoiceSelected,
    /// Acknowledgment call in flight
    GeneratingAcknowledgment,
    ReflectionAcknowledged,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Initial => "initial",
            Stage::AwaitingInput => "awaiting_input",
            Stage::LoadingClarify => "loading_clarify",
            Stage::AwaitingResponse => "awaiting_response",
            Stage::LoadingVoices => "loading_voices",
            Stage::ShowingVoices => "showing_voices",
            Stage::VoiceSelected => "voice_selected",
            Stage::GeneratingAcknowledgment => "generating_acknowledgment",
            Stage::ReflectionAcknowledged => "reflection_acknowledged",
        }
    }

    /// Stages in which a voice is necessarily selected
    pub fn has_selection(self) -> bool {
        matches!(
            self,
            Stage::VoiceSelected | Stage::GeneratingAcknowledgment | Stage::ReflectionAcknowledged
        )
    }

    /// Stages that own an outstanding external call
    pub fn is_loading(self) -> bool {
        matches!(
            self,
            Stage::LoadingClarify | Stage::LoadingVoices | Stage::GeneratingAcknowledgment
        )
    }

    /// Stages where the input box is shown
    pub fn accepts_text(self) -> bool {
        matches!(
            self,
            Stage::AwaitingInput
                | Stage::AwaitingResponse
                | Stage::ShowingVoices
                | Stage::VoiceSelected
                | Stage::ReflectionAcknowledged
        )
    }

    /// Input placeholder for the stage
    pub fn placeholder(self) -> &'static str {
        match self {
            Stage::AwaitingInput => "Share what's on your mind...",
            Stage::AwaitingResponse => "Share your thoughts...",
            Stage::ShowingVoices => "Ask about any card or share more context...",
            Stage::VoiceSelected => "Add your reflections...",
            Stage::ReflectionAcknowledged => "Continue reflecting or see another voice...",
            _ => "Type a message...",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Session context
// ============================================================================

/// Immutable per-session configuration
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub session_id: String,
    pub user_name: Option<String>,
}

impl SessionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_name: None,
        }
    }

    /// A context with a fresh random session id
    pub fn generate() -> Self {
        Self::new(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_user_name(mut self, name: Option<String>) -> Self {
        self.user_name = name;
        self
    }

    /// Id for the `seq`-th message of this session
    pub fn message_id(&self, seq: u64) -> String {
        format!("{}-{seq}", self.session_id)
    }
}

// ============================================================================
// Conversation state
// ============================================================================

/// The session aggregate. Only `transition` produces new values of it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ConversationState {
    /// Transcript, in display order
    pub messages: Vec<ChatMessage>,
    pub stage: Stage,
    pub user_input: String,
    /// Last clarification or reflection text; overwritten, never appended
    pub clarification: String,
    pub selected_voice: Option<Passage>,
    /// Thinkers already offered this session, in first-seen order, no duplicates
    pub shown_thinkers: Vec<String>,
    pub is_saved: bool,
    pub journal_entry_id: Option<String>,
    pub error: Option<String>,
    /// Passages from the most recent retrieval, for re-showing without a new call
    pub offered_voices: Vec<Passage>,
    /// Most recent voice request, kept so a failed retrieval can be retried as-is
    pub voice_request: Option<WisdomRequest>,
    /// Sequence number for the next generated message id
    pub next_seq: u64,
}

impl ConversationState {
    /// Fresh state for a new session, before the greeting
    pub fn new() -> Self {
        Self::default()
    }

    /// An external call is outstanding
    pub fn is_busy(&self) -> bool {
        self.messages.iter().any(ChatMessage::is_loading)
    }

    pub fn loading_text(&self) -> Option<&str> {
        self.messages.iter().find_map(|m| match &m.body {
            MessageBody::Loading { text } => Some(text.as_deref().unwrap_or("")),
            _ => None,
        })
    }

    /// Whether the UI should currently offer a text box
    pub fn accepts_text(&self) -> bool {
        if self.is_busy() {
            return false;
        }
        self.stage.accepts_text() || self.voice_retrieval_failed()
    }

    /// In `loading_voices` with nothing in flight: the last retrieval failed
    pub fn voice_retrieval_failed(&self) -> bool {
        self.stage == Stage::LoadingVoices && !self.is_busy()
    }

    /// `selected_voice` is set exactly in the selection stages
    pub fn selection_invariant_holds(&self) -> bool {
        self.selected_voice.is_some() == self.stage.has_selection()
    }

    /// Messages excluding the transient loading indicator
    pub fn persistent_messages(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter().filter(|m| !m.is_loading())
    }

    /// Most recent user-authored texts, oldest first
    pub fn recent_user_texts(&self, limit: usize) -> Vec<&str> {
        let mut texts: Vec<&str> = self
            .messages
            .iter()
            .rev()
            .filter_map(|m| m.body.user_text())
            .take(limit)
            .collect();
        texts.reverse();
        texts
    }

    pub(crate) fn push_message(&mut self, ctx: &SessionContext, body: MessageBody) {
        let id = ctx.message_id(self.next_seq);
        self.next_seq += 1;
        self.messages.push(ChatMessage::new(id, body));
    }

    pub(crate) fn remove_loading(&mut self) {
        self.messages.retain(|m| m.id != LOADING_MESSAGE_ID);
    }

    /// Union `thinkers` into `shown_thinkers`, keeping first-seen order
    pub(crate) fn record_thinkers<'a>(&mut self, thinkers: impl IntoIterator<Item = &'a str>) {
        for thinker in thinkers {
            if !self.shown_thinkers.iter().any(|t| t == thinker) {
                self.shown_thinkers.push(thinker.to_string());
            }
        }
    }

    /// Index of the most recent message matching `pred`
    pub(crate) fn last_index_of(&self, pred: impl Fn(&ChatMessage) -> bool) -> Option<usize> {
        self.messages.iter().rposition(pred)
    }
}
