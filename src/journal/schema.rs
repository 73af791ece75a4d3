//! Journal schema and record types

use crate::snapshot::ConversationSnapshot;
use crate::state_machine::ConversationState;
use crate::wisdom::Tradition;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS journal_entries (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    user_input TEXT NOT NULL,
    clarification TEXT,
    tradition TEXT,
    thinker TEXT,
    passage_text TEXT,
    source TEXT,
    context TEXT,
    reflection_question TEXT,
    notes TEXT,
    conversation_data TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_journal_user_created ON journal_entries(user_id, created_at DESC);
";

/// Stored journal record.
///
/// The flat columns duplicate the chosen passage so lists and summaries never
/// have to decode `conversation_data`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: String,
    pub user_id: String,
    pub user_input: String,
    pub clarification: Option<String>,
    pub tradition: Option<String>,
    pub thinker: Option<String>,
    pub passage_text: Option<String>,
    pub source: Option<String>,
    pub context: Option<String>,
    pub reflection_question: Option<String>,
    pub notes: Option<String>,
    /// Opaque [`ConversationSnapshot`] payload
    pub conversation_data: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JournalEntry {
    /// A voice was chosen for this entry
    pub fn is_complete(&self) -> bool {
        self.thinker.is_some()
    }

    pub fn tradition(&self) -> Option<Tradition> {
        self.tradition.as_deref().and_then(|t| t.parse().ok())
    }
}

/// Fields for a new journal record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewJournalEntry {
    pub user_input: String,
    pub clarification: Option<String>,
    pub tradition: Option<String>,
    pub thinker: Option<String>,
    pub passage_text: Option<String>,
    pub source: Option<String>,
    pub context: Option<String>,
    pub reflection_question: Option<String>,
    pub notes: Option<String>,
    pub conversation_data: Option<Value>,
}

impl NewJournalEntry {
    /// Denormalize a live session plus its snapshot into journal fields
    pub fn from_session(
        state: &ConversationState,
        snapshot: &ConversationSnapshot,
    ) -> Result<Self, serde_json::Error> {
        let voice = state.selected_voice.as_ref();
        Ok(Self {
            user_input: state.user_input.clone(),
            clarification: Some(state.clarification.clone()).filter(|c| !c.is_empty()),
            tradition: voice.map(|v| v.tradition.as_str().to_string()),
            thinker: voice.map(|v| v.thinker.clone()),
            passage_text: voice.map(|v| v.text.clone()),
            source: voice.and_then(|v| v.source.clone()),
            context: voice.map(|v| v.context.clone()),
            reflection_question: voice.map(|v| v.reflection_question.clone()),
            notes: None,
            conversation_data: Some(snapshot.to_value()?),
        })
    }
}

/// Partial update; `None` leaves a column unchanged
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JournalEntryUpdate {
    pub user_input: Option<String>,
    pub clarification: Option<String>,
    pub tradition: Option<String>,
    pub thinker: Option<String>,
    pub passage_text: Option<String>,
    pub source: Option<String>,
    pub context: Option<String>,
    pub reflection_question: Option<String>,
    pub notes: Option<String>,
    pub conversation_data: Option<Value>,
}

impl From<NewJournalEntry> for JournalEntryUpdate {
    fn from(entry: NewJournalEntry) -> Self {
        Self {
            user_input: Some(entry.user_input),
            clarification: entry.clarification,
            tradition: entry.tradition,
            thinker: entry.thinker,
            passage_text: entry.passage_text,
            source: entry.source,
            context: entry.context,
            reflection_question: entry.reflection_question,
            notes: entry.notes,
            conversation_data: entry.conversation_data,
        }
    }
}
