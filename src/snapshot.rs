//! Conversation snapshots
//!
//! A snapshot is the persisted form of a conversation: every non-transient
//! message stamped with a capture time, plus the flow fields needed to resume.
//! The JSON field names are a storage contract; journal rows written by older
//! builds must keep decoding.

use crate::state_machine::{ConversationState, MessageBody, Stage};
use crate::wisdom::Passage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Persisted form of a [`ConversationState`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSnapshot {
    pub messages: Vec<SnapshotMessage>,
    pub stage: Stage,
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub clarification: String,
    #[serde(default)]
    pub selected_voice: Option<Passage>,
    #[serde(default)]
    pub shown_thinkers: Vec<String>,
    /// Passages from the last retrieval; absent on payloads from older builds
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub offered_voices: Vec<Passage>,
    pub saved_at: DateTime<Utc>,
    /// A voice was selected when the snapshot was taken
    pub is_complete: bool,
}

/// One stored transcript message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMessage {
    #[serde(flatten)]
    pub body: StoredMessage,
    pub timestamp: DateTime<Utc>,
}

/// Stored message payload. Mirrors [`MessageBody`] minus the loading
/// indicator and the presentation-only `expanded` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoredMessage {
    Greeting {
        text: String,
    },
    UserInput {
        text: String,
    },
    ClarifyingQuestion {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        acknowledgment: Option<String>,
    },
    UserResponse {
        text: String,
    },
    VoicesIntro {
        text: String,
    },
    VoiceCards {
        voices: Vec<Passage>,
    },
    SelectedVoice {
        voice: Passage,
    },
    ReflectionAcknowledgment {
        text: String,
    },
}

impl StoredMessage {
    /// `None` for the loading indicator, which is never persisted
    pub fn from_body(body: &MessageBody) -> Option<Self> {
        let stored = match body {
            MessageBody::Greeting { text } => StoredMessage::Greeting { text: text.clone() },
            MessageBody::UserInput { text } => StoredMessage::UserInput { text: text.clone() },
            MessageBody::ClarifyingQuestion {
                text,
                acknowledgment,
            } => StoredMessage::ClarifyingQuestion {
                text: text.clone(),
                acknowledgment: acknowledgment.clone(),
            },
            MessageBody::UserResponse { text } => {
                StoredMessage::UserResponse { text: text.clone() }
            }
            MessageBody::VoicesIntro { text } => StoredMessage::VoicesIntro { text: text.clone() },
            MessageBody::VoiceCards { voices } => StoredMessage::VoiceCards {
                voices: voices.clone(),
            },
            MessageBody::SelectedVoice { voice, .. } => StoredMessage::SelectedVoice {
                voice: voice.clone(),
            },
            MessageBody::ReflectionAcknowledgment { text } => {
                StoredMessage::ReflectionAcknowledgment { text: text.clone() }
            }
            MessageBody::Loading { .. } => return None,
        };
        Some(stored)
    }

    /// Back to a live payload. A selected voice always comes back expanded.
    pub fn into_body(self) -> MessageBody {
        match self {
            StoredMessage::Greeting { text } => MessageBody::Greeting { text },
            StoredMessage::UserInput { text } => MessageBody::UserInput { text },
            StoredMessage::ClarifyingQuestion {
                text,
                acknowledgment,
            } => MessageBody::ClarifyingQuestion {
                text,
                acknowledgment,
            },
            StoredMessage::UserResponse { text } => MessageBody::UserResponse { text },
            StoredMessage::VoicesIntro { text } => MessageBody::VoicesIntro { text },
            StoredMessage::VoiceCards { voices } => MessageBody::VoiceCards { voices },
            StoredMessage::SelectedVoice { voice } => MessageBody::SelectedVoice {
                voice,
                expanded: true,
            },
            StoredMessage::ReflectionAcknowledgment { text } => {
                MessageBody::ReflectionAcknowledgment { text }
            }
        }
    }
}

/// Snapshot `state` as of now
pub fn snapshot(state: &ConversationState) -> ConversationSnapshot {
    snapshot_at(state, Utc::now())
}

/// Snapshot `state`, stamping every retained message with `captured_at`
pub fn snapshot_at(state: &ConversationState, captured_at: DateTime<Utc>) -> ConversationSnapshot {
    let messages = state
        .messages
        .iter()
        .filter_map(|m| StoredMessage::from_body(&m.body))
        .map(|body| SnapshotMessage {
            body,
            timestamp: captured_at,
        })
        .collect();

    ConversationSnapshot {
        messages,
        stage: state.stage,
        user_input: state.user_input.clone(),
        clarification: state.clarification.clone(),
        selected_voice: state.selected_voice.clone(),
        shown_thinkers: state.shown_thinkers.clone(),
        offered_voices: state.offered_voices.clone(),
        saved_at: captured_at,
        is_complete: state.selected_voice.is_some(),
    }
}

impl ConversationSnapshot {
    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }
}
