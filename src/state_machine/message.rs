//! Transcript message model
//!
//! A message is an id plus a closed set of payload variants. Every consumer
//! (rendering, snapshotting, restoring) matches on [`MessageBody`] exhaustively.

use crate::wisdom::Passage;
use serde::{Deserialize, Serialize};

/// Fixed id shared by every loading indicator, so at most one can exist.
pub const LOADING_MESSAGE_ID: &str = "loading";

/// One turn in the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    #[serde(flatten)]
    pub body: MessageBody,
}

/// Payload of a transcript message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageBody {
    Greeting {
        text: String,
    },
    /// The user's opening statement
    UserInput {
        text: String,
    },
    ClarifyingQuestion {
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        acknowledgment: Option<String>,
    },
    /// Any later free text: clarification answers, refinements, reflections
    UserResponse {
        text: String,
    },
    VoicesIntro {
        text: String,
    },
    VoiceCards {
        voices: Vec<Passage>,
    },
    /// `expanded` is presentation only and the one field that may change in place
    SelectedVoice {
        voice: Passage,
        expanded: bool,
    },
    /// Transient; never persisted
    Loading {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    ReflectionAcknowledgment {
        text: String,
    },
}

impl MessageBody {
    pub fn kind(&self) -> &'static str {
        match self {
            MessageBody::Greeting { .. } => "greeting",
            MessageBody::UserInput { .. } => "user_input",
            MessageBody::ClarifyingQuestion { .. } => "clarifying_question",
            MessageBody::UserResponse { .. } => "user_response",
            MessageBody::VoicesIntro { .. } => "voices_intro",
            MessageBody::VoiceCards { .. } => "voice_cards",
            MessageBody::SelectedVoice { .. } => "selected_voice",
            MessageBody::Loading { .. } => "loading",
            MessageBody::ReflectionAcknowledgment { .. } => "reflection_acknowledgment",
        }
    }

    /// Free text the user typed, if this is a user-authored turn
    pub fn user_text(&self) -> Option<&str> {
        match self {
            MessageBody::UserInput { text } | MessageBody::UserResponse { text } => Some(text),
            _ => None,
        }
    }
}

impl ChatMessage {
    pub fn new(id: impl Into<String>, body: MessageBody) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }

    pub fn loading(text: Option<String>) -> Self {
        Self::new(LOADING_MESSAGE_ID, MessageBody::Loading { text })
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.body, MessageBody::Loading { .. })
    }

    pub fn is_selected_voice(&self) -> bool {
        matches!(self.body, MessageBody::SelectedVoice { .. })
    }

    pub fn is_voice_cards(&self) -> bool {
        matches!(self.body, MessageBody::VoiceCards { .. })
    }
}
