//! Effects produced by state transitions

use crate::wisdom::{AcknowledgmentRequest, WisdomRequest};

/// Effects to be executed after a state transition
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Call an external collaborator; its completion comes back as an event
    Request(ExternalCall),

    /// Snapshot the conversation into the journal
    Persist { trigger: SaveTrigger },
}

/// The collaborator calls a session can have outstanding (at most one at a time)
#[derive(Debug, Clone, PartialEq)]
pub enum ExternalCall {
    Clarify { user_input: String },
    Voices(WisdomRequest),
    Acknowledge(AcknowledgmentRequest),
    ClassifyIntent { text: String },
}

impl ExternalCall {
    /// Text for the loading indicator while this call is in flight
    pub fn loading_text(&self) -> &'static str {
        match self {
            ExternalCall::Clarify { .. } => "Thinking...",
            ExternalCall::Voices(request) if request.exclude_thinkers.is_empty() => {
                "Finding wisdom..."
            }
            ExternalCall::Voices(_) => "Finding more wisdom...",
            ExternalCall::Acknowledge(_) => "Reflecting...",
            ExternalCall::ClassifyIntent { .. } => "Understanding...",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ExternalCall::Clarify { .. } => "clarify",
            ExternalCall::Voices(_) => "voices",
            ExternalCall::Acknowledge(_) => "acknowledge",
            ExternalCall::ClassifyIntent { .. } => "classify_intent",
        }
    }
}

/// Why a save was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveTrigger {
    /// Selecting a voice; silently skipped for anonymous users
    AutoSave,
    /// The user asked to save; anonymous users are prompted to sign up
    Explicit,
}

impl Effect {
    pub fn request(call: ExternalCall) -> Self {
        Effect::Request(call)
    }

    pub fn auto_save() -> Self {
        Effect::Persist {
            trigger: SaveTrigger::AutoSave,
        }
    }

    pub fn explicit_save() -> Self {
        Effect::Persist {
            trigger: SaveTrigger::Explicit,
        }
    }
}
