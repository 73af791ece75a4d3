//! Events that can occur in a reflection session

use super::state::Stage;
use crate::wisdom::{IntentClassification, Passage};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    // Session lifecycle
    Start {
        user_name: Option<String>,
    },
    StartOver {
        user_name: Option<String>,
    },

    // User events
    SubmitUserInput {
        text: String,
    },
    SubmitUserResponse {
        text: String,
    },
    SelectVoice {
        passage: Passage,
    },
    NoneSelected,
    SubmitReflection {
        text: String,
    },
    /// Free text after an acknowledgment; intent is classified before acting on it
    SubmitFollowUp {
        text: String,
    },
    WantsMoreVoices,
    SeeAnotherFromSameSet,
    RetryVoices,
    ExpandVoice {
        expanded: bool,
    },
    SaveRequested,
    DismissError,

    // External call completions
    ClarificationReady {
        acknowledgment: String,
        question: String,
    },
    ClarificationFailed {
        error: String,
    },
    VoicesReady {
        passages: Vec<Passage>,
    },
    VoicesFailed {
        error: String,
    },
    AcknowledgmentReady {
        text: String,
    },
    AcknowledgmentFailed {
        error: String,
    },
    IntentClassified {
        text: String,
        classification: IntentClassification,
    },
    IntentFailed {
        text: String,
        error: String,
    },

    // Persistence
    Saved {
        entry_id: String,
        voice_id: String,
    },
    SaveFailed {
        error: String,
    },

    /// Applied by the runtime right before it issues an external call
    LoadingStarted {
        text: Option<String>,
    },
}

impl Event {
    /// User events that are rejected while an external call is outstanding.
    ///
    /// Expanding a card, saving and dismissing an error never start a
    /// collaborator call, so they stay available while busy.
    pub fn requires_idle(&self) -> bool {
        matches!(
            self,
            Event::Start { .. }
                | Event::StartOver { .. }
                | Event::SubmitUserInput { .. }
                | Event::SubmitUserResponse { .. }
                | Event::SelectVoice { .. }
                | Event::NoneSelected
                | Event::SubmitReflection { .. }
                | Event::SubmitFollowUp { .. }
                | Event::WantsMoreVoices
                | Event::SeeAnotherFromSameSet
                | Event::RetryVoices
        )
    }

    /// Short name for logs
    pub fn name(&self) -> &'static str {
        match self {
            Event::Start { .. } => "start",
            Event::StartOver { .. } => "start_over",
            Event::SubmitUserInput { .. } => "submit_user_input",
            Event::SubmitUserResponse { .. } => "submit_user_response",
            Event::SelectVoice { .. } => "select_voice",
            Event::NoneSelected => "none_selected",
            Event::SubmitReflection { .. } => "submit_reflection",
            Event::SubmitFollowUp { .. } => "submit_follow_up",
            Event::WantsMoreVoices => "wants_more_voices",
            Event::SeeAnotherFromSameSet => "see_another_from_same_set",
            Event::RetryVoices => "retry_voices",
            Event::ExpandVoice { .. } => "expand_voice",
            Event::SaveRequested => "save_requested",
            Event::DismissError => "dismiss_error",
            Event::ClarificationReady { .. } => "clarification_ready",
            Event::ClarificationFailed { .. } => "clarification_failed",
            Event::VoicesReady { .. } => "voices_ready",
            Event::VoicesFailed { .. } => "voices_failed",
            Event::AcknowledgmentReady { .. } => "acknowledgment_ready",
            Event::AcknowledgmentFailed { .. } => "acknowledgment_failed",
            Event::IntentClassified { .. } => "intent_classified",
            Event::IntentFailed { .. } => "intent_failed",
            Event::Saved { .. } => "saved",
            Event::SaveFailed { .. } => "save_failed",
            Event::LoadingStarted { .. } => "loading_started",
        }
    }

    /// Completions reported by a collaborator
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            Event::ClarificationReady { .. }
                | Event::ClarificationFailed { .. }
                | Event::VoicesReady { .. }
                | Event::VoicesFailed { .. }
                | Event::AcknowledgmentReady { .. }
                | Event::AcknowledgmentFailed { .. }
                | Event::IntentClassified { .. }
                | Event::IntentFailed { .. }
        )
    }
}

/// Map free text typed into the input box to the event the current stage expects.
///
/// Returns `None` where the stage does not accept text.
pub fn route_text(stage: Stage, text: impl Into<String>) -> Option<Event> {
    let text = text.into();
    match stage {
        Stage::AwaitingInput => Some(Event::SubmitUserInput { text }),
        // Extra text while cards are showing, or after a failed retrieval, refines the request
        Stage::AwaitingResponse | Stage::ShowingVoices | Stage::LoadingVoices => {
            Some(Event::SubmitUserResponse { text })
        }
        Stage::VoiceSelected => Some(Event::SubmitReflection { text }),
        Stage::ReflectionAcknowledged => Some(Event::SubmitFollowUp { text }),
        Stage::Initial | Stage::LoadingClarify | Stage::GeneratingAcknowledgment => None,
    }
}
