//! Resuming sessions that stopped mid-call
//!
//! A snapshot taken while a call was outstanding comes back in a loading stage
//! with nothing in flight. The runtime re-issues the call on start-up.

use crate::state_machine::{ConversationState, ExternalCall, Stage};
use crate::wisdom::{AcknowledgmentRequest, WisdomRequest};

/// Result of inspecting a state for an interrupted call
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryDecision {
    pub call: Option<ExternalCall>,
    pub reason: RecoveryReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryReason {
    /// Stage owns no call
    NotLoading,
    /// A loading message is present, so the call is already running
    CallInFlight,
    /// Loading stage with nothing in flight
    Interrupted,
    /// Acknowledgment stage without a selected voice; nothing sensible to send
    MissingSelection,
}

impl RecoveryDecision {
    fn idle(reason: RecoveryReason) -> Self {
        Self { call: None, reason }
    }

    fn reissue(call: ExternalCall) -> Self {
        Self {
            call: Some(call),
            reason: RecoveryReason::Interrupted,
        }
    }
}

/// Decide which call, if any, a freshly started runtime must issue for `state`
pub fn pending_call(state: &ConversationState) -> RecoveryDecision {
    if !state.stage.is_loading() {
        return RecoveryDecision::idle(RecoveryReason::NotLoading);
    }
    if state.is_busy() {
        return RecoveryDecision::idle(RecoveryReason::CallInFlight);
    }

    match state.stage {
        Stage::LoadingClarify => RecoveryDecision::reissue(ExternalCall::Clarify {
            user_input: state.user_input.clone(),
        }),
        Stage::LoadingVoices => {
            let request = state.voice_request.clone().unwrap_or_else(|| {
                let mut request = WisdomRequest::new(&state.user_input, &state.clarification);
                request.exclude_thinkers.clone_from(&state.shown_thinkers);
                request
            });
            RecoveryDecision::reissue(ExternalCall::Voices(request))
        }
        Stage::GeneratingAcknowledgment => match &state.selected_voice {
            Some(voice) => RecoveryDecision::reissue(ExternalCall::Acknowledge(
                AcknowledgmentRequest {
                    user_input: state.user_input.clone(),
                    voice: voice.clone(),
                    reflection: state.clarification.clone(),
                },
            )),
            None => RecoveryDecision::idle(RecoveryReason::MissingSelection),
        },
        _ => RecoveryDecision::idle(RecoveryReason::NotLoading),
    }
}
