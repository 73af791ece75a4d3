//! Pure state transition function
//!
//! Given the same state, context and event this always produces the same
//! result. Invalid (stage, event) pairs are rejected and leave the caller's
//! state untouched; nothing here performs I/O.

use super::effect::ExternalCall;
use super::message::{ChatMessage, MessageBody};
use super::{ConversationState, Effect, Event, SessionContext, Stage};
use crate::wisdom::{
    self, AcknowledgmentRequest, Intent, Passage, WisdomRequest, ACKNOWLEDGMENT_ERROR,
    CLARIFY_ERROR, FALLBACK_REFLECTION_ACKNOWLEDGMENT, MORE_VOICES_ERROR, MORE_VOICES_INTRO,
    NONE_SELECTED_ACKNOWLEDGMENT, NONE_SELECTED_QUESTION, VOICES_ERROR, VOICES_INTRO,
};
use thiserror::Error;

/// How many recent user turns feed the context for a "more voices" request
const CONTEXT_TURNS: usize = 3;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: ConversationState,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: ConversationState) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    #[must_use]
    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransitionError {
    #[error("Still working on the previous request")]
    Busy,
    #[error("Nothing to submit")]
    EmptyInput,
    #[error("Voice {0} is not among the offered voices")]
    UnknownVoice(String),
    #[error("No voices to show again")]
    NothingToReshow,
    #[error("No voice is selected")]
    NoSelection,
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
}

/// Pure transition function
#[allow(clippy::too_many_lines)]
pub fn transition(
    state: &ConversationState,
    ctx: &SessionContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    if event.requires_idle() && state.is_busy() {
        return Err(TransitionError::Busy);
    }

    let mut next = state.clone();
    next.error = None;

    match (state.stage, event) {
        // ============================================================
        // Session lifecycle
        // ============================================================
        (Stage::Initial, Event::Start { user_name }) => {
            let name = user_name.or_else(|| ctx.user_name.clone());
            next.push_message(
                ctx,
                MessageBody::Greeting {
                    text: wisdom::greeting_for(name.as_deref()),
                },
            );
            next.stage = Stage::AwaitingInput;
            Ok(TransitionResult::new(next))
        }

        (_, Event::StartOver { user_name }) => {
            // Keep the id sequence so ids stay unique for the whole session
            let mut fresh = ConversationState {
                next_seq: state.next_seq,
                ..ConversationState::default()
            };
            let name = user_name.or_else(|| ctx.user_name.clone());
            fresh.push_message(
                ctx,
                MessageBody::Greeting {
                    text: wisdom::greeting_for(name.as_deref()),
                },
            );
            fresh.stage = Stage::AwaitingInput;
            Ok(TransitionResult::new(fresh))
        }

        // ============================================================
        // Opening statement and clarification
        // ============================================================
        (Stage::AwaitingInput, Event::SubmitUserInput { text }) => {
            let text = non_empty(&text)?;
            next.push_message(ctx, MessageBody::UserInput { text: text.clone() });
            next.user_input.clone_from(&text);
            next.stage = Stage::LoadingClarify;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::request(ExternalCall::Clarify { user_input: text })))
        }

        (
            Stage::LoadingClarify,
            Event::ClarificationReady {
                acknowledgment,
                question,
            },
        ) => {
            next.remove_loading();
            if question.trim().is_empty() {
                let fallback = wisdom::fallback_clarification();
                push_question(&mut next, ctx, fallback.acknowledgment, fallback.question);
            } else {
                push_question(&mut next, ctx, acknowledgment, question);
            }
            next.stage = Stage::AwaitingResponse;
            Ok(TransitionResult::new(next))
        }

        (Stage::LoadingClarify, Event::ClarificationFailed { .. }) => {
            next.remove_loading();
            let fallback = wisdom::fallback_clarification();
            push_question(&mut next, ctx, fallback.acknowledgment, fallback.question);
            next.error = Some(CLARIFY_ERROR.to_string());
            next.stage = Stage::AwaitingResponse;
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Voice retrieval
        // ============================================================

        // Answering the question, refining while cards show, or re-asking after a failure.
        // The new text replaces the previous clarification rather than extending it.
        (
            Stage::AwaitingResponse | Stage::ShowingVoices | Stage::LoadingVoices,
            Event::SubmitUserResponse { text },
        ) => {
            let text = non_empty(&text)?;
            next.push_message(ctx, MessageBody::UserResponse { text: text.clone() });
            next.clarification.clone_from(&text);
            let request = WisdomRequest::new(next.user_input.clone(), text);
            Ok(begin_voice_request(next, request))
        }

        (Stage::LoadingVoices, Event::RetryVoices) => {
            let request = state.voice_request.clone().unwrap_or_else(|| {
                WisdomRequest::new(state.user_input.clone(), state.clarification.clone())
            });
            Ok(begin_voice_request(next, request))
        }

        (Stage::LoadingVoices, Event::VoicesReady { passages }) if !passages.is_empty() => {
            next.remove_loading();
            let intro = if state.shown_thinkers.is_empty() {
                VOICES_INTRO
            } else {
                MORE_VOICES_INTRO
            };
            next.push_message(
                ctx,
                MessageBody::VoicesIntro {
                    text: intro.to_string(),
                },
            );
            next.push_message(
                ctx,
                MessageBody::VoiceCards {
                    voices: passages.clone(),
                },
            );
            next.record_thinkers(passages.iter().map(|p| p.thinker.as_str()));
            next.offered_voices = passages;
            next.stage = Stage::ShowingVoices;
            Ok(TransitionResult::new(next))
        }

        // An empty batch is as useless as a failed call
        (Stage::LoadingVoices, Event::VoicesReady { .. } | Event::VoicesFailed { .. }) => {
            next.remove_loading();
            let is_more = state
                .voice_request
                .as_ref()
                .is_some_and(|r| !r.exclude_thinkers.is_empty());
            let message = if is_more { MORE_VOICES_ERROR } else { VOICES_ERROR };
            next.error = Some(message.to_string());
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Choosing a voice
        // ============================================================
        (Stage::ShowingVoices, Event::SelectVoice { passage }) => {
            let voice = state
                .offered_voices
                .iter()
                .find(|p| p.id == passage.id)
                .cloned()
                .ok_or(TransitionError::UnknownVoice(passage.id))?;

            if let Some(idx) = state.last_index_of(ChatMessage::is_voice_cards) {
                next.messages.remove(idx);
            }
            next.push_message(
                ctx,
                MessageBody::SelectedVoice {
                    voice: voice.clone(),
                    expanded: true,
                },
            );
            next.selected_voice = Some(voice);
            next.is_saved = false;
            next.stage = Stage::VoiceSelected;
            Ok(TransitionResult::new(next).with_effect(Effect::auto_save()))
        }

        (Stage::ShowingVoices, Event::NoneSelected) => {
            push_question(
                &mut next,
                ctx,
                NONE_SELECTED_ACKNOWLEDGMENT.to_string(),
                NONE_SELECTED_QUESTION.to_string(),
            );
            next.stage = Stage::AwaitingResponse;
            Ok(TransitionResult::new(next))
        }

        // Cards are already on screen
        (Stage::ShowingVoices, Event::SeeAnotherFromSameSet) | (_, Event::DismissError) => {
            Ok(TransitionResult::new(next))
        }

        (_, Event::SeeAnotherFromSameSet) => {
            if state.offered_voices.is_empty() {
                return Err(TransitionError::NothingToReshow);
            }
            if state.selected_voice.is_some() {
                if let Some(idx) = state.last_index_of(ChatMessage::is_selected_voice) {
                    next.messages.remove(idx);
                }
            }
            next.selected_voice = None;
            next.is_saved = false;
            next.push_message(
                ctx,
                MessageBody::VoiceCards {
                    voices: state.offered_voices.clone(),
                },
            );
            next.stage = Stage::ShowingVoices;
            Ok(TransitionResult::new(next))
        }

        (_, Event::ExpandVoice { expanded }) => {
            let idx = state
                .last_index_of(ChatMessage::is_selected_voice)
                .ok_or(TransitionError::NoSelection)?;
            if let MessageBody::SelectedVoice { expanded: current, .. } =
                &mut next.messages[idx].body
            {
                *current = expanded;
            }
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Reflection cycle
        // ============================================================
        (
            Stage::VoiceSelected | Stage::ReflectionAcknowledged,
            Event::SubmitReflection { text },
        ) => begin_reflection(next, ctx, &text),

        (Stage::GeneratingAcknowledgment, Event::AcknowledgmentReady { text }) => {
            next.remove_loading();
            let text = if text.trim().is_empty() {
                FALLBACK_REFLECTION_ACKNOWLEDGMENT.to_string()
            } else {
                text
            };
            next.push_message(ctx, MessageBody::ReflectionAcknowledgment { text });
            next.stage = Stage::ReflectionAcknowledged;
            Ok(TransitionResult::new(next))
        }

        (Stage::GeneratingAcknowledgment, Event::AcknowledgmentFailed { .. }) => {
            next.remove_loading();
            next.push_message(
                ctx,
                MessageBody::ReflectionAcknowledgment {
                    text: FALLBACK_REFLECTION_ACKNOWLEDGMENT.to_string(),
                },
            );
            next.error = Some(ACKNOWLEDGMENT_ERROR.to_string());
            next.stage = Stage::ReflectionAcknowledged;
            Ok(TransitionResult::new(next))
        }

        (Stage::ReflectionAcknowledged, Event::SubmitFollowUp { text }) => {
            let text = non_empty(&text)?;
            Ok(TransitionResult::new(next)
                .with_effect(Effect::request(ExternalCall::ClassifyIntent { text })))
        }

        // Always act on the top label; confidence is informational only
        (
            Stage::ReflectionAcknowledged,
            Event::IntentClassified {
                text,
                classification,
            },
        ) => {
            next.remove_loading();
            match classification.intent {
                Intent::WantsMoreVoices => Ok(begin_more_voices(next)),
                Intent::ContinueReflecting => begin_reflection(next, ctx, &text),
            }
        }

        (Stage::ReflectionAcknowledged, Event::IntentFailed { text, .. }) => {
            next.remove_loading();
            begin_reflection(next, ctx, &text)
        }

        (Stage::ReflectionAcknowledged, Event::WantsMoreVoices) => Ok(begin_more_voices(next)),

        // ============================================================
        // Saving
        // ============================================================
        (_, Event::SaveRequested) => {
            if state.selected_voice.is_none() {
                return Err(TransitionError::NoSelection);
            }
            if state.is_saved {
                return Ok(TransitionResult::new(next));
            }
            Ok(TransitionResult::new(next).with_effect(Effect::explicit_save()))
        }

        (_, Event::Saved { entry_id, voice_id }) => {
            next.journal_entry_id = Some(entry_id);
            // The user may have moved on to another voice while the save was running
            next.is_saved = state
                .selected_voice
                .as_ref()
                .is_some_and(|v| v.id == voice_id);
            Ok(TransitionResult::new(next))
        }

        (_, Event::SaveFailed { error }) => {
            next.error = Some(format!("Failed to save: {error}"));
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Bookkeeping
        // ============================================================
        (_, Event::LoadingStarted { text }) => {
            next.remove_loading();
            next.messages.push(ChatMessage::loading(text));
            Ok(TransitionResult::new(next))
        }

        // ============================================================
        // Invalid Transitions
        // ============================================================
        (stage, event) => Err(TransitionError::InvalidTransition(format!(
            "No transition from {stage} with event {event:?}"
        ))),
    }
}

// Helper functions

fn non_empty(text: &str) -> Result<String, TransitionError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        Err(TransitionError::EmptyInput)
    } else {
        Ok(trimmed.to_string())
    }
}

fn push_question(
    next: &mut ConversationState,
    ctx: &SessionContext,
    acknowledgment: String,
    question: String,
) {
    let acknowledgment = Some(acknowledgment).filter(|a| !a.trim().is_empty());
    next.push_message(
        ctx,
        MessageBody::ClarifyingQuestion {
            text: question,
            acknowledgment,
        },
    );
}

fn begin_voice_request(mut next: ConversationState, request: WisdomRequest) -> TransitionResult {
    next.voice_request = Some(request.clone());
    next.stage = Stage::LoadingVoices;
    TransitionResult::new(next).with_effect(Effect::request(ExternalCall::Voices(request)))
}

fn begin_reflection(
    mut next: ConversationState,
    ctx: &SessionContext,
    text: &str,
) -> Result<TransitionResult, TransitionError> {
    let text = non_empty(text)?;
    let voice: Passage = next
        .selected_voice
        .clone()
        .ok_or(TransitionError::NoSelection)?;

    next.push_message(ctx, MessageBody::UserResponse { text: text.clone() });
    next.clarification.clone_from(&text);
    next.stage = Stage::GeneratingAcknowledgment;

    let request = AcknowledgmentRequest {
        user_input: next.user_input.clone(),
        voice,
        reflection: text,
    };
    Ok(TransitionResult::new(next).with_effect(Effect::request(ExternalCall::Acknowledge(request))))
}

/// Collapse the current voice, keep it in the transcript, and fetch voices
/// from thinkers not shown yet.
fn begin_more_voices(mut next: ConversationState) -> TransitionResult {
    let context = conversation_context(&next);

    if let Some(idx) = next.last_index_of(ChatMessage::is_selected_voice) {
        if let MessageBody::SelectedVoice { expanded, .. } = &mut next.messages[idx].body {
            *expanded = false;
        }
    }
    next.selected_voice = None;

    let request = WisdomRequest {
        user_input: next.user_input.clone(),
        clarification: next.clarification.clone(),
        conversation_context: Some(context),
        exclude_thinkers: next.shown_thinkers.clone(),
    };
    begin_voice_request(next, request)
}

fn conversation_context(state: &ConversationState) -> String {
    let recent = state.recent_user_texts(CONTEXT_TURNS).join(" | ");
    match &state.selected_voice {
        Some(voice) => format!(
            "User has engaged with wisdom from {}. Their reflections: {recent}",
            voice.thinker
        ),
        None => recent,
    }
}
