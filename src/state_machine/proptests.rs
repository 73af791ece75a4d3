//! Property-based tests for the state machine
//!
//! Random action sequences are resolved against the current state (so that
//! "select voice 2" picks from whatever is on offer) and fed through
//! `transition`. The invariants below must hold after every accepted event.

use super::*;
use crate::restore::restore_snapshot;
use crate::snapshot::{snapshot_at, ConversationSnapshot};
use crate::wisdom::{Intent, IntentClassification, Passage, Tradition};
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::HashSet;

// ============================================================================
// Test Helpers
// ============================================================================

const THINKERS: [&str; 8] = [
    "Seneca",
    "Epictetus",
    "Rumi",
    "Hafiz",
    "Laozi",
    "Zhuangzi",
    "Hillel",
    "Julian of Norwich",
];

fn test_context() -> SessionContext {
    SessionContext::new("prop")
}

/// Abstract user or collaborator action, resolved against the state at hand
#[derive(Debug, Clone)]
enum Action {
    Start,
    StartOver,
    Text(String),
    Select(usize),
    NoneSelected,
    SeeAnother,
    WantsMore,
    Retry,
    Expand(bool),
    Save,
    Dismiss,
    ClarifyOk,
    ClarifyFail,
    VoicesOk(Vec<Passage>),
    VoicesFail,
    AckOk(String),
    AckFail,
    Classified(Intent, f64),
    ClassifyFail,
    Saved,
    SaveFailed,
    Loading,
}

fn to_event(action: Action, state: &ConversationState) -> Option<Event> {
    let event = match action {
        Action::Start => Event::Start { user_name: None },
        Action::StartOver => Event::StartOver { user_name: None },
        Action::Text(text) => return route_text(state.stage, text),
        Action::Select(i) => {
            if state.offered_voices.is_empty() {
                return None;
            }
            let passage = state.offered_voices[i % state.offered_voices.len()].clone();
            Event::SelectVoice { passage }
        }
        Action::NoneSelected => Event::NoneSelected,
        Action::SeeAnother => Event::SeeAnotherFromSameSet,
        Action::WantsMore => Event::WantsMoreVoices,
        Action::Retry => Event::RetryVoices,
        Action::Expand(expanded) => Event::ExpandVoice { expanded },
        Action::Save => Event::SaveRequested,
        Action::Dismiss => Event::DismissError,
        Action::ClarifyOk => Event::ClarificationReady {
            acknowledgment: "I hear you.".into(),
            question: "What matters most here?".into(),
        },
        Action::ClarifyFail => Event::ClarificationFailed {
            error: "timeout".into(),
        },
        Action::VoicesOk(passages) => Event::VoicesReady { passages },
        Action::VoicesFail => Event::VoicesFailed {
            error: "unavailable".into(),
        },
        Action::AckOk(text) => Event::AcknowledgmentReady { text },
        Action::AckFail => Event::AcknowledgmentFailed {
            error: "timeout".into(),
        },
        Action::Classified(intent, confidence) => Event::IntentClassified {
            text: "and then?".into(),
            classification: IntentClassification { intent, confidence },
        },
        Action::ClassifyFail => Event::IntentFailed {
            text: "and then?".into(),
            error: "timeout".into(),
        },
        Action::Saved => Event::Saved {
            entry_id: "entry".into(),
            voice_id: state
                .selected_voice
                .as_ref()
                .map(|v| v.id.clone())
                .unwrap_or_default(),
        },
        Action::SaveFailed => Event::SaveFailed {
            error: "disk full".into(),
        },
        Action::Loading => Event::LoadingStarted {
            text: Some("Working...".into()),
        },
    };
    Some(event)
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_tradition() -> impl Strategy<Value = Tradition> {
    proptest::sample::select(Tradition::ALL.to_vec())
}

fn arb_passage() -> impl Strategy<Value = Passage> {
    (0..THINKERS.len(), arb_tradition(), 0u32..1000).prop_map(|(t, tradition, n)| Passage {
        id: format!("p-{t}-{n}"),
        tradition,
        thinker: THINKERS[t].to_string(),
        thinker_dates: None,
        role: "Teacher".to_string(),
        text: format!("Passage {n}"),
        source: None,
        context: "Context".to_string(),
        reflection_question: "What now?".to_string(),
    })
}

fn arb_intent() -> impl Strategy<Value = Intent> {
    prop_oneof![Just(Intent::WantsMoreVoices), Just(Intent::ContinueReflecting)]
}

fn arb_action() -> impl Strategy<Value = Action> {
    prop_oneof![
        1 => Just(Action::Start),
        1 => Just(Action::StartOver),
        4 => "[a-z ]{0,12}".prop_map(Action::Text),
        3 => (0usize..8).prop_map(Action::Select),
        1 => Just(Action::NoneSelected),
        1 => Just(Action::SeeAnother),
        1 => Just(Action::WantsMore),
        1 => Just(Action::Retry),
        1 => any::<bool>().prop_map(Action::Expand),
        1 => Just(Action::Save),
        1 => Just(Action::Dismiss),
        2 => Just(Action::ClarifyOk),
        1 => Just(Action::ClarifyFail),
        3 => proptest::collection::vec(arb_passage(), 0..5).prop_map(Action::VoicesOk),
        1 => Just(Action::VoicesFail),
        2 => "[a-z ]{0,12}".prop_map(Action::AckOk),
        1 => Just(Action::AckFail),
        2 => (arb_intent(), 0.0f64..1.0).prop_map(|(i, c)| Action::Classified(i, c)),
        1 => Just(Action::ClassifyFail),
        1 => Just(Action::Saved),
        1 => Just(Action::SaveFailed),
        2 => Just(Action::Loading),
    ]
}

fn arb_actions() -> impl Strategy<Value = Vec<Action>> {
    proptest::collection::vec(arb_action(), 0..40)
}

/// Run `actions` from a started session, calling `check` on every accepted transition
fn drive(
    actions: Vec<Action>,
    mut check: impl FnMut(&ConversationState, &Event, &TransitionResult) -> Result<(), TestCaseError>,
) -> Result<ConversationState, TestCaseError> {
    let ctx = test_context();
    let mut state = transition(&ConversationState::new(), &ctx, Event::Start { user_name: None })
        .map_err(|e| TestCaseError::fail(e.to_string()))?
        .new_state;

    for action in actions {
        let Some(event) = to_event(action, &state) else {
            continue;
        };
        if let Ok(result) = transition(&state, &ctx, event.clone()) {
            check(&state, &event, &result)?;
            state = result.new_state;
        }
    }
    Ok(state)
}

fn has_unique_ids(state: &ConversationState) -> bool {
    let mut seen = HashSet::new();
    state.messages.iter().all(|m| seen.insert(m.id.as_str()))
}

/// Message bodies with presentation-only state normalized away
fn normalized_bodies(state: &ConversationState) -> Vec<MessageBody> {
    state
        .persistent_messages()
        .map(|m| match &m.body {
            MessageBody::SelectedVoice { voice, .. } => MessageBody::SelectedVoice {
                voice: voice.clone(),
                expanded: true,
            },
            other => other.clone(),
        })
        .collect()
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // selected_voice is set exactly in the selection stages
    #[test]
    fn prop_selection_matches_stage(actions in arb_actions()) {
        drive(actions, |_, event, result| {
            prop_assert!(
                result.new_state.selection_invariant_holds(),
                "after {:?}: stage {} selection {:?}",
                event,
                result.new_state.stage,
                result.new_state.selected_voice.as_ref().map(|v| &v.id)
            );
            Ok(())
        })?;
    }

    #[test]
    fn prop_at_most_one_loading_message(actions in arb_actions()) {
        drive(actions, |_, _, result| {
            let loading = result.new_state.messages.iter().filter(|m| m.is_loading()).count();
            prop_assert!(loading <= 1, "found {} loading messages", loading);
            Ok(())
        })?;
    }

    // shown_thinkers only grows (until a start over) and never repeats a name
    #[test]
    fn prop_shown_thinkers_grow_without_duplicates(actions in arb_actions()) {
        drive(actions, |before, event, result| {
            let after = &result.new_state.shown_thinkers;
            let unique: HashSet<_> = after.iter().collect();
            prop_assert_eq!(unique.len(), after.len());
            if !matches!(event, Event::StartOver { .. }) {
                prop_assert!(after.starts_with(&before.shown_thinkers));
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_message_ids_unique(actions in arb_actions()) {
        drive(actions, |_, _, result| {
            prop_assert!(has_unique_ids(&result.new_state));
            Ok(())
        })?;
    }

    // Only voice cards, a selected voice, or the loading indicator ever leave the transcript
    #[test]
    fn prop_only_transient_messages_removed(actions in arb_actions()) {
        drive(actions, |before, event, result| {
            if matches!(event, Event::StartOver { .. }) {
                return Ok(());
            }
            let remaining: HashSet<_> =
                result.new_state.messages.iter().map(|m| m.id.as_str()).collect();
            for gone in before.messages.iter().filter(|m| !remaining.contains(m.id.as_str())) {
                prop_assert!(
                    gone.is_loading() || gone.is_voice_cards() || gone.is_selected_voice(),
                    "{} message removed by {:?}",
                    gone.body.kind(),
                    event
                );
            }
            Ok(())
        })?;
    }

    #[test]
    fn prop_busy_rejects_calls(actions in arb_actions(), text in "[a-z]{1,10}") {
        let state = drive(actions, |_, _, _| Ok(()))?;
        let ctx = test_context();
        let busy = transition(&state, &ctx, Event::LoadingStarted { text: None })
            .map_err(|e| TestCaseError::fail(e.to_string()))?
            .new_state;

        let attempts = [
            Event::SubmitUserInput { text: text.clone() },
            Event::SubmitUserResponse { text: text.clone() },
            Event::SubmitReflection { text },
            Event::WantsMoreVoices,
            Event::SeeAnotherFromSameSet,
            Event::RetryVoices,
        ];
        for event in attempts {
            prop_assert_eq!(transition(&busy, &ctx, event).err(), Some(TransitionError::Busy));
        }
    }

    #[test]
    fn prop_snapshot_restore_round_trip(actions in arb_actions()) {
        let state = drive(actions, |_, _, _| Ok(()))?;
        let saved_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();

        let json = snapshot_at(&state, saved_at)
            .to_value()
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let decoded = ConversationSnapshot::from_value(json)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        let restored = restore_snapshot(&decoded, &SessionContext::new("resumed"))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        prop_assert_eq!(normalized_bodies(&restored), normalized_bodies(&state));
        prop_assert_eq!(restored.stage, state.stage);
        prop_assert_eq!(&restored.user_input, &state.user_input);
        prop_assert_eq!(&restored.clarification, &state.clarification);
        prop_assert_eq!(&restored.selected_voice, &state.selected_voice);
        prop_assert_eq!(&restored.shown_thinkers, &state.shown_thinkers);
        prop_assert_eq!(&restored.offered_voices, &state.offered_voices);
        prop_assert!(!restored.is_saved);
        prop_assert!(restored.error.is_none());
        prop_assert!(!restored.is_busy());
        prop_assert!(has_unique_ids(&restored));
    }
}
