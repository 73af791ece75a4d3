//! Rebuilding a live session from a journal entry

use crate::journal::JournalEntry;
use crate::snapshot::{ConversationSnapshot, StoredMessage};
use crate::state_machine::{ConversationState, SessionContext, Stage};
use crate::wisdom::{Passage, WisdomRequest};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RestoreError {
    #[error("Journal entry {0} has no conversation to resume")]
    NoConversationData(String),
    #[error("Stored conversation is malformed: {0}")]
    Malformed(String),
}

/// Resume the conversation stored in `entry`.
///
/// Later saves from the resumed session update `entry` instead of creating a
/// new record.
pub fn restore_session(
    entry: &JournalEntry,
    ctx: &SessionContext,
) -> Result<ConversationState, RestoreError> {
    let data = entry
        .conversation_data
        .clone()
        .ok_or_else(|| RestoreError::NoConversationData(entry.id.clone()))?;
    let snapshot =
        ConversationSnapshot::from_value(data).map_err(|e| RestoreError::Malformed(e.to_string()))?;

    let mut state = restore_snapshot(&snapshot, ctx)?;
    state.journal_entry_id = Some(entry.id.clone());
    Ok(state)
}

/// Rebuild live state from a decoded snapshot, with fresh message ids for `ctx`.
///
/// The flow fields come back verbatim; `is_saved` and `error` start cleared.
pub fn restore_snapshot(
    snapshot: &ConversationSnapshot,
    ctx: &SessionContext,
) -> Result<ConversationState, RestoreError> {
    if snapshot.selected_voice.is_some() != snapshot.stage.has_selection() {
        return Err(RestoreError::Malformed(format!(
            "stage {} does not match the stored selection",
            snapshot.stage
        )));
    }

    let mut state = ConversationState {
        stage: snapshot.stage,
        user_input: snapshot.user_input.clone(),
        clarification: snapshot.clarification.clone(),
        selected_voice: snapshot.selected_voice.clone(),
        offered_voices: offered_voices(snapshot),
        ..ConversationState::default()
    };
    state.record_thinkers(snapshot.shown_thinkers.iter().map(String::as_str));

    for message in &snapshot.messages {
        state.push_message(ctx, message.body.clone().into_body());
    }

    // A retrieval that was in flight at save time is re-issued on resume
    if state.stage == Stage::LoadingVoices {
        state.voice_request = Some(WisdomRequest {
            user_input: state.user_input.clone(),
            clarification: state.clarification.clone(),
            conversation_context: None,
            exclude_thinkers: state.shown_thinkers.clone(),
        });
    }

    Ok(state)
}

/// Passages from the last retrieval; payloads without `offeredVoices` fall back
/// to the most recent voice cards in the transcript
fn offered_voices(snapshot: &ConversationSnapshot) -> Vec<Passage> {
    if !snapshot.offered_voices.is_empty() {
        return snapshot.offered_voices.clone();
    }
    snapshot
        .messages
        .iter()
        .rev()
        .find_map(|message| match &message.body {
            StoredMessage::VoiceCards { voices } => Some(voices.clone()),
            _ => None,
        })
        .unwrap_or_default()
}
