//! Session runtime executor

use super::recovery;
use super::traits::{CompanionService, IdentityProvider, JournalStore};
use super::SessionEvent;

use crate::journal::{JournalEntryUpdate, NewJournalEntry};
use crate::snapshot::snapshot;
use crate::state_machine::{
    transition, ConversationState, Effect, Event, ExternalCall, SaveTrigger, SessionContext,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

/// Drives one session: applies events through `transition` and runs the effects
pub struct SessionRuntime<C, J, I>
where
    C: CompanionService + 'static,
    J: JournalStore,
    I: IdentityProvider,
{
    context: SessionContext,
    state: ConversationState,
    companion: Arc<C>,
    journal: J,
    identity: I,
    call_timeout: Duration,
    event_rx: mpsc::Receiver<Event>,
    event_tx: mpsc::Sender<Event>,
    broadcast_tx: broadcast::Sender<SessionEvent>,
    /// Parent of every in-flight call's token; cancelled when the session closes
    cancel: CancellationToken,
}

impl<C, J, I> SessionRuntime<C, J, I>
where
    C: CompanionService + 'static,
    J: JournalStore,
    I: IdentityProvider,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        context: SessionContext,
        state: ConversationState,
        companion: C,
        journal: J,
        identity: I,
        call_timeout: Duration,
        event_rx: mpsc::Receiver<Event>,
        event_tx: mpsc::Sender<Event>,
        broadcast_tx: broadcast::Sender<SessionEvent>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            context,
            state,
            companion: Arc::new(companion),
            journal,
            identity,
            call_timeout,
            event_rx,
            event_tx,
            broadcast_tx,
            cancel,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            session_id = %self.context.session_id,
            stage = %self.state.stage,
            "Starting session runtime"
        );

        // A resumed session may have stopped while a call was outstanding
        let decision = recovery::pending_call(&self.state);
        if let Some(call) = decision.call {
            tracing::info!(
                session_id = %self.context.session_id,
                call = call.name(),
                "Re-issuing interrupted call"
            );
            self.issue(call);
            self.broadcast_state();
        } else {
            tracing::debug!(reason = ?decision.reason, "No call to resume");
        }

        loop {
            tokio::select! {
                biased;

                () = self.cancel.cancelled() => break,

                Some(event) = self.event_rx.recv() => self.process_event(event).await,

                else => break,
            }
        }

        tracing::info!(session_id = %self.context.session_id, "Session runtime stopped");
    }

    async fn process_event(&mut self, event: Event) {
        // Saves report back through follow-up events handled in the same pass
        let mut events_to_process = VecDeque::from([event]);
        let mut changed = false;

        while let Some(current_event) = events_to_process.pop_front() {
            let name = current_event.name();
            let is_completion = current_event.is_completion();

            let result = match transition(&self.state, &self.context, current_event) {
                Ok(r) => r,
                Err(e) if is_completion => {
                    // Nothing is waiting for this result any more
                    tracing::warn!(event = name, error = %e, "Dropping stale completion");
                    continue;
                }
                Err(e) => {
                    tracing::debug!(event = name, error = %e, "Rejected event");
                    let _ = self.broadcast_tx.send(SessionEvent::Error {
                        message: e.to_string(),
                    });
                    break;
                }
            };

            tracing::debug!(
                event = name,
                from = %self.state.stage,
                to = %result.new_state.stage,
                effects = result.effects.len(),
                "Applied event"
            );
            self.state = result.new_state;
            changed = true;

            for effect in result.effects {
                if let Some(generated_event) = self.execute_effect(effect).await {
                    events_to_process.push_back(generated_event);
                }
            }
        }

        if changed {
            self.broadcast_state();
        }
    }

    /// Execute an effect and optionally return a generated event
    async fn execute_effect(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::Request(call) => {
                self.issue(call);
                None
            }
            Effect::Persist { trigger } => self.persist(trigger).await,
        }
    }

    /// Show the loading indicator, then run `call` as a background task
    fn issue(&mut self, call: ExternalCall) {
        let loading = Event::LoadingStarted {
            text: Some(call.loading_text().to_string()),
        };
        match transition(&self.state, &self.context, loading) {
            Ok(result) => self.state = result.new_state,
            Err(e) => tracing::warn!(error = %e, "Failed to show loading indicator"),
        }

        let companion = Arc::clone(&self.companion);
        let event_tx = self.event_tx.clone();
        let cancel_token = self.cancel.child_token();
        let call_timeout = self.call_timeout;
        let name = call.name();
        let on_timeout = failure_event(
            &call,
            format!("{name} timed out after {}s", call_timeout.as_secs()),
        );

        tokio::spawn(async move {
            tracing::info!(call = name, "Issuing external call (background)");

            // Race the call against session shutdown
            tokio::select! {
                biased;

                () = cancel_token.cancelled() => {
                    tracing::info!(call = name, "External call cancelled");
                }

                outcome = tokio::time::timeout(call_timeout, perform(companion.as_ref(), call)) => {
                    let event = outcome.unwrap_or_else(|_| {
                        tracing::warn!(call = name, "External call timed out");
                        on_timeout
                    });
                    // The runtime may already be gone
                    let _ = event_tx.send(event).await;
                }
            }
        });
    }

    async fn persist(&mut self, trigger: SaveTrigger) -> Option<Event> {
        let Some(user_id) = self.identity.user_id() else {
            match trigger {
                SaveTrigger::Explicit => {
                    tracing::info!("Save requested without a signed-in user");
                    let _ = self.broadcast_tx.send(SessionEvent::SignupRequired);
                }
                SaveTrigger::AutoSave => tracing::debug!("Skipping auto-save for anonymous user"),
            }
            return None;
        };

        let Some(voice_id) = self.state.selected_voice.as_ref().map(|v| v.id.clone()) else {
            tracing::warn!(?trigger, "Save effect without a selected voice");
            return None;
        };

        let snap = snapshot(&self.state);
        let entry = match NewJournalEntry::from_session(&self.state, &snap) {
            Ok(entry) => entry,
            Err(e) => {
                return Some(Event::SaveFailed {
                    error: e.to_string(),
                })
            }
        };

        let result = match &self.state.journal_entry_id {
            Some(id) => {
                self.journal
                    .update_entry(&user_id, id, &JournalEntryUpdate::from(entry))
                    .await
            }
            None => self.journal.create_entry(&user_id, &entry).await,
        };

        match result {
            Ok(record) => {
                tracing::info!(entry_id = %record.id, ?trigger, "Saved session to journal");
                let _ = self.broadcast_tx.send(SessionEvent::Saved {
                    entry_id: record.id.clone(),
                });
                Some(Event::Saved {
                    entry_id: record.id,
                    voice_id,
                })
            }
            Err(e) => {
                tracing::error!(error = %e, ?trigger, "Failed to save session");
                Some(Event::SaveFailed {
                    error: e.to_string(),
                })
            }
        }
    }

    fn broadcast_state(&self) {
        let _ = self.broadcast_tx.send(SessionEvent::StateChanged {
            state: Box::new(self.state.clone()),
        });
    }
}

/// Run one collaborator call and turn its outcome into the completion event
async fn perform<C>(companion: &C, call: ExternalCall) -> Event
where
    C: CompanionService + ?Sized,
{
    match &call {
        ExternalCall::Clarify { user_input } => match companion.clarify(user_input).await {
            Ok(response) => Event::ClarificationReady {
                acknowledgment: response.acknowledgment,
                question: response.question,
            },
            Err(e) => failure_event(&call, e.to_string()),
        },
        ExternalCall::Voices(request) => match companion.find_voices(request).await {
            Ok(response) => Event::VoicesReady {
                passages: response.passages,
            },
            Err(e) => failure_event(&call, e.to_string()),
        },
        ExternalCall::Acknowledge(request) => match companion.acknowledge(request).await {
            Ok(text) => Event::AcknowledgmentReady { text },
            Err(e) => failure_event(&call, e.to_string()),
        },
        ExternalCall::ClassifyIntent { text } => match companion.classify_intent(text).await {
            Ok(classification) => {
                tracing::debug!(
                    intent = ?classification.intent,
                    confidence = classification.confidence,
                    "Classified follow-up"
                );
                Event::IntentClassified {
                    text: text.clone(),
                    classification,
                }
            }
            Err(e) => failure_event(&call, e.to_string()),
        },
    }
}

/// The failure completion matching `call`
fn failure_event(call: &ExternalCall, error: String) -> Event {
    match call {
        ExternalCall::Clarify { .. } => Event::ClarificationFailed { error },
        ExternalCall::Voices(_) => Event::VoicesFailed { error },
        ExternalCall::Acknowledge(_) => Event::AcknowledgmentFailed { error },
        ExternalCall::ClassifyIntent { text } => Event::IntentFailed {
            text: text.clone(),
            error,
        },
    }
}
