//! Mock implementations for testing
//!
//! These mocks drive a real session runtime without network access.

use super::traits::{CompanionService, DatabaseJournal, JournalStore, StaticIdentity};
use super::{spawn_session, SessionEvent, SessionHandle};
use crate::companion::CompanionError;
use crate::journal::{Journal, JournalEntry, JournalEntryUpdate, JournalError, NewJournalEntry};
use crate::llm::LlmError;
use crate::state_machine::{ConversationState, Event, SessionContext};
use crate::wisdom::{
    AcknowledgmentRequest, ClarifyResponse, IntentClassification, WisdomRequest, WisdomResponse,
};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

// ============================================================================
// Mock Companion
// ============================================================================

type Queue<T> = Mutex<VecDeque<Result<T, CompanionError>>>;

/// Companion that replays queued results, optionally after a delay
#[derive(Default)]
pub struct MockCompanion {
    clarifications: Queue<ClarifyResponse>,
    voices: Queue<WisdomResponse>,
    acknowledgments: Queue<String>,
    intents: Queue<IntentClassification>,
    delay: Option<Duration>,
    /// Notified when any call starts (for test synchronization)
    pub call_started: Arc<Notify>,
    /// Names of the calls made, in order
    pub calls: Mutex<Vec<&'static str>>,
    pub voice_requests: Mutex<Vec<WisdomRequest>>,
}

fn not_queued() -> CompanionError {
    CompanionError::Llm(LlmError::network("No mock response queued"))
}

fn next<T>(queue: &Queue<T>) -> Result<T, CompanionError> {
    queue
        .lock()
        .unwrap()
        .pop_front()
        .unwrap_or_else(|| Err(not_queued()))
}

impl MockCompanion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call waits `delay` before answering
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn queue_clarification(&self, acknowledgment: &str, question: &str) {
        self.clarifications.lock().unwrap().push_back(Ok(ClarifyResponse {
            acknowledgment: acknowledgment.to_string(),
            question: question.to_string(),
        }));
    }

    pub fn queue_voices(&self, passages: Vec<crate::wisdom::Passage>) {
        self.voices
            .lock()
            .unwrap()
            .push_back(Ok(WisdomResponse { passages }));
    }

    pub fn queue_voices_error(&self, error: LlmError) {
        self.voices.lock().unwrap().push_back(Err(error.into()));
    }

    pub fn queue_acknowledgment(&self, text: &str) {
        self.acknowledgments
            .lock()
            .unwrap()
            .push_back(Ok(text.to_string()));
    }

    pub fn queue_intent(&self, classification: IntentClassification) {
        self.intents.lock().unwrap().push_back(Ok(classification));
    }

    pub fn recorded_calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn recorded_voice_requests(&self) -> Vec<WisdomRequest> {
        self.voice_requests.lock().unwrap().clone()
    }

    async fn begin(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
        self.call_started.notify_one();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CompanionService for MockCompanion {
    async fn clarify(&self, _user_input: &str) -> Result<ClarifyResponse, CompanionError> {
        self.begin("clarify").await;
        next(&self.clarifications)
    }

    async fn find_voices(&self, request: &WisdomRequest) -> Result<WisdomResponse, CompanionError> {
        self.voice_requests.lock().unwrap().push(request.clone());
        self.begin("voices").await;
        next(&self.voices)
    }

    async fn acknowledge(&self, _request: &AcknowledgmentRequest) -> Result<String, CompanionError> {
        self.begin("acknowledge").await;
        next(&self.acknowledgments)
    }

    async fn classify_intent(&self, _text: &str) -> Result<IntentClassification, CompanionError> {
        self.begin("classify_intent").await;
        next(&self.intents)
    }
}

// ============================================================================
// Failing Journal
// ============================================================================

/// Journal whose writes always fail
pub struct FailingJournal;

#[async_trait]
impl JournalStore for FailingJournal {
    async fn create_entry(
        &self,
        _user_id: &str,
        _entry: &NewJournalEntry,
    ) -> Result<JournalEntry, JournalError> {
        Err(JournalError::LockPoisoned)
    }

    async fn update_entry(
        &self,
        _user_id: &str,
        id: &str,
        _update: &JournalEntryUpdate,
    ) -> Result<JournalEntry, JournalError> {
        Err(JournalError::EntryNotFound(id.to_string()))
    }

    async fn get_entry(&self, _user_id: &str, id: &str) -> Result<JournalEntry, JournalError> {
        Err(JournalError::EntryNotFound(id.to_string()))
    }

    async fn list_entries(&self, _user_id: &str) -> Result<Vec<JournalEntry>, JournalError> {
        Ok(vec![])
    }

    async fn delete_entry(&self, _user_id: &str, id: &str) -> Result<(), JournalError> {
        Err(JournalError::EntryNotFound(id.to_string()))
    }
}

// ============================================================================
// Test Session Builder
// ============================================================================

const EVENT_WAIT: Duration = Duration::from_secs(2);

/// A running session wired to mocks
pub struct TestSession {
    pub handle: SessionHandle,
    pub events: broadcast::Receiver<SessionEvent>,
    pub companion: Arc<MockCompanion>,
    /// The journal behind the session, unless a custom store was supplied
    pub journal: Journal,
}

pub struct TestSessionBuilder {
    companion: MockCompanion,
    user_id: Option<String>,
    state: ConversationState,
    store: Option<Arc<dyn JournalStore>>,
    call_timeout: Duration,
}

impl TestSession {
    pub fn builder() -> TestSessionBuilder {
        TestSessionBuilder {
            companion: MockCompanion::new(),
            user_id: None,
            state: ConversationState::new(),
            store: None,
            call_timeout: EVENT_WAIT,
        }
    }
}

impl TestSessionBuilder {
    pub fn companion(mut self, companion: MockCompanion) -> Self {
        self.companion = companion;
        self
    }

    pub fn signed_in(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_string());
        self
    }

    pub fn state(mut self, state: ConversationState) -> Self {
        self.state = state;
        self
    }

    pub fn store(mut self, store: Arc<dyn JournalStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn build(self) -> TestSession {
        let journal = Journal::open_in_memory().unwrap();
        let store: Arc<dyn JournalStore> = match self.store {
            Some(store) => store,
            None => Arc::new(DatabaseJournal::new(journal.clone())),
        };
        let companion = Arc::new(self.companion);
        let context = SessionContext::new("test-session").with_user_name(Some("Ada".into()));

        let (handle, events) = spawn_session(
            context,
            self.state,
            companion.clone(),
            store,
            StaticIdentity::new(self.user_id),
            self.call_timeout,
        );

        TestSession {
            handle,
            events,
            companion,
            journal,
        }
    }
}

impl TestSession {
    pub async fn send(&self, event: Event) {
        self.handle.send(event).await.expect("session closed");
    }

    /// Next broadcast, failing the test if none arrives in time
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::time::timeout(EVENT_WAIT, self.events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("session event channel closed")
    }

    /// Wait for a state with nothing in flight
    pub async fn settle(&mut self) -> ConversationState {
        loop {
            match self.next_event().await {
                SessionEvent::StateChanged { state } if !state.is_busy() => return *state,
                SessionEvent::Error { message } => panic!("unexpected error: {message}"),
                _ => {}
            }
        }
    }

    /// Wait for a state with a call in flight
    pub async fn busy(&mut self) -> ConversationState {
        loop {
            if let SessionEvent::StateChanged { state } = self.next_event().await {
                if state.is_busy() {
                    return *state;
                }
            }
        }
    }

    /// Send `event` and wait for the session to go idle again
    pub async fn act(&mut self, event: Event) -> ConversationState {
        self.send(event).await;
        self.settle().await
    }

    /// Close the session and collect whatever it broadcast on the way out
    pub async fn close(self) -> Vec<SessionEvent> {
        let TestSession {
            handle, mut events, ..
        } = self;
        handle.close().await;

        let mut remaining = vec![];
        while let Ok(event) = events.recv().await {
            remaining.push(event);
        }
        remaining
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state_machine::{MessageBody, Stage};
    use crate::wisdom::{
        fallback_passages, Intent, Passage, CLARIFY_ERROR, FALLBACK_QUESTION, MORE_VOICES_INTRO,
        VOICES_ERROR,
    };

    /// A second set of passages with thinkers not in the fallback set
    fn fresh_passages() -> Vec<Passage> {
        fallback_passages()
            .into_iter()
            .enumerate()
            .map(|(i, mut p)| {
                p.id = format!("fresh-{i}");
                p.thinker = format!("Thinker {i}");
                p
            })
            .collect()
    }

    fn last_body(state: &ConversationState) -> &MessageBody {
        &state.messages.last().unwrap().body
    }

    /// Drive a new session up to the voice cards
    async fn reach_voices(session: &mut TestSession) -> ConversationState {
        session.companion.queue_clarification("I hear you.", "What's underneath?");
        session.companion.queue_voices(fallback_passages());

        session.act(Event::Start { user_name: None }).await;
        session
            .act(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        session
            .act(Event::SubmitUserResponse {
                text: "Fear of failing".into(),
            })
            .await
    }

    #[tokio::test]
    async fn test_mock_companion_replays_queue() {
        let mock = MockCompanion::new();
        mock.queue_clarification("Hi.", "Why?");

        let response = mock.clarify("x").await.unwrap();
        assert_eq!(response.question, "Why?");

        // Nothing left to replay
        assert!(mock.clarify("x").await.is_err());
        assert_eq!(mock.recorded_calls(), vec!["clarify", "clarify"]);
    }

    #[tokio::test]
    async fn test_full_reflection_flow() {
        let mut session = TestSession::builder().signed_in("user-1").build();

        let state = session.act(Event::Start { user_name: None }).await;
        assert_eq!(
            last_body(&state),
            &MessageBody::Greeting {
                text: "Hi, Ada".into()
            }
        );

        session.companion.queue_clarification("I hear you.", "What's underneath?");
        session
            .send(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        let loading = session.busy().await;
        assert_eq!(loading.stage, Stage::LoadingClarify);
        assert_eq!(loading.loading_text(), Some("Thinking..."));

        let state = session.settle().await;
        assert_eq!(state.stage, Stage::AwaitingResponse);
        assert!(matches!(
            last_body(&state),
            MessageBody::ClarifyingQuestion { text, .. } if text == "What's underneath?"
        ));

        session.companion.queue_voices(fallback_passages());
        let state = session
            .act(Event::SubmitUserResponse {
                text: "Fear of failing".into(),
            })
            .await;
        assert_eq!(state.stage, Stage::ShowingVoices);
        assert_eq!(state.offered_voices.len(), 4);

        let rumi = state.offered_voices[2].clone();
        let state = session.act(Event::SelectVoice { passage: rumi.clone() }).await;
        assert_eq!(state.stage, Stage::VoiceSelected);
        assert!(state.is_saved);
        let entry_id = state.journal_entry_id.clone().unwrap();

        let entries = session.journal.list_entries("user-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, entry_id);
        assert_eq!(entries[0].thinker.as_deref(), Some("Rumi"));
        assert_eq!(entries[0].user_input, "I feel stuck");

        session
            .companion
            .queue_acknowledgment("That takes courage.\n\nWould you like to hear more voices?");
        let state = session
            .act(Event::SubmitReflection {
                text: "Maybe I'm holding the door shut".into(),
            })
            .await;
        assert_eq!(state.stage, Stage::ReflectionAcknowledged);
        assert_eq!(state.clarification, "Maybe I'm holding the door shut");

        session.companion.queue_intent(IntentClassification {
            intent: Intent::WantsMoreVoices,
            confidence: 0.9,
        });
        session.companion.queue_voices(fresh_passages());
        let state = session
            .act(Event::SubmitFollowUp {
                text: "yes please".into(),
            })
            .await;
        assert_eq!(state.stage, Stage::ShowingVoices);
        assert_eq!(state.selected_voice, None);
        assert_eq!(state.shown_thinkers.len(), 8);
        assert!(state.messages.iter().any(
            |m| matches!(&m.body, MessageBody::VoicesIntro { text } if text == MORE_VOICES_INTRO)
        ));

        let requests = session.companion.recorded_voice_requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[0].exclude_thinkers.is_empty());
        assert_eq!(requests[1].exclude_thinkers.len(), 4);
        assert!(requests[1]
            .conversation_context
            .as_deref()
            .unwrap()
            .starts_with("User has engaged with wisdom from Rumi."));

        assert_eq!(
            session.companion.recorded_calls(),
            vec!["clarify", "voices", "acknowledge", "classify_intent", "voices"]
        );
    }

    #[tokio::test]
    async fn test_clarify_failure_uses_fallback_question() {
        let mut session = TestSession::builder().build();
        session.act(Event::Start { user_name: None }).await;

        // Nothing queued: the call fails
        let state = session
            .act(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        assert_eq!(state.stage, Stage::AwaitingResponse);
        assert_eq!(state.error.as_deref(), Some(CLARIFY_ERROR));
        assert!(matches!(
            last_body(&state),
            MessageBody::ClarifyingQuestion { text, .. } if text == FALLBACK_QUESTION
        ));
    }

    #[tokio::test]
    async fn test_voices_failure_then_retry() {
        let mut session = TestSession::builder().build();
        session.companion.queue_clarification("Ok.", "Why?");
        session.companion.queue_voices_error(LlmError::server_error("overloaded"));
        session.companion.queue_voices(fallback_passages());

        session.act(Event::Start { user_name: None }).await;
        session
            .act(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        let failed = session
            .act(Event::SubmitUserResponse {
                text: "Fear".into(),
            })
            .await;
        assert_eq!(failed.stage, Stage::LoadingVoices);
        assert!(failed.voice_retrieval_failed());
        assert_eq!(failed.error.as_deref(), Some(VOICES_ERROR));

        let state = session.act(Event::RetryVoices).await;
        assert_eq!(state.stage, Stage::ShowingVoices);
        assert_eq!(state.error, None);
        assert_eq!(session.companion.recorded_voice_requests().len(), 2);
    }

    #[tokio::test]
    async fn test_anonymous_explicit_save_requires_signup() {
        let mut session = TestSession::builder().build();
        let state = reach_voices(&mut session).await;

        // Auto-save is silently skipped
        let passage = state.offered_voices[0].clone();
        let state = session.act(Event::SelectVoice { passage }).await;
        assert!(!state.is_saved);
        assert_eq!(state.journal_entry_id, None);

        session.send(Event::SaveRequested).await;
        let mut saw_signup = false;
        loop {
            match session.next_event().await {
                SessionEvent::SignupRequired => saw_signup = true,
                SessionEvent::StateChanged { state } => {
                    assert!(!state.is_saved);
                    break;
                }
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert!(saw_signup);
    }

    #[tokio::test]
    async fn test_later_saves_update_the_same_entry() {
        let mut session = TestSession::builder().signed_in("user-1").build();
        let state = reach_voices(&mut session).await;
        let first = state.offered_voices[0].clone();
        let second = state.offered_voices[3].clone();

        let state = session.act(Event::SelectVoice { passage: first }).await;
        let entry_id = state.journal_entry_id.clone().unwrap();

        session.act(Event::SeeAnotherFromSameSet).await;
        let state = session
            .act(Event::SelectVoice {
                passage: second.clone(),
            })
            .await;
        assert_eq!(state.journal_entry_id.as_deref(), Some(entry_id.as_str()));
        assert!(state.is_saved);

        let entries = session.journal.list_entries("user-1").unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].thinker.as_deref(), Some(second.thinker.as_str()));
    }

    #[tokio::test]
    async fn test_save_failure_surfaces_error() {
        let mut session = TestSession::builder()
            .signed_in("user-1")
            .store(Arc::new(FailingJournal))
            .build();
        let state = reach_voices(&mut session).await;

        let passage = state.offered_voices[1].clone();
        let state = session.act(Event::SelectVoice { passage }).await;
        assert_eq!(state.stage, Stage::VoiceSelected);
        assert!(!state.is_saved);
        assert!(state.error.unwrap().starts_with("Failed to save:"));
    }

    #[tokio::test]
    async fn test_busy_session_rejects_new_input() {
        let companion = MockCompanion::new().with_delay(Duration::from_millis(200));
        companion.queue_clarification("Ok.", "Why?");
        let mut session = TestSession::builder().companion(companion).build();
        session.act(Event::Start { user_name: None }).await;

        session
            .send(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        session.busy().await;

        session
            .send(Event::StartOver { user_name: None })
            .await;
        match session.next_event().await {
            SessionEvent::Error { message } => assert_eq!(message, "Still working on the previous request"),
            other => panic!("expected a busy error, got {other:?}"),
        }

        let state = session.settle().await;
        assert_eq!(state.stage, Stage::AwaitingResponse);
    }

    #[tokio::test]
    async fn test_close_discards_in_flight_result() {
        let companion = MockCompanion::new().with_delay(Duration::from_millis(300));
        companion.queue_clarification("Ok.", "Why?");
        let started = companion.call_started.clone();
        let mut session = TestSession::builder().companion(companion).build();
        session.act(Event::Start { user_name: None }).await;

        session
            .send(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        session.busy().await;
        started.notified().await;

        let remaining = session.close().await;
        assert!(remaining.iter().all(|event| !matches!(
            event,
            SessionEvent::StateChanged { state } if state.stage == Stage::AwaitingResponse
        )));
    }

    #[tokio::test]
    async fn test_dropping_handle_stops_session() {
        let companion = MockCompanion::new().with_delay(Duration::from_millis(300));
        companion.queue_clarification("Ok.", "Why?");
        let mut session = TestSession::builder().companion(companion).build();
        session.act(Event::Start { user_name: None }).await;
        session
            .send(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        session.busy().await;

        let TestSession {
            handle, mut events, ..
        } = session;
        drop(handle);

        // The runtime owns the only broadcast sender, so the channel closes once it exits
        let stopped = tokio::time::timeout(EVENT_WAIT, async {
            loop {
                match events.recv().await {
                    Err(broadcast::error::RecvError::Closed) => break,
                    Ok(SessionEvent::StateChanged { state }) => {
                        assert_ne!(state.stage, Stage::AwaitingResponse);
                    }
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                }
            }
        })
        .await;
        assert!(stopped.is_ok(), "session kept running after its handle was dropped");
    }

    #[tokio::test]
    async fn test_slow_call_times_out() {
        let companion = MockCompanion::new().with_delay(Duration::from_millis(500));
        companion.queue_clarification("Ok.", "Why?");
        let mut session = TestSession::builder()
            .companion(companion)
            .call_timeout(Duration::from_millis(20))
            .build();
        session.act(Event::Start { user_name: None }).await;

        let state = session
            .act(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        assert_eq!(state.stage, Stage::AwaitingResponse);
        assert_eq!(state.error.as_deref(), Some(CLARIFY_ERROR));
    }

    #[tokio::test]
    async fn test_resumed_loading_session_reissues_call() {
        let mut request = WisdomRequest::new("I feel stuck", "Fear of failing");
        request.exclude_thinkers = vec!["Rumi".into()];
        let interrupted = ConversationState {
            stage: Stage::LoadingVoices,
            user_input: "I feel stuck".into(),
            clarification: "Fear of failing".into(),
            shown_thinkers: vec!["Rumi".into()],
            voice_request: Some(request),
            ..ConversationState::default()
        };

        let companion = MockCompanion::new();
        companion.queue_voices(fresh_passages());
        let mut session = TestSession::builder()
            .companion(companion)
            .state(interrupted)
            .build();

        let state = session.settle().await;
        assert_eq!(state.stage, Stage::ShowingVoices);
        assert!(state.messages.iter().any(
            |m| matches!(&m.body, MessageBody::VoicesIntro { text } if text == MORE_VOICES_INTRO)
        ));
        let requests = session.companion.recorded_voice_requests();
        assert_eq!(requests[0].exclude_thinkers, vec!["Rumi".to_string()]);
    }

    #[tokio::test]
    async fn test_stale_completion_is_dropped_silently() {
        let mut session = TestSession::builder().build();
        session.act(Event::Start { user_name: None }).await;

        // No voice request is outstanding
        session
            .send(Event::VoicesReady {
                passages: fallback_passages(),
            })
            .await;

        session.companion.queue_clarification("Ok.", "Why?");
        session
            .send(Event::SubmitUserInput {
                text: "I feel stuck".into(),
            })
            .await;
        match session.next_event().await {
            SessionEvent::StateChanged { state } => assert_eq!(state.stage, Stage::LoadingClarify),
            other => panic!("expected the clarify state, got {other:?}"),
        }
    }
}
