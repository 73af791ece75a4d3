//! Runtime for executing reflection sessions
//!
//! Each session runs on its own task. Callers push [`Event`]s in through a
//! [`SessionHandle`] and watch [`SessionEvent`]s come back on a broadcast
//! channel. External calls run as background tasks and report back as
//! completion events; closing the session cancels them and drops their results.

mod executor;
mod recovery;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::SessionRuntime;
pub use recovery::{pending_call, RecoveryDecision, RecoveryReason};
pub use traits::*;

use crate::state_machine::{ConversationState, Event, SessionContext};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Default bound on a single collaborator call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(60);

/// Events sent to session observers
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Sent once per handled event, after all of its effects have run
    StateChanged { state: Box<ConversationState> },
    /// The event was rejected; the state is unchanged
    Error { message: String },
    /// An explicit save was requested with nobody signed in
    SignupRequired,
    Saved { entry_id: String },
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Session {0} is closed")]
    SessionClosed(String),
}

/// Handle to interact with a running session.
///
/// Dropping the handle stops the session the same way [`SessionHandle::close`]
/// does, without waiting for the task.
pub struct SessionHandle {
    session_id: String,
    event_tx: mpsc::Sender<Event>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SessionHandle {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Queue an event for the session
    pub async fn send(&self, event: Event) -> Result<(), RuntimeError> {
        if self.cancel.is_cancelled() {
            return Err(RuntimeError::SessionClosed(self.session_id.clone()));
        }
        self.event_tx
            .send(event)
            .await
            .map_err(|_| RuntimeError::SessionClosed(self.session_id.clone()))
    }

    /// Stop the session and wait for its task to finish.
    ///
    /// In-flight calls are cancelled; nothing they return is applied.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!(session_id = %self.session_id, error = %e, "Session task failed");
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Start a session on a new task.
///
/// Returns the handle plus a receiver subscribed before the task starts, so
/// the first broadcast (a resumed call, for example) cannot be missed.
pub fn spawn_session<C, J, I>(
    context: SessionContext,
    state: ConversationState,
    companion: C,
    journal: J,
    identity: I,
    call_timeout: Duration,
) -> (SessionHandle, broadcast::Receiver<SessionEvent>)
where
    C: CompanionService + 'static,
    J: JournalStore + 'static,
    I: IdentityProvider + 'static,
{
    let (event_tx, event_rx) = mpsc::channel(32);
    let (broadcast_tx, broadcast_rx) = broadcast::channel(128);
    let cancel = CancellationToken::new();
    let session_id = context.session_id.clone();

    let runtime = SessionRuntime::new(
        context,
        state,
        companion,
        journal,
        identity,
        call_timeout,
        event_rx,
        event_tx.clone(),
        broadcast_tx,
        cancel.clone(),
    );

    let task = tokio::spawn(async move {
        runtime.run().await;
    });

    let handle = SessionHandle {
        session_id,
        event_tx,
        cancel,
        task: Some(task),
    };
    (handle, broadcast_rx)
}
