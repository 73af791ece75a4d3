//! Terminal front end
//!
//! A line-oriented REPL over one session at a time. Plain text goes to
//! whatever the current stage expects; slash commands cover the buttons.

use crate::companion::{ClaudeCompanion, CompanionError};
use crate::config::{Config, ConfigError};
use crate::journal::{
    most_engaged_tradition, total_voices, traditions_per_day, Journal, JournalEntry, JournalError,
};
use crate::llm::{AnthropicService, LlmError, LlmService, LoggingService};
use crate::restore::restore_session;
use crate::runtime::{
    pending_call, spawn_session, DatabaseJournal, IdentityProvider, JournalStore, RuntimeError,
    SessionEvent, SessionHandle, StaticIdentity,
};
use crate::state_machine::{
    route_text, ChatMessage, ConversationState, Event, MessageBody, SessionContext,
};
use crate::wisdom::Passage;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Journal(#[from] JournalError),
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Companion(#[from] CompanionError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("Failed to read input: {0}")]
    Io(#[from] std::io::Error),
}

const HELP: &str = "\
Type to talk. Commands:
  /pick N      choose voice N from the cards
  /none        none of these speak to me
  /same        see the other voices from the last set
  /more        find more voices
  /retry       retry a failed search
  /expand      show the selected passage in full
  /collapse    show it as one line
  /save        save to your journal
  /journal     list saved reflections
  /resume ID   continue a saved reflection
  /delete ID   remove a saved reflection
  /new         start over
  /quit        leave";

/// One line of user input, parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Text(String),
    Pick(usize),
    NoneSelected,
    Same,
    More,
    Retry,
    Expand(bool),
    Save,
    Journal,
    Resume(String),
    Delete(String),
    New,
    Help,
    Quit,
    Unknown(String),
}

pub fn parse_command(line: &str) -> Command {
    let line = line.trim();
    let Some(rest) = line.strip_prefix('/') else {
        return Command::Text(line.to_string());
    };

    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    match (name, arg) {
        ("pick", Some(n)) => n
            .parse()
            .ok()
            .filter(|n| *n > 0)
            .map_or_else(|| Command::Unknown(line.to_string()), Command::Pick),
        ("none", None) => Command::NoneSelected,
        ("same", None) => Command::Same,
        ("more", None) => Command::More,
        ("retry", None) => Command::Retry,
        ("expand", None) => Command::Expand(true),
        ("collapse", None) => Command::Expand(false),
        ("save", None) => Command::Save,
        ("journal", None) => Command::Journal,
        ("resume", Some(id)) => Command::Resume(id.to_string()),
        ("delete", Some(id)) => Command::Delete(id.to_string()),
        ("new", None) => Command::New,
        ("help", None) => Command::Help,
        ("quit" | "exit", None) => Command::Quit,
        _ => Command::Unknown(line.to_string()),
    }
}

/// The session event a command stands for, given what is on screen
pub fn command_event(command: &Command, state: &ConversationState) -> Result<Event, String> {
    match command {
        Command::Text(text) if text.is_empty() => Err("Nothing to send.".into()),
        Command::Text(text) => route_text(state.stage, text.clone())
            .ok_or_else(|| "Not expecting text right now.".into()),
        Command::Pick(n) => n
            .checked_sub(1)
            .and_then(|i| state.offered_voices.get(i))
            .cloned()
            .map(|passage| Event::SelectVoice { passage })
            .ok_or_else(|| format!("There is no voice {n}.")),
        Command::NoneSelected => Ok(Event::NoneSelected),
        Command::Same => Ok(Event::SeeAnotherFromSameSet),
        Command::More => Ok(Event::WantsMoreVoices),
        Command::Retry => Ok(Event::RetryVoices),
        Command::Expand(expanded) => Ok(Event::ExpandVoice {
            expanded: *expanded,
        }),
        Command::Save => Ok(Event::SaveRequested),
        Command::New => Ok(Event::StartOver { user_name: None }),
        Command::Journal
        | Command::Resume(_)
        | Command::Delete(_)
        | Command::Help
        | Command::Quit
        | Command::Unknown(_) => Err("Not a session action.".into()),
    }
}

fn render_passage(out: &mut String, passage: &Passage, full: bool) {
    let _ = write!(
        out,
        "{} ({}): \"{}\"",
        passage.thinker,
        passage.tradition.display_name(),
        passage.text
    );
    if !full {
        return;
    }
    let _ = write!(out, "\n    {}", passage.role);
    if let Some(dates) = &passage.thinker_dates {
        let _ = write!(out, ", {dates}");
    }
    if let Some(source) = &passage.source {
        let _ = write!(out, "\n    Source: {source}");
    }
    let _ = write!(
        out,
        "\n    {}\n    Reflect: {}",
        passage.context, passage.reflection_question
    );
}

/// Terminal text for a transcript message
pub fn render_message(message: &ChatMessage) -> String {
    let mut out = String::new();
    match &message.body {
        MessageBody::Greeting { text }
        | MessageBody::VoicesIntro { text }
        | MessageBody::ReflectionAcknowledgment { text } => out.push_str(text),
        MessageBody::UserInput { text } | MessageBody::UserResponse { text } => {
            let _ = write!(out, "> {text}");
        }
        MessageBody::ClarifyingQuestion {
            text,
            acknowledgment,
        } => {
            if let Some(ack) = acknowledgment {
                let _ = write!(out, "{ack} ");
            }
            out.push_str(text);
        }
        MessageBody::VoiceCards { voices } => {
            for (i, voice) in voices.iter().enumerate() {
                if i > 0 {
                    out.push('\n');
                }
                let _ = write!(out, "  [{}] ", i + 1);
                render_passage(&mut out, voice, false);
            }
        }
        MessageBody::SelectedVoice { voice, expanded } => {
            out.push_str("  * ");
            render_passage(&mut out, voice, *expanded);
        }
        MessageBody::Loading { text } => {
            let _ = write!(out, "  ... {}", text.as_deref().unwrap_or(""));
        }
    }
    out
}

fn render_entry(entry: &JournalEntry) -> String {
    let voice = match (&entry.thinker, entry.tradition()) {
        (Some(thinker), Some(tradition)) => format!("{thinker} ({})", tradition.display_name()),
        (Some(thinker), None) => thinker.clone(),
        _ => "no voice chosen".to_string(),
    };
    format!(
        "{}  {}  {}  \"{}\"",
        entry.id,
        entry.created_at.format("%Y-%m-%d"),
        voice,
        entry.user_input
    )
}

/// The session currently on screen
struct ActiveSession {
    handle: SessionHandle,
    events: broadcast::Receiver<SessionEvent>,
    state: ConversationState,
    printed: HashSet<String>,
}

impl ActiveSession {
    fn print_new_messages(&mut self) {
        for message in &self.state.messages {
            if message.is_loading() {
                continue;
            }
            if self.printed.insert(message.id.clone()) {
                println!("{}\n", render_message(message));
            }
        }
        if let Some(text) = self.state.loading_text() {
            println!("  ... {text}");
        }
        if let Some(error) = &self.state.error {
            println!("! {error}\n");
        }
        if !self.state.is_busy() && self.state.accepts_text() {
            println!("({})", self.state.stage.placeholder());
        }
    }

    /// Show broadcasts until the session has nothing in flight
    async fn wait_idle(&mut self) -> Result<(), CliError> {
        loop {
            match self.events.recv().await {
                Ok(SessionEvent::StateChanged { state }) => {
                    self.state = *state;
                    self.print_new_messages();
                    if !self.state.is_busy() {
                        return Ok(());
                    }
                }
                Ok(SessionEvent::Error { message }) => {
                    println!("! {message}\n");
                    if !self.state.is_busy() {
                        return Ok(());
                    }
                }
                Ok(SessionEvent::SignupRequired) => {
                    println!("Sign in to save reflections (set PANIA_USER_ID).\n");
                }
                Ok(SessionEvent::Saved { entry_id }) => {
                    println!("Saved to your journal ({entry_id}).\n");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Terminal fell behind session events");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(RuntimeError::SessionClosed(self.handle.session_id().to_string()).into());
                }
            }
        }
    }
}

struct Repl {
    config: Config,
    companion: Arc<ClaudeCompanion>,
    store: DatabaseJournal,
    identity: StaticIdentity,
}

impl Repl {
    fn context(&self) -> SessionContext {
        SessionContext::generate().with_user_name(self.config.user_name.clone())
    }

    async fn open(
        &self,
        context: SessionContext,
        state: ConversationState,
    ) -> Result<ActiveSession, CliError> {
        let fresh = state.messages.is_empty();
        let resuming_call = pending_call(&state).call.is_some();
        let (handle, events) = spawn_session(
            context,
            state.clone(),
            self.companion.clone(),
            self.store.clone(),
            self.identity.clone(),
            self.config.call_timeout,
        );
        let mut session = ActiveSession {
            handle,
            events,
            state,
            printed: HashSet::new(),
        };

        if fresh {
            session.handle.send(Event::Start { user_name: None }).await?;
            session.wait_idle().await?;
        } else {
            session.print_new_messages();
            if resuming_call {
                session.wait_idle().await?;
            }
        }
        Ok(session)
    }

    async fn list_journal(&self) {
        let Some(user_id) = self.identity_user() else {
            println!("Sign in to keep a journal (set PANIA_USER_ID).\n");
            return;
        };
        match self.store.list_entries(&user_id).await {
            Ok(entries) if entries.is_empty() => println!("Your journal is empty.\n"),
            Ok(entries) => {
                for entry in &entries {
                    println!("{}", render_entry(entry));
                }
                println!("\nRecent days:");
                for (day, traditions) in traditions_per_day(&entries).iter().rev().take(7) {
                    let names: Vec<&str> = traditions.iter().map(|t| t.display_name()).collect();
                    println!("  {day}  {}", names.join(", "));
                }
                if let Some(tradition) = most_engaged_tradition(&entries) {
                    println!(
                        "\n{} voices saved; you return most to {}.",
                        total_voices(&entries),
                        tradition.display_name()
                    );
                }
                println!();
            }
            Err(e) => println!("! Could not read your journal: {e}\n"),
        }
    }

    async fn resume(&self, id: &str) -> Option<(SessionContext, ConversationState)> {
        let Some(user_id) = self.identity_user() else {
            println!("Sign in to resume reflections (set PANIA_USER_ID).\n");
            return None;
        };
        let entry = match self.store.get_entry(&user_id, id).await {
            Ok(entry) => entry,
            Err(e) => {
                println!("! {e}\n");
                return None;
            }
        };
        let context = self.context();
        match restore_session(&entry, &context) {
            Ok(state) => Some((context, state)),
            Err(e) => {
                tracing::warn!(entry_id = %id, error = %e, "Could not restore journal entry");
                println!("! {e}\n");
                None
            }
        }
    }

    async fn delete(&self, id: &str) {
        let Some(user_id) = self.identity_user() else {
            println!("Sign in to manage your journal (set PANIA_USER_ID).\n");
            return;
        };
        match self.store.delete_entry(&user_id, id).await {
            Ok(()) => {
                tracing::info!(entry_id = %id, "Deleted journal entry");
                println!("Deleted {id}.\n");
            }
            Err(e) => println!("! {e}\n"),
        }
    }

    fn identity_user(&self) -> Option<String> {
        self.identity.user_id()
    }
}

/// HTTP timeout a little past the call timeout so the runtime's fires first
fn http_timeout(call_timeout: Duration) -> Duration {
    call_timeout.saturating_add(Duration::from_secs(5))
}

/// Run the REPL until `/quit` or end of input
pub async fn run(config: Config) -> Result<(), CliError> {
    tracing::info!(path = %config.db_path.display(), "Opening journal");
    let journal = Journal::open(&config.db_path)?;

    let anthropic = AnthropicService::new(
        config.llm_api_key()?,
        config.model.clone(),
        config.gateway.as_deref(),
        http_timeout(config.call_timeout),
    )?;
    let llm: Arc<dyn LlmService> = Arc::new(LoggingService::new(Arc::new(anthropic)));
    tracing::info!(model = %llm.model_id(), "LLM client initialized");

    let repl = Repl {
        companion: Arc::new(ClaudeCompanion::new(llm)?),
        store: DatabaseJournal::new(journal),
        identity: StaticIdentity::new(config.user_id.clone()),
        config,
    };

    println!("{HELP}\n");
    let mut session = repl.open(repl.context(), ConversationState::new()).await?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await? {
        let command = parse_command(&line);
        match &command {
            Command::Quit => break,
            Command::Help => println!("{HELP}\n"),
            Command::Unknown(input) => println!("Unknown command {input}. Try /help.\n"),
            Command::Journal => repl.list_journal().await,
            Command::Delete(id) => repl.delete(id).await,
            Command::Resume(id) => {
                if let Some((context, state)) = repl.resume(id).await {
                    session.handle.close().await;
                    session = repl.open(context, state).await?;
                }
            }
            _ => match command_event(&command, &session.state) {
                Ok(event) => {
                    session.handle.send(event).await?;
                    session.wait_idle().await?;
                }
                Err(message) => println!("{message}\n"),
            },
        }
    }

    session.handle.close().await;
    Ok(())
}
