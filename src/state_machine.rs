//! Core conversation state machine
//!
//! `transition` takes the current state and one event and returns the next
//! state plus the effects to run. It performs no I/O itself.

mod effect;
pub mod event;
pub mod message;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::{Effect, ExternalCall, SaveTrigger};
pub use event::{route_text, Event};
pub use message::{ChatMessage, MessageBody, LOADING_MESSAGE_ID};
pub use state::{ConversationState, SessionContext, Stage};
pub use transition::{transition, TransitionError, TransitionResult};
