//! Pania - a guided reflection companion
//!
//! A user shares what is on their mind, answers one clarifying question, and
//! is offered short passages from several wisdom traditions. They pick one,
//! reflect on it, and can save the whole conversation to a journal and pick
//! it up again later.
//!
//! The conversation itself is a pure state machine ([`state_machine`]). The
//! [`runtime`] drives it on a tokio task and performs its effects against the
//! LLM-backed [`companion`] and the SQLite [`journal`].

pub mod cli;
pub mod companion;
pub mod config;
pub mod journal;
pub mod llm;
pub mod restore;
pub mod runtime;
pub mod snapshot;
pub mod state_machine;
pub mod wisdom;
