//! Journal persistence
//!
//! Stores saved reflections in SQLite. Every operation is scoped to a user:
//! a record belonging to someone else behaves exactly like a missing one.

pub mod analytics;
mod schema;

pub use analytics::{most_engaged_tradition, total_voices, tradition_counts, traditions_per_day};
pub use schema::*;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum JournalError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Journal entry not found: {0}")]
    EntryNotFound(String),
    #[error("Failed to encode conversation data: {0}")]
    Encoding(#[from] serde_json::Error),
    #[error("Journal database lock poisoned")]
    LockPoisoned,
    #[error("Failed to create database directory: {0}")]
    Io(#[from] std::io::Error),
}

pub type JournalResult<T> = Result<T, JournalError>;

const ENTRY_COLUMNS: &str = "id, user_id, user_input, clarification, tradition, thinker, passage_text,
     source, context, reflection_question, notes, conversation_data, created_at, updated_at";

/// Thread-safe journal handle
#[derive(Clone)]
pub struct Journal {
    conn: Arc<Mutex<Connection>>,
}

impl Journal {
    /// Open or create the journal at the given path, creating parent directories
    pub fn open<P: AsRef<Path>>(path: P) -> JournalResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let journal = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        journal.run_migrations()?;
        Ok(journal)
    }

    /// Open an in-memory journal
    pub fn open_in_memory() -> JournalResult<Self> {
        let conn = Connection::open_in_memory()?;
        let journal = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        journal.run_migrations()?;
        Ok(journal)
    }

    fn lock(&self) -> JournalResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| JournalError::LockPoisoned)
    }

    fn run_migrations(&self) -> JournalResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Entry Operations ====================

    /// Create a new entry for `user_id`
    pub fn create_entry(&self, user_id: &str, entry: &NewJournalEntry) -> JournalResult<JournalEntry> {
        let conn = self.lock()?;
        let id = uuid::Uuid::new_v4().to_string();
        let now = Utc::now();
        let data = entry
            .conversation_data
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            "INSERT INTO journal_entries (id, user_id, user_input, clarification, tradition, thinker,
                 passage_text, source, context, reflection_question, notes, conversation_data,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?13)",
            params![
                id,
                user_id,
                entry.user_input,
                entry.clarification,
                entry.tradition,
                entry.thinker,
                entry.passage_text,
                entry.source,
                entry.context,
                entry.reflection_question,
                entry.notes,
                data,
                format_datetime(now),
            ],
        )?;

        tracing::debug!(entry_id = %id, user_id, "Created journal entry");

        Ok(JournalEntry {
            id,
            user_id: user_id.to_string(),
            user_input: entry.user_input.clone(),
            clarification: entry.clarification.clone(),
            tradition: entry.tradition.clone(),
            thinker: entry.thinker.clone(),
            passage_text: entry.passage_text.clone(),
            source: entry.source.clone(),
            context: entry.context.clone(),
            reflection_question: entry.reflection_question.clone(),
            notes: entry.notes.clone(),
            conversation_data: entry.conversation_data.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Apply a partial update and return the stored record
    pub fn update_entry(
        &self,
        user_id: &str,
        id: &str,
        update: &JournalEntryUpdate,
    ) -> JournalResult<JournalEntry> {
        {
            let conn = self.lock()?;
            let data = update
                .conversation_data
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;

            let updated = conn.execute(
                "UPDATE journal_entries SET
                     user_input = COALESCE(?3, user_input),
                     clarification = COALESCE(?4, clarification),
                     tradition = COALESCE(?5, tradition),
                     thinker = COALESCE(?6, thinker),
                     passage_text = COALESCE(?7, passage_text),
                     source = COALESCE(?8, source),
                     context = COALESCE(?9, context),
                     reflection_question = COALESCE(?10, reflection_question),
                     notes = COALESCE(?11, notes),
                     conversation_data = COALESCE(?12, conversation_data),
                     updated_at = ?13
                 WHERE id = ?1 AND user_id = ?2",
                params![
                    id,
                    user_id,
                    update.user_input,
                    update.clarification,
                    update.tradition,
                    update.thinker,
                    update.passage_text,
                    update.source,
                    update.context,
                    update.reflection_question,
                    update.notes,
                    data,
                    format_datetime(Utc::now()),
                ],
            )?;

            if updated == 0 {
                return Err(JournalError::EntryNotFound(id.to_string()));
            }
        }

        tracing::debug!(entry_id = %id, user_id, "Updated journal entry");
        self.get_entry(user_id, id)
    }

    /// Get one of the user's entries
    pub fn get_entry(&self, user_id: &str, id: &str) -> JournalResult<JournalEntry> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries WHERE id = ?1 AND user_id = ?2"
        ))?;

        stmt.query_row(params![id, user_id], parse_entry_row)
            .optional()?
            .ok_or_else(|| JournalError::EntryNotFound(id.to_string()))
    }

    /// All of the user's entries, newest first
    pub fn list_entries(&self, user_id: &str) -> JournalResult<Vec<JournalEntry>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ENTRY_COLUMNS} FROM journal_entries
             WHERE user_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user_id], parse_entry_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(JournalError::from)
    }

    /// Delete one of the user's entries
    pub fn delete_entry(&self, user_id: &str, id: &str) -> JournalResult<()> {
        let conn = self.lock()?;
        let deleted = conn.execute(
            "DELETE FROM journal_entries WHERE id = ?1 AND user_id = ?2",
            params![id, user_id],
        )?;

        if deleted == 0 {
            return Err(JournalError::EntryNotFound(id.to_string()));
        }
        tracing::debug!(entry_id = %id, user_id, "Deleted journal entry");
        Ok(())
    }
}

/// Parse a journal row selected with `ENTRY_COLUMNS`
fn parse_entry_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<JournalEntry> {
    Ok(JournalEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_input: row.get(2)?,
        clarification: row.get(3)?,
        tradition: row.get(4)?,
        thinker: row.get(5)?,
        passage_text: row.get(6)?,
        source: row.get(7)?,
        context: row.get(8)?,
        reflection_question: row.get(9)?,
        notes: row.get(10)?,
        conversation_data: row.get::<_, Option<String>>(11)?.map(decode_conversation_data),
        created_at: parse_datetime(&row.get::<_, String>(12)?),
        updated_at: parse_datetime(&row.get::<_, String>(13)?),
    })
}

/// Stored payloads that are not JSON are kept as the raw string, so restoring
/// them reports a malformed conversation rather than a missing one
fn decode_conversation_data(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Stored conversation data is not valid JSON");
        serde_json::Value::String(raw)
    })
}

// Fixed precision keeps the text column sortable
fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
