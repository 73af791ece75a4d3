//! Trait abstractions for runtime I/O
//!
//! These traits let the executor run against mock collaborators in tests.

use crate::companion::CompanionError;
use crate::journal::{Journal, JournalEntry, JournalEntryUpdate, JournalError, NewJournalEntry};
use crate::wisdom::{
    AcknowledgmentRequest, ClarifyResponse, IntentClassification, WisdomRequest, WisdomResponse,
};
use async_trait::async_trait;
use std::sync::Arc;

/// The collaborators a session calls while it is loading
#[async_trait]
pub trait CompanionService: Send + Sync {
    /// Acknowledge the opening statement and ask one clarifying question
    async fn clarify(&self, user_input: &str) -> Result<ClarifyResponse, CompanionError>;

    /// Surface passages for the user's situation
    async fn find_voices(&self, request: &WisdomRequest) -> Result<WisdomResponse, CompanionError>;

    /// Respond to a reflection on the selected passage
    async fn acknowledge(&self, request: &AcknowledgmentRequest) -> Result<String, CompanionError>;

    /// Decide whether follow-up text asks for more voices
    async fn classify_intent(&self, text: &str) -> Result<IntentClassification, CompanionError>;
}

/// Storage for saved reflections
#[async_trait]
pub trait JournalStore: Send + Sync {
    async fn create_entry(
        &self,
        user_id: &str,
        entry: &NewJournalEntry,
    ) -> Result<JournalEntry, JournalError>;

    async fn update_entry(
        &self,
        user_id: &str,
        id: &str,
        update: &JournalEntryUpdate,
    ) -> Result<JournalEntry, JournalError>;

    async fn get_entry(&self, user_id: &str, id: &str) -> Result<JournalEntry, JournalError>;

    /// Newest first
    async fn list_entries(&self, user_id: &str) -> Result<Vec<JournalEntry>, JournalError>;

    async fn delete_entry(&self, user_id: &str, id: &str) -> Result<(), JournalError>;
}

/// Who is signed in, if anyone
pub trait IdentityProvider: Send + Sync {
    fn user_id(&self) -> Option<String>;
}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: CompanionService + ?Sized> CompanionService for Arc<T> {
    async fn clarify(&self, user_input: &str) -> Result<ClarifyResponse, CompanionError> {
        (**self).clarify(user_input).await
    }

    async fn find_voices(&self, request: &WisdomRequest) -> Result<WisdomResponse, CompanionError> {
        (**self).find_voices(request).await
    }

    async fn acknowledge(&self, request: &AcknowledgmentRequest) -> Result<String, CompanionError> {
        (**self).acknowledge(request).await
    }

    async fn classify_intent(&self, text: &str) -> Result<IntentClassification, CompanionError> {
        (**self).classify_intent(text).await
    }
}

#[async_trait]
impl<T: JournalStore + ?Sized> JournalStore for Arc<T> {
    async fn create_entry(
        &self,
        user_id: &str,
        entry: &NewJournalEntry,
    ) -> Result<JournalEntry, JournalError> {
        (**self).create_entry(user_id, entry).await
    }

    async fn update_entry(
        &self,
        user_id: &str,
        id: &str,
        update: &JournalEntryUpdate,
    ) -> Result<JournalEntry, JournalError> {
        (**self).update_entry(user_id, id, update).await
    }

    async fn get_entry(&self, user_id: &str, id: &str) -> Result<JournalEntry, JournalError> {
        (**self).get_entry(user_id, id).await
    }

    async fn list_entries(&self, user_id: &str) -> Result<Vec<JournalEntry>, JournalError> {
        (**self).list_entries(user_id).await
    }

    async fn delete_entry(&self, user_id: &str, id: &str) -> Result<(), JournalError> {
        (**self).delete_entry(user_id, id).await
    }
}

impl<T: IdentityProvider + ?Sized> IdentityProvider for Arc<T> {
    fn user_id(&self) -> Option<String> {
        (**self).user_id()
    }
}

// ============================================================================
// Production Adapters
// ============================================================================

/// Adapter to use the SQLite journal as a `JournalStore`
#[derive(Clone)]
pub struct DatabaseJournal {
    journal: Journal,
}

impl DatabaseJournal {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

#[async_trait]
impl JournalStore for DatabaseJournal {
    async fn create_entry(
        &self,
        user_id: &str,
        entry: &NewJournalEntry,
    ) -> Result<JournalEntry, JournalError> {
        self.journal.create_entry(user_id, entry)
    }

    async fn update_entry(
        &self,
        user_id: &str,
        id: &str,
        update: &JournalEntryUpdate,
    ) -> Result<JournalEntry, JournalError> {
        self.journal.update_entry(user_id, id, update)
    }

    async fn get_entry(&self, user_id: &str, id: &str) -> Result<JournalEntry, JournalError> {
        self.journal.get_entry(user_id, id)
    }

    async fn list_entries(&self, user_id: &str) -> Result<Vec<JournalEntry>, JournalError> {
        self.journal.list_entries(user_id)
    }

    async fn delete_entry(&self, user_id: &str, id: &str) -> Result<(), JournalError> {
        self.journal.delete_entry(user_id, id)
    }
}

/// Identity fixed at startup; `None` means browsing anonymously
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    user_id: Option<String>,
}

impl StaticIdentity {
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id: user_id.filter(|id| !id.trim().is_empty()),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl IdentityProvider for StaticIdentity {
    fn user_id(&self) -> Option<String> {
        self.user_id.clone()
    }
}
