//! Wisdom passages and the shapes exchanged with the external AI collaborators
//!
//! Everything here is plain data. The collaborators themselves live behind
//! `runtime::CompanionService`; the fixed fallback content used when they
//! misbehave lives at the bottom of this file.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Passage
// ============================================================================

/// Spiritual or philosophical tradition a passage comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tradition {
    Stoicism,
    Christianity,
    Buddhism,
    Sufism,
    Taoism,
    Judaism,
}

impl Tradition {
    pub const ALL: [Tradition; 6] = [
        Tradition::Stoicism,
        Tradition::Christianity,
        Tradition::Buddhism,
        Tradition::Sufism,
        Tradition::Taoism,
        Tradition::Judaism,
    ];

    /// Stable lowercase name, also used as the denormalized journal column value
    pub fn as_str(self) -> &'static str {
        match self {
            Tradition::Stoicism => "stoicism",
            Tradition::Christianity => "christianity",
            Tradition::Buddhism => "buddhism",
            Tradition::Sufism => "sufism",
            Tradition::Taoism => "taoism",
            Tradition::Judaism => "judaism",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Tradition::Stoicism => "Stoicism",
            Tradition::Christianity => "Christianity",
            Tradition::Buddhism => "Buddhism",
            Tradition::Sufism => "Sufism",
            Tradition::Taoism => "Taoism",
            Tradition::Judaism => "Judaism",
        }
    }
}

impl fmt::Display for Tradition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tradition: {0}")]
pub struct UnknownTradition(pub String);

impl FromStr for Tradition {
    type Err = UnknownTradition;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tradition::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownTradition(s.to_string()))
    }
}

/// One retrieved piece of wisdom. Immutable once produced by the retrieval collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Passage {
    pub id: String,
    pub tradition: Tradition,
    pub thinker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinker_dates: Option<String>,
    pub role: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub context: String,
    pub reflection_question: String,
}

// ============================================================================
// Collaborator I/O
// ============================================================================

/// Output of the clarification collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClarifyResponse {
    pub acknowledgment: String,
    pub question: String,
}

/// Input to the wisdom retrieval collaborator
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WisdomRequest {
    pub user_input: String,
    pub clarification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_context: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude_thinkers: Vec<String>,
}

impl WisdomRequest {
    pub fn new(user_input: impl Into<String>, clarification: impl Into<String>) -> Self {
        Self {
            user_input: user_input.into(),
            clarification: clarification.into(),
            conversation_context: None,
            exclude_thinkers: Vec::new(),
        }
    }
}

/// Output of the wisdom retrieval collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WisdomResponse {
    pub passages: Vec<Passage>,
}

/// Input to the acknowledgment collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcknowledgmentRequest {
    pub user_input: String,
    pub voice: Passage,
    pub reflection: String,
}

/// What the user wants after a reflection has been acknowledged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    WantsMoreVoices,
    ContinueReflecting,
}

/// Output of the intent classification collaborator.
///
/// Only `intent` drives behaviour; `confidence` is carried for logging.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub confidence: f64,
}

impl IntentClassification {
    /// The non-destructive default used whenever classification fails
    pub fn fallback() -> Self {
        Self {
            intent: Intent::ContinueReflecting,
            confidence: 0.5,
        }
    }
}

// ============================================================================
// Canned text and fallbacks
// ============================================================================

pub const GREETING: &str = "Hi";

pub const FALLBACK_ACKNOWLEDGMENT: &str = "That sounds meaningful.";
pub const FALLBACK_QUESTION: &str =
    "What feeling comes up most strongly when you think about this?";

pub const NONE_SELECTED_ACKNOWLEDGMENT: &str = "I understand.";
pub const NONE_SELECTED_QUESTION: &str =
    "What kind of wisdom are you looking for? Perhaps a different perspective or tradition?";

pub const VOICES_INTRO: &str = "Here are some voices that might speak to your situation:";
pub const MORE_VOICES_INTRO: &str = "Here are a few more voices to sit with:";

pub const FALLBACK_REFLECTION_ACKNOWLEDGMENT: &str =
    "Thank you for sharing that reflection.\n\nWould you like to hear more voices on this?";

pub const CLARIFY_ERROR: &str = "Failed to get response. Please try again.";
pub const VOICES_ERROR: &str = "Failed to find wisdom. Please try again.";
pub const MORE_VOICES_ERROR: &str = "Failed to find more wisdom. Please try again.";
pub const ACKNOWLEDGMENT_ERROR: &str = "Failed to reflect on that. Please try again.";

pub fn greeting_for(user_name: Option<&str>) -> String {
    match user_name.map(str::trim).filter(|n| !n.is_empty()) {
        Some(name) => format!("{GREETING}, {name}"),
        None => GREETING.to_string(),
    }
}

pub fn fallback_clarification() -> ClarifyResponse {
    ClarifyResponse {
        acknowledgment: FALLBACK_ACKNOWLEDGMENT.to_string(),
        question: FALLBACK_QUESTION.to_string(),
    }
}

/// Passages used when the retrieval collaborator returns something unusable.
/// Covers stoicism, christianity, sufism and buddhism.
pub fn fallback_passages() -> Vec<Passage> {
    vec![
        Passage {
            id: "ma-med-12-4".to_string(),
            tradition: Tradition::Stoicism,
            thinker: "Marcus Aurelius".to_string(),
            thinker_dates: Some("121-180 AD".to_string()),
            role: "Stoic philosopher".to_string(),
            text: "\"It never ceases to amaze me: we all love ourselves more than other people, but care more about their opinion than our own.\"".to_string(),
            source: Some("Meditations".to_string()),
            context: "Written during his reign as Roman Emperor, while facing war and plague.".to_string(),
            reflection_question: "Whose opinion are you valuing more than your own right now?".to_string(),
        },
        Passage {
            id: "gal-1-10".to_string(),
            tradition: Tradition::Christianity,
            thinker: "Paul the Apostle".to_string(),
            thinker_dates: None,
            role: "Christian scripture".to_string(),
            text: "\"Am I now trying to win the approval of human beings, or of God?\"".to_string(),
            source: Some("Galatians 1:10".to_string()),
            context: "Paul wrote this letter defending his message against those who questioned his authority.".to_string(),
            reflection_question: "Whose approval are you seeking right now?".to_string(),
        },
        Passage {
            id: "rumi-prison".to_string(),
            tradition: Tradition::Sufism,
            thinker: "Rumi".to_string(),
            thinker_dates: Some("1207-1273".to_string()),
            role: "Sufi poet".to_string(),
            text: "\"Why do you stay in prison when the door is so wide open?\"".to_string(),
            source: None,
            context: "Rumi was a 13th-century Persian poet whose work explores themes of divine love and freedom.".to_string(),
            reflection_question: "What door might be open for you that you haven't walked through?".to_string(),
        },
        Passage {
            id: "tnh-letting-go".to_string(),
            tradition: Tradition::Buddhism,
            thinker: "Thich Nhat Hanh".to_string(),
            thinker_dates: Some("1926-2022".to_string()),
            role: "Buddhist teacher".to_string(),
            text: "\"Letting go gives us freedom, and freedom is the only condition for happiness.\"".to_string(),
            source: None,
            context: "Thich Nhat Hanh was a Vietnamese Buddhist monk who taught mindfulness for over 60 years.".to_string(),
            reflection_question: "What would you need to let go of to feel more free right now?".to_string(),
        },
    ]
}
