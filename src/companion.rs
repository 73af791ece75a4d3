//! LLM-backed companion
//!
//! Implements the four collaborator calls a session makes. Transport failures
//! are returned as errors so the session can surface them; a reply that
//! arrives but cannot be understood is replaced with fixed fallback content.

mod prompts;


use crate::llm::{LlmError, LlmRequest, LlmService};
use crate::runtime::CompanionService;
use crate::wisdom::{
    self, AcknowledgmentRequest, ClarifyResponse, IntentClassification, Passage, WisdomRequest,
    WisdomResponse, FALLBACK_REFLECTION_ACKNOWLEDGMENT,
};
use async_trait::async_trait;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

const MAX_TOKENS: u32 = 1024;

#[derive(Debug, Error)]
pub enum CompanionError {
    #[error("LLM request failed: {0}")]
    Llm(#[from] LlmError),
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// Companion backed by a chat model
pub struct ClaudeCompanion {
    llm: Arc<dyn LlmService>,
    json_object: Regex,
}

impl ClaudeCompanion {
    pub fn new(llm: Arc<dyn LlmService>) -> Result<Self, CompanionError> {
        Ok(Self {
            llm,
            // Outermost braces; models wrap JSON in prose or code fences
            json_object: Regex::new(r"(?s)\{.*\}")?,
        })
    }

    async fn ask(&self, system: impl Into<String>, user: impl Into<String>) -> Result<String, CompanionError> {
        let request = LlmRequest::new(system)
            .with_user(user)
            .with_max_tokens(MAX_TOKENS);
        let response = self.llm.complete(&request).await?;
        Ok(response.text)
    }

    fn extract<T: DeserializeOwned>(&self, text: &str) -> Option<T> {
        let found = self.json_object.find(text)?;
        serde_json::from_str(found.as_str()).ok()
    }
}

#[derive(Deserialize)]
struct RawWisdom {
    passages: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct RawAcknowledgment {
    acknowledgment: String,
}

/// Keep passages that decode, have a unique id, and avoid excluded thinkers
fn usable_passages(raw: Vec<serde_json::Value>, exclude: &[String]) -> Vec<Passage> {
    let excluded: HashSet<String> = exclude.iter().map(|t| t.to_lowercase()).collect();
    let mut ids = HashSet::new();
    raw.into_iter()
        .filter_map(|value| serde_json::from_value::<Passage>(value).ok())
        .filter(|p| !excluded.contains(&p.thinker.to_lowercase()))
        .filter(|p| ids.insert(p.id.clone()))
        .collect()
}

#[async_trait]
impl CompanionService for ClaudeCompanion {
    async fn clarify(&self, user_input: &str) -> Result<ClarifyResponse, CompanionError> {
        let text = self
            .ask(prompts::CLARIFY_SYSTEM_PROMPT, prompts::clarify_user_message(user_input))
            .await?;

        match self.extract::<ClarifyResponse>(&text) {
            Some(response) if !response.question.trim().is_empty() => Ok(response),
            _ => {
                tracing::warn!(response = %text, "Unparseable clarify response, using fallback");
                Ok(wisdom::fallback_clarification())
            }
        }
    }

    async fn find_voices(&self, request: &WisdomRequest) -> Result<WisdomResponse, CompanionError> {
        let text = self
            .ask(prompts::WISDOM_SYSTEM_PROMPT, prompts::wisdom_user_message(request))
            .await?;

        let Some(raw) = self.extract::<RawWisdom>(&text) else {
            tracing::warn!(response = %text, "Unparseable wisdom response, using fallback passages");
            return Ok(WisdomResponse {
                passages: usable_fallback(&request.exclude_thinkers),
            });
        };

        let offered = raw.passages.len();
        let passages = usable_passages(raw.passages, &request.exclude_thinkers);
        if passages.len() < offered {
            tracing::debug!(offered, kept = passages.len(), "Dropped unusable passages");
        }
        if passages.is_empty() {
            tracing::warn!("No usable passages in wisdom response, using fallback passages");
            return Ok(WisdomResponse {
                passages: usable_fallback(&request.exclude_thinkers),
            });
        }
        Ok(WisdomResponse { passages })
    }

    async fn acknowledge(&self, request: &AcknowledgmentRequest) -> Result<String, CompanionError> {
        let text = self
            .ask(prompts::acknowledgment_system_prompt(request), request.reflection.clone())
            .await?;

        match self.extract::<RawAcknowledgment>(&text) {
            Some(raw) if !raw.acknowledgment.trim().is_empty() => Ok(raw.acknowledgment),
            _ => {
                tracing::warn!(response = %text, "Unparseable acknowledgment, using fallback");
                Ok(FALLBACK_REFLECTION_ACKNOWLEDGMENT.to_string())
            }
        }
    }

    async fn classify_intent(&self, text: &str) -> Result<IntentClassification, CompanionError> {
        let reply = self.ask(prompts::INTENT_SYSTEM_PROMPT, text).await?;

        Ok(self.extract::<IntentClassification>(&reply).unwrap_or_else(|| {
            tracing::warn!(response = %reply, "Unparseable intent classification, continuing reflection");
            IntentClassification::fallback()
        }))
    }
}

fn usable_fallback(exclude: &[String]) -> Vec<Passage> {
    let raw = wisdom::fallback_passages()
        .into_iter()
        .filter_map(|p| serde_json::to_value(p).ok())
        .collect();
    usable_passages(raw, exclude)
}
