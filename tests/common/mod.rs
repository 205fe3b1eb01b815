//! Shared helpers for the pipeline integration tests
//!
//! `ScriptedModel` plays the language model: extraction calls pop a queue
//! of canned JSON replies, explanation and email calls get fixed replies,
//! and answers echo the context they were given so grounding is visible.
//! `KeywordEmbedder` maps text onto counts of a few legal keywords.

#![allow(dead_code)]

use async_trait::async_trait;
use clausegraph::pipeline::prompts;
use clausegraph::{CompletionRequest, Embedder, EmbeddingError, LanguageModel, LlmError};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Keywords that span the embedding space, one dimension each.
pub const KEYWORDS: &[&str] = &[
    "salary",
    "vacation",
    "terminat",
    "notice",
    "law",
    "confidential",
];

/// Deterministic embedder: keyword counts plus a small constant so that no
/// text embeds to the zero vector.
pub struct KeywordEmbedder;

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let lower = text.to_lowercase();
        Ok(KEYWORDS
            .iter()
            .map(|k| lower.matches(k).count() as f32)
            .chain(std::iter::once(0.01))
            .collect())
    }
}

/// Which pipeline stage a request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Extraction,
    Explanation,
    Answer,
    Email,
}

pub fn classify(request: &CompletionRequest) -> CallKind {
    if request.user == prompts::EXPLANATION_REQUEST {
        CallKind::Explanation
    } else if request.user == prompts::EMAIL_REQUEST {
        CallKind::Email
    } else if request.json_output {
        CallKind::Extraction
    } else {
        CallKind::Answer
    }
}

#[derive(Default)]
pub struct ScriptedModel {
    extractions: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the reply for the next extraction call.
    pub fn extraction(self, json: impl Into<String>) -> Self {
        self.extractions.lock().unwrap().push_back(json.into());
        self
    }

    pub fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, kind: CallKind) -> Vec<CompletionRequest> {
        self.requests()
            .into_iter()
            .filter(|r| classify(r) == kind)
            .collect()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        match classify(request) {
            CallKind::Extraction => self
                .extractions
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| LlmError::Api("no scripted extraction left".into())),
            CallKind::Explanation => Ok(
                r#"{"meaning": "Plain-language summary.", "counters": ["Ask for more", "Ask for less"]}"#
                    .to_string(),
            ),
            CallKind::Email => Ok("Dear [Recipient],\n\nThank you.".to_string()),
            CallKind::Answer => Ok(format!("ANSWER FROM: {}", request.system)),
        }
    }
}

/// A one-pair extraction reply.
pub fn pair(category: &str, text: &str) -> String {
    serde_json::json!([{ "entity_name": category, "relevant_text": text }]).to_string()
}
