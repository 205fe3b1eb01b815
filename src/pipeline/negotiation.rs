//! Negotiation email drafting
//!
//! Stateless: takes the user's accepted, rejected and countered clauses as
//! preformatted text and asks the model for an email body.

use super::prompts;
use crate::error::{AnalyzerError, AnalyzerResult};
use crate::graph::ContractExplanation;
use crate::llm::{CompletionRequest, LanguageModel};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the user decided for one clause.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "counter", rename_all = "snake_case")]
pub enum ClauseDecision {
    Accepted,
    Rejected,
    /// Countered with the proposed change
    Countered(String),
}

/// The three preformatted sections handed to the email prompt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NegotiationBrief {
    pub accepted: String,
    pub rejected: String,
    pub countered: String,
}

impl NegotiationBrief {
    /// Format decisions over explained clauses.
    ///
    /// Accepted and rejected entries are `"{clause}: {meaning}"` lines;
    /// countered entries add the proposal and are separated by a blank line.
    pub fn from_decisions<'a, I>(decisions: I) -> Self
    where
        I: IntoIterator<Item = (&'a ContractExplanation, &'a ClauseDecision)>,
    {
        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        let mut countered = Vec::new();

        for (clause, decision) in decisions {
            let meaning = &clause.explanation.meaning;
            match decision {
                ClauseDecision::Accepted => accepted.push(format!("{}: {}", clause.clause, meaning)),
                ClauseDecision::Rejected => rejected.push(format!("{}: {}", clause.clause, meaning)),
                ClauseDecision::Countered(counter) => countered.push(format!(
                    "{}:\nMeaning: {}\nCounter: {}",
                    clause.clause, meaning, counter
                )),
            }
        }

        Self {
            accepted: accepted.join("\n"),
            rejected: rejected.join("\n"),
            countered: countered.join("\n\n"),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.trim().is_empty()
            && self.rejected.trim().is_empty()
            && self.countered.trim().is_empty()
    }
}

/// Ask the model for a negotiation email body.
///
/// Empty sections are passed through as-is; an entirely empty brief is
/// rejected before any model call.
pub async fn draft_negotiation_email(
    llm: &dyn LanguageModel,
    accepted: &str,
    rejected: &str,
    countered: &str,
    temperature: f32,
) -> AnalyzerResult<String> {
    if accepted.trim().is_empty() && rejected.trim().is_empty() && countered.trim().is_empty() {
        return Err(AnalyzerError::InvalidInput(
            "no accepted, rejected or countered clauses".into(),
        ));
    }

    let request = CompletionRequest::new(
        prompts::negotiation_email(accepted, rejected, countered),
        prompts::EMAIL_REQUEST,
        temperature,
    );
    let email = llm.complete(&request).await?;
    debug!(chars = email.len(), "drafted negotiation email");
    Ok(email)
}
