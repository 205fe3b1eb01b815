//! Category: a generic legal concept that segments belong to

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A legal category such as "Termination" or "Compensation".
///
/// The name is the identity key and is compared byte-for-byte: "Termination"
/// and "termination" are two different categories. Categories are never
/// renamed or deleted once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// Plain-language explanation of one category's clauses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseExplanation {
    pub meaning: String,
    #[serde(default)]
    pub counters: Vec<String>,
}

/// One entry of `process_contract` output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractExplanation {
    /// Category name
    pub clause: String,
    pub explanation: ClauseExplanation,
}
