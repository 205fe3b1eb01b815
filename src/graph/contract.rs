//! ContractId: the partition key for one contract's graph

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a contract's graph partition
///
/// Serializes as a plain string (UUID or semantic ID like "acme-employment-2024")
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

impl ContractId {
    /// Create a new random ContractId (UUID-based)
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create a ContractId from a string (semantic ID)
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the inner string value
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ContractId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ContractId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ContractId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ContractId {
    fn from(s: String) -> Self {
        Self(s)
    }
}
