//! Request and response bodies for the HTTP API.

use serde::{Deserialize, Serialize};

use crate::ratelimit::GenerationDecision;

/// Body for check and acquire calls.
#[derive(Debug, Clone, Deserialize)]
pub struct GenerationRequest {
    /// Client IP as seen by the product backend
    pub ip: String,
    /// The generation has already been paid for
    #[serde(default)]
    pub paid: bool,
}

/// Body for record calls.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordRequest {
    pub ip: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DurationRequest {
    pub dialogue: String,
}

/// Wire form of a [`GenerationDecision`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionResponse {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_wait_minutes: Option<u64>,
}

impl From<GenerationDecision> for DecisionResponse {
    fn from(decision: GenerationDecision) -> Self {
        Self {
            allowed: decision.is_allowed(),
            remaining_wait_minutes: decision.remaining_wait_minutes(),
        }
    }
}
