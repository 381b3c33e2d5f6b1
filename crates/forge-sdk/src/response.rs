//! Caller-facing result shapes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forge_chain::Visibility;
use forge_generate::{GenerationFailure, GenerationOutcome};
use forge_types::VersionId;

use crate::error::SdkError;

/// A committed generation as a caller sees it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationResponse {
    pub version_id: VersionId,
    pub uuid: Uuid,
    pub version_number: u32,
    pub content: String,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub remaining_balance: i64,
    pub generator: String,
    pub community_enhanced: bool,
    pub word_count: usize,
}

impl From<GenerationOutcome> for GenerationResponse {
    fn from(outcome: GenerationOutcome) -> Self {
        Self {
            version_id: outcome.version.id,
            uuid: outcome.version.uuid,
            version_number: outcome.version.version_number,
            content: outcome.version.content,
            tags: outcome.tags,
            visibility: outcome.version.visibility,
            remaining_balance: outcome.remaining_balance,
            generator: outcome.generator,
            community_enhanced: outcome.community_enhanced,
            word_count: outcome.word_count,
        }
    }
}

/// Why a request failed, with the balance it left behind.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureResponse {
    pub error_kind: String,
    pub message: String,
    pub remaining_balance: Option<i64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasons: Vec<String>,
}

impl FailureResponse {
    pub fn from_error(error: &SdkError, remaining_balance: Option<i64>) -> Self {
        Self {
            error_kind: error.kind().to_string(),
            message: error.to_string(),
            remaining_balance,
            reasons: Vec::new(),
        }
    }
}

impl From<GenerationFailure> for FailureResponse {
    fn from(failure: GenerationFailure) -> Self {
        Self {
            error_kind: failure.kind().to_string(),
            message: failure.error.to_string(),
            remaining_balance: failure.remaining_balance,
            reasons: failure.reasons,
        }
    }
}

#[cfg(test)]
mod tests {
    use forge_generate::{GenerationError, GenerationStage};

    use super::*;

    #[test]
    fn failure_carries_kind_and_balance() {
        let failure = GenerationFailure {
            error: GenerationError::InsufficientCredits { balance: 0, required: 1 },
            stage: GenerationStage::BalanceChecked,
            reasons: vec![],
            remaining_balance: Some(0),
            stages: vec![],
        };
        let response = FailureResponse::from(failure);
        assert_eq!(response.error_kind, "insufficient_credits");
        assert_eq!(response.message, "insufficient credits: balance 0, required 1");
        assert_eq!(response.remaining_balance, Some(0));

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("reasons").is_none());
    }
}
