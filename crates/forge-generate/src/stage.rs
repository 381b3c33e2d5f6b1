use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Where a generation request is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationStage {
    Requested,
    BalanceChecked,
    ContextGathered,
    Generated,
    Committed,
    Failed,
}

impl GenerationStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Requested => "requested",
            Self::BalanceChecked => "balance_checked",
            Self::ContextGathered => "context_gathered",
            Self::Generated => "generated",
            Self::Committed => "committed",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl fmt::Display for GenerationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recorded result of one completed stage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: GenerationStage,
    /// Wall-clock time spent reaching this stage from the previous one.
    pub elapsed_ms: u64,
    /// Optional detail, e.g. why context was empty.
    pub note: Option<String>,
}

impl StageRecord {
    pub fn new(stage: GenerationStage, elapsed: Duration) -> Self {
        Self {
            stage,
            elapsed_ms: elapsed.as_millis() as u64,
            note: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(GenerationStage::Requested < GenerationStage::BalanceChecked);
        assert!(GenerationStage::Generated < GenerationStage::Committed);
        assert!(GenerationStage::Committed.is_terminal());
        assert!(!GenerationStage::Generated.is_terminal());
    }

    #[test]
    fn serializes_snake_case() {
        let json = serde_json::to_string(&GenerationStage::ContextGathered).unwrap();
        assert_eq!(json, "\"context_gathered\"");
        assert_eq!(GenerationStage::BalanceChecked.to_string(), "balance_checked");
    }
}
