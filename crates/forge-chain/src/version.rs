//! The immutable ruleset snapshot.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use forge_types::{AccountId, LineageKey, ProjectId, VersionId};

/// Who may read a version without owning it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Private,
    /// Readable by anyone holding the version's uuid.
    Public,
}

impl Visibility {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "private" => Ok(Self::Private),
            "public" => Ok(Self::Public),
            other => Err(format!("unknown visibility: {other}")),
        }
    }
}

/// One immutable ruleset snapshot.
///
/// Versions are never edited after creation. An edit produces a new version
/// whose `derived_from` points at the edited one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactVersion {
    pub id: VersionId,
    /// Globally unique, stable identifier for external references.
    pub uuid: Uuid,
    pub owner: AccountId,
    pub project_id: Option<ProjectId>,
    pub content: String,
    /// Hex BLAKE3 digest of `content`.
    pub content_hash: String,
    /// 1-based, gapless within the lineage.
    pub version_number: u32,
    pub derived_from: Option<VersionId>,
    /// Sorted, deduplicated, lowercase technology keywords.
    pub tags: Vec<String>,
    /// Fixed at creation. Defaults to the parent's visibility.
    #[serde(default)]
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
}

impl ArtifactVersion {
    /// Digest used for `content_hash`.
    pub fn hash_content(content: &str) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"ruleforge-version-v1:");
        hasher.update(content.as_bytes());
        hex::encode(hasher.finalize().as_bytes())
    }

    pub fn lineage(&self) -> LineageKey {
        LineageKey::new(self.owner, self.project_id)
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Returns `true` if `content_hash` still matches `content`.
    pub fn verify_hash(&self) -> bool {
        Self::hash_content(&self.content) == self.content_hash
    }

    pub fn word_count(&self) -> usize {
        self.content.split_whitespace().count()
    }

    pub fn byte_count(&self) -> usize {
        self.content.len()
    }

    /// First 12 hex characters of the content hash.
    pub fn short_hash(&self) -> &str {
        let end = self.content_hash.len().min(12);
        &self.content_hash[..end]
    }

    pub fn summary(&self) -> String {
        format!(
            "v{} {} on {} ({})",
            self.version_number,
            self.id,
            self.lineage(),
            self.short_hash()
        )
    }
}
