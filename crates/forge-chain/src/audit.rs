//! Lineage integrity reports.
//!
//! A [`LineageReport`] checks one lineage against the chain invariants:
//! gapless numbering, intact content hashes, well-formed `derived_from`
//! links, a single root, and unique uuids. It also lists the lineage tips;
//! more than one tip means the lineage branched, which is legal.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use forge_types::{LineageKey, VersionId};

use crate::chain::VersionChain;
use crate::error::ChainResult;
use crate::version::ArtifactVersion;

/// Integrity report for a single lineage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageReport {
    pub lineage: LineageKey,
    pub version_count: usize,
    /// Versions with no successor, ascending by number.
    pub tips: Vec<VersionId>,
    pub latest: Option<VersionId>,
    pub violations: Vec<ChainViolation>,
}

impl LineageReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn is_branched(&self) -> bool {
        self.tips.len() > 1
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainViolation {
    pub version: VersionId,
    pub kind: ChainViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainViolationKind {
    NumberGap,
    DuplicateNumber,
    HashMismatch,
    DanglingParent,
    CrossLineageParent,
    MultipleRoots,
    DuplicateUuid,
}

/// Checks lineages for structural and content integrity.
pub struct ChainAuditor;

impl ChainAuditor {
    /// Audit one lineage of a live chain.
    pub fn audit_lineage(chain: &VersionChain, key: &LineageKey) -> ChainResult<LineageReport> {
        let versions = chain.versions()?;
        Ok(Self::audit_versions(key, &versions))
    }

    /// Audit every lineage of a live chain.
    pub fn audit_all(chain: &VersionChain) -> ChainResult<Vec<LineageReport>> {
        let versions = chain.versions()?;
        let keys: BTreeSet<LineageKey> = versions.iter().map(ArtifactVersion::lineage).collect();
        Ok(keys
            .iter()
            .map(|key| Self::audit_versions(key, &versions))
            .collect())
    }

    /// Audit lineage `key` within an arbitrary snapshot of versions.
    ///
    /// `snapshot` may contain other lineages; they are used to resolve
    /// `derived_from` links.
    pub fn audit_versions(key: &LineageKey, snapshot: &[ArtifactVersion]) -> LineageReport {
        let by_id: HashMap<VersionId, &ArtifactVersion> =
            snapshot.iter().map(|v| (v.id, v)).collect();
        let mut members: Vec<&ArtifactVersion> =
            snapshot.iter().filter(|v| &v.lineage() == key).collect();
        members.sort_by_key(|v| (v.version_number, v.id));

        let mut violations = Vec::new();
        let mut push = |version: VersionId, kind: ChainViolationKind, description: String| {
            violations.push(ChainViolation {
                version,
                kind,
                description,
            });
        };

        let mut expected = 1u32;
        let mut numbers: BTreeMap<u32, VersionId> = BTreeMap::new();
        let mut uuids = HashMap::new();
        let mut roots = 0usize;
        let mut has_successor = HashSet::new();

        for version in &members {
            if let Some(first) = numbers.get(&version.version_number) {
                push(
                    version.id,
                    ChainViolationKind::DuplicateNumber,
                    format!("number {} already used by {first}", version.version_number),
                );
            } else {
                if version.version_number != expected {
                    push(
                        version.id,
                        ChainViolationKind::NumberGap,
                        format!("expected v{expected}, found v{}", version.version_number),
                    );
                }
                numbers.insert(version.version_number, version.id);
                expected = version.version_number + 1;
            }

            if !version.verify_hash() {
                push(
                    version.id,
                    ChainViolationKind::HashMismatch,
                    format!("content does not match hash {}", version.short_hash()),
                );
            }

            if let Some(previous) = uuids.insert(version.uuid, version.id) {
                push(
                    version.id,
                    ChainViolationKind::DuplicateUuid,
                    format!("uuid {} also used by {previous}", version.uuid),
                );
            }

            match version.derived_from {
                None => {
                    roots += 1;
                    if roots > 1 {
                        push(
                            version.id,
                            ChainViolationKind::MultipleRoots,
                            "lineage has more than one root".into(),
                        );
                    }
                }
                Some(parent_id) => match by_id.get(&parent_id) {
                    None => push(
                        version.id,
                        ChainViolationKind::DanglingParent,
                        format!("derived from unknown {parent_id}"),
                    ),
                    Some(parent) if &parent.lineage() != key => push(
                        version.id,
                        ChainViolationKind::CrossLineageParent,
                        format!("derived from {parent_id} in {}", parent.lineage()),
                    ),
                    Some(_) => {
                        has_successor.insert(parent_id);
                    }
                },
            }
        }

        let tips: Vec<&ArtifactVersion> = members
            .iter()
            .copied()
            .filter(|v| !has_successor.contains(&v.id))
            .collect();
        let latest = tips.iter().max_by_key(|v| v.version_number).map(|v| v.id);

        LineageReport {
            lineage: *key,
            version_count: members.len(),
            tips: tips.iter().map(|v| v.id).collect(),
            latest,
            violations,
        }
    }
}
