//! The version chain and its per-lineage write protocol.
//!
//! [`VersionChain`] stores versions in an arena keyed by [`VersionId`] and
//! maintains a forward-edge index (`successors`) for "latest" queries and a
//! per-lineage index ordered by version number.
//!
//! # Invariants
//!
//! - Versions are immutable once published.
//! - Every `derived_from` resolves to a version in the same lineage.
//! - Version numbers strictly increase within a lineage; versions created
//!   through the chain are gapless from 1.
//! - Writers to one lineage are serialized by its [`LineageGuard`].

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard};

use chrono::Utc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};
use uuid::Uuid;

use forge_types::{is_blank, AccountId, LineageKey, Project, VersionId};

use crate::error::{ChainError, ChainResult};
use crate::tags::extract_tags;
use crate::version::{ArtifactVersion, Visibility};

#[derive(Clone, Debug, Default)]
struct ChainState {
    versions: HashMap<VersionId, ArtifactVersion>,
    /// Forward-edge index: version -> versions derived from it.
    successors: HashMap<VersionId, Vec<VersionId>>,
    /// Lineage -> version ids, ascending by version number.
    lineages: HashMap<LineageKey, Vec<VersionId>>,
    uuids: HashMap<Uuid, VersionId>,
    roots: Vec<VersionId>,
}

impl ChainState {
    fn insert(&mut self, version: ArtifactVersion) {
        if let Some(parent) = version.derived_from {
            self.successors.entry(parent).or_default().push(version.id);
        } else {
            self.roots.push(version.id);
        }
        self.lineages
            .entry(version.lineage())
            .or_default()
            .push(version.id);
        self.uuids.insert(version.uuid, version.id);
        self.versions.insert(version.id, version);
    }

    fn lineage_versions(&self, key: &LineageKey) -> impl Iterator<Item = &ArtifactVersion> {
        self.lineages
            .get(key)
            .into_iter()
            .flatten()
            .filter_map(|id| self.versions.get(id))
    }

    fn last_number(&self, key: &LineageKey) -> Option<u32> {
        self.lineages
            .get(key)
            .and_then(|ids| ids.last())
            .and_then(|id| self.versions.get(id))
            .map(|v| v.version_number)
    }

    fn has_successors(&self, id: &VersionId) -> bool {
        self.successors.get(id).is_some_and(|s| !s.is_empty())
    }

    /// The version with no successor and the highest number.
    fn latest(&self, key: &LineageKey) -> Option<&ArtifactVersion> {
        self.lineage_versions(key)
            .filter(|v| !self.has_successors(&v.id))
            .max_by_key(|v| v.version_number)
    }
}

/// Arena of immutable ruleset versions grouped into lineages.
#[derive(Debug)]
pub struct VersionChain {
    state: RwLock<ChainState>,
    locks: Mutex<HashMap<LineageKey, Arc<tokio::sync::Mutex<()>>>>,
    next_id: AtomicU64,
}

impl Default for VersionChain {
    fn default() -> Self {
        Self::new()
    }
}

impl VersionChain {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ChainState::default()),
            locks: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn read(&self) -> ChainResult<RwLockReadGuard<'_, ChainState>> {
        self.state.read().map_err(|_| ChainError::LockPoisoned)
    }

    /// Total number of published versions.
    pub fn len(&self) -> usize {
        self.read().map(|s| s.versions.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // ---------------------------------------------------------------
    // Write protocol
    // ---------------------------------------------------------------

    /// Acquire exclusive write access to one lineage.
    ///
    /// Waiting is cancellation-safe: dropping the future before it resolves
    /// leaves the lineage untouched.
    pub async fn lock_lineage(&self, key: LineageKey) -> ChainResult<LineageGuard<'_>> {
        let lock = {
            let mut locks = self.locks.lock().map_err(|_| ChainError::LockPoisoned)?;
            Arc::clone(locks.entry(key).or_default())
        };
        let held = lock.lock_owned().await;
        debug!(lineage = %key, "lineage locked");
        Ok(LineageGuard {
            chain: self,
            key,
            held,
        })
    }

    /// Create the first version of a lineage.
    pub async fn create_root(
        &self,
        owner: &AccountId,
        project: Option<&Project>,
        content: &str,
    ) -> ChainResult<ArtifactVersion> {
        if is_blank(content) {
            return Err(ChainError::EmptyContent);
        }
        let key = LineageKey::new(*owner, project.map(|p| p.id));
        let guard = self.lock_lineage(key).await?;
        Ok(guard.prepare_root(owner, project, content)?.publish())
    }

    /// Create a version derived from `from` in `from`'s lineage.
    ///
    /// `from` need not be the latest version; the new version still takes
    /// the next number in the lineage.
    pub async fn create_next(
        &self,
        owner: &AccountId,
        from: &VersionId,
        content: &str,
        project: Option<&Project>,
    ) -> ChainResult<ArtifactVersion> {
        self.create_next_with(owner, from, content, project, None).await
    }

    /// [`create_next`](Self::create_next) with an explicit visibility.
    /// `None` keeps the visibility of `from`.
    pub async fn create_next_with(
        &self,
        owner: &AccountId,
        from: &VersionId,
        content: &str,
        project: Option<&Project>,
        visibility: Option<Visibility>,
    ) -> ChainResult<ArtifactVersion> {
        if is_blank(content) {
            return Err(ChainError::ContentRequired);
        }
        let key = self.get(from)?.lineage();
        let guard = self.lock_lineage(key).await?;
        let mut prepared = guard.prepare_next(owner, from, content, project)?;
        if let Some(visibility) = visibility {
            prepared = prepared.with_visibility(visibility);
        }
        Ok(prepared.publish())
    }

    /// Append a copy of version `target_number` as the new latest version.
    ///
    /// History is never rewritten: reverting 3 versions back to v1 yields v4.
    pub async fn revert(
        &self,
        owner: &AccountId,
        key: LineageKey,
        target_number: u32,
        project: Option<&Project>,
    ) -> ChainResult<ArtifactVersion> {
        if &key.owner != owner {
            return Err(ChainError::NotOwner {
                account: *owner,
                target: key.to_string(),
            });
        }
        let guard = self.lock_lineage(key).await?;
        let target = self.find_by_number(&key, target_number)?;
        let latest = guard
            .latest()?
            .ok_or(ChainError::VersionNumberNotFound {
                lineage: key,
                number: target_number,
            })?;
        debug!(lineage = %key, target = target_number, from = latest.version_number, "reverting");
        Ok(guard
            .prepare_next(owner, &latest.id, &target.content, project)?
            .publish())
    }

    // ---------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------

    pub fn get(&self, id: &VersionId) -> ChainResult<ArtifactVersion> {
        self.read()?
            .versions
            .get(id)
            .cloned()
            .ok_or(ChainError::VersionNotFound(*id))
    }

    pub fn get_by_uuid(&self, uuid: &Uuid) -> ChainResult<Option<ArtifactVersion>> {
        let state = self.read()?;
        Ok(state
            .uuids
            .get(uuid)
            .and_then(|id| state.versions.get(id))
            .cloned())
    }

    /// The version with `uuid`, only if it is public.
    pub fn get_public(&self, uuid: &Uuid) -> ChainResult<ArtifactVersion> {
        self.get_by_uuid(uuid)?
            .filter(ArtifactVersion::is_public)
            .ok_or(ChainError::NotPublic(*uuid))
    }

    /// Every version `owner` created, across all lineages, newest first.
    pub fn by_owner(&self, owner: &AccountId) -> ChainResult<Vec<ArtifactVersion>> {
        let mut owned: Vec<ArtifactVersion> = self
            .read()?
            .versions
            .values()
            .filter(|v| &v.owner == owner)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(owned)
    }

    pub fn find_by_number(&self, key: &LineageKey, number: u32) -> ChainResult<ArtifactVersion> {
        self.read()?
            .lineage_versions(key)
            .find(|v| v.version_number == number)
            .cloned()
            .ok_or(ChainError::VersionNumberNotFound {
                lineage: *key,
                number,
            })
    }

    /// The latest version of a lineage, or `None` if it has no versions.
    pub fn latest(&self, key: &LineageKey) -> ChainResult<Option<ArtifactVersion>> {
        Ok(self.read()?.latest(key).cloned())
    }

    pub fn is_latest(&self, id: &VersionId) -> ChainResult<bool> {
        let state = self.read()?;
        let version = state
            .versions
            .get(id)
            .ok_or(ChainError::VersionNotFound(*id))?;
        Ok(state
            .latest(&version.lineage())
            .is_some_and(|latest| latest.id == *id))
    }

    /// The derivation path from the lineage root to `id`, root first.
    pub fn history(&self, id: &VersionId) -> ChainResult<Vec<ArtifactVersion>> {
        let state = self.read()?;
        let mut path = Vec::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(*id);

        while let Some(current) = cursor {
            if !seen.insert(current) {
                break;
            }
            let version = state
                .versions
                .get(&current)
                .ok_or(ChainError::VersionNotFound(current))?;
            cursor = version.derived_from;
            path.push(version.clone());
        }

        path.reverse();
        Ok(path)
    }

    /// Every version in a lineage, ascending by number.
    pub fn lineage(&self, key: &LineageKey) -> ChainResult<Vec<ArtifactVersion>> {
        Ok(self.read()?.lineage_versions(key).cloned().collect())
    }

    /// All lineages with at least one version, sorted.
    pub fn lineages(&self) -> ChainResult<Vec<LineageKey>> {
        let mut keys: Vec<LineageKey> = self.read()?.lineages.keys().copied().collect();
        keys.sort();
        Ok(keys)
    }

    /// Versions derived directly from `id`, oldest first.
    pub fn successors(&self, id: &VersionId) -> ChainResult<Vec<ArtifactVersion>> {
        let state = self.read()?;
        if !state.versions.contains_key(id) {
            return Err(ChainError::VersionNotFound(*id));
        }
        Ok(state
            .successors
            .get(id)
            .into_iter()
            .flatten()
            .filter_map(|child| state.versions.get(child))
            .cloned()
            .collect())
    }

    /// All lineage roots.
    pub fn roots(&self) -> ChainResult<Vec<ArtifactVersion>> {
        let state = self.read()?;
        Ok(state
            .roots
            .iter()
            .filter_map(|id| state.versions.get(id))
            .cloned()
            .collect())
    }

    /// Every published version, ascending by id.
    pub fn versions(&self) -> ChainResult<Vec<ArtifactVersion>> {
        let mut all: Vec<ArtifactVersion> = self.read()?.versions.values().cloned().collect();
        all.sort_by_key(|v| v.id);
        Ok(all)
    }

    // ---------------------------------------------------------------
    // Restore
    // ---------------------------------------------------------------

    /// Rebuild the arena from persisted versions.
    ///
    /// Links and uniqueness are validated and nothing is applied unless every
    /// version passes. Content hashes and numbering gaps are left to
    /// [`ChainAuditor`](crate::audit::ChainAuditor).
    pub fn restore(&self, versions: Vec<ArtifactVersion>) -> ChainResult<usize> {
        let mut versions = versions;
        versions.sort_by_key(|v| v.id);

        let mut state = self.state.write().map_err(|_| ChainError::LockPoisoned)?;
        let mut staged = state.clone();
        let mut max_id = 0u64;
        let count = versions.len();

        for version in versions {
            let integrity = |reason: String| ChainError::IntegrityViolation {
                version: version.id,
                reason,
            };

            if staged.versions.contains_key(&version.id) {
                return Err(integrity("duplicate version id".into()));
            }
            if staged.uuids.contains_key(&version.uuid) {
                return Err(integrity(format!("duplicate uuid {}", version.uuid)));
            }
            if version.version_number == 0 {
                return Err(integrity("version numbers start at 1".into()));
            }
            if let Some(last) = staged.last_number(&version.lineage()) {
                if version.version_number <= last {
                    return Err(integrity(format!(
                        "number {} does not follow {last}",
                        version.version_number
                    )));
                }
            }
            if let Some(parent) = version.derived_from {
                let parent = staged
                    .versions
                    .get(&parent)
                    .ok_or_else(|| integrity(format!("derived from unknown {parent}")))?;
                if parent.lineage() != version.lineage() {
                    return Err(integrity(format!(
                        "derived from {} in lineage {}",
                        parent.id,
                        parent.lineage()
                    )));
                }
            }

            max_id = max_id.max(version.id.get());
            staged.insert(version);
        }

        *state = staged;
        self.next_id.fetch_max(max_id + 1, Ordering::SeqCst);
        info!(count, "restored version chain");
        Ok(count)
    }
}

/// Exclusive write access to one lineage.
///
/// Preparing a version consumes the guard, so at most one version is
/// prepared per acquisition and the lock stays held until that version is
/// published or dropped.
#[derive(Debug)]
pub struct LineageGuard<'a> {
    chain: &'a VersionChain,
    key: LineageKey,
    held: OwnedMutexGuard<()>,
}

impl<'a> LineageGuard<'a> {
    pub fn key(&self) -> LineageKey {
        self.key
    }

    /// The lineage's latest version as seen under the lock.
    pub fn latest(&self) -> ChainResult<Option<ArtifactVersion>> {
        self.chain.latest(&self.key)
    }

    /// Build the lineage's first version without publishing it.
    pub fn prepare_root(
        self,
        requester: &AccountId,
        project: Option<&Project>,
        content: &str,
    ) -> ChainResult<PreparedVersion<'a>> {
        if is_blank(content) {
            return Err(ChainError::EmptyContent);
        }
        if requester != &self.key.owner {
            return Err(ChainError::NotOwner {
                account: *requester,
                target: self.key.to_string(),
            });
        }
        self.check_project(requester, project)?;
        if self.chain.read()?.last_number(&self.key).is_some() {
            return Err(ChainError::LineageExists(self.key));
        }

        let version = self.build(project, content, 1, None, Visibility::default());
        Ok(self.into_prepared(version))
    }

    /// Build a version derived from `from` without publishing it.
    pub fn prepare_next(
        self,
        requester: &AccountId,
        from: &VersionId,
        content: &str,
        project: Option<&Project>,
    ) -> ChainResult<PreparedVersion<'a>> {
        if is_blank(content) {
            return Err(ChainError::ContentRequired);
        }
        let (number, visibility) = {
            let state = self.chain.read()?;
            let parent = state
                .versions
                .get(from)
                .ok_or(ChainError::VersionNotFound(*from))?;
            if &parent.owner != requester {
                return Err(ChainError::NotOwner {
                    account: *requester,
                    target: from.to_string(),
                });
            }
            if parent.lineage() != self.key {
                return Err(ChainError::LineageMismatch {
                    lineage: self.key,
                    version: *from,
                });
            }
            (state.last_number(&self.key).unwrap_or(0) + 1, parent.visibility)
        };
        self.check_project(requester, project)?;

        let version = self.build(project, content, number, Some(*from), visibility);
        Ok(self.into_prepared(version))
    }

    fn check_project(&self, requester: &AccountId, project: Option<&Project>) -> ChainResult<()> {
        let Some(project) = project else {
            return Ok(());
        };
        if self.key.project != Some(project.id) {
            return Err(ChainError::ProjectMismatch {
                lineage: self.key,
                project: project.id,
            });
        }
        if !project.is_owned_by(requester) {
            return Err(ChainError::NotOwner {
                account: *requester,
                target: project.id.to_string(),
            });
        }
        Ok(())
    }

    fn build(
        &self,
        project: Option<&Project>,
        content: &str,
        version_number: u32,
        derived_from: Option<VersionId>,
        visibility: Visibility,
    ) -> ArtifactVersion {
        let stack = project.map(Project::declared_stack).unwrap_or_default();
        let id = VersionId::new(self.chain.next_id.fetch_add(1, Ordering::SeqCst));

        ArtifactVersion {
            id,
            uuid: Uuid::now_v7(),
            owner: self.key.owner,
            project_id: self.key.project,
            content: content.to_string(),
            content_hash: ArtifactVersion::hash_content(content),
            version_number,
            derived_from,
            tags: extract_tags(content, &stack),
            visibility,
            created_at: Utc::now(),
        }
    }

    fn into_prepared(self, version: ArtifactVersion) -> PreparedVersion<'a> {
        debug!(
            lineage = %self.key,
            version = %version.id,
            number = version.version_number,
            "prepared version"
        );
        PreparedVersion {
            chain: self.chain,
            version,
            _held: self.held,
        }
    }
}

/// A built but unpublished version holding its lineage lock.
///
/// Dropping it releases the lock and leaves no trace in the chain; the
/// reserved number is reused by the next writer.
#[derive(Debug)]
pub struct PreparedVersion<'a> {
    chain: &'a VersionChain,
    version: ArtifactVersion,
    _held: OwnedMutexGuard<()>,
}

impl PreparedVersion<'_> {
    pub fn id(&self) -> VersionId {
        self.version.id
    }

    pub fn version(&self) -> &ArtifactVersion {
        &self.version
    }

    /// Override the visibility before publishing.
    pub fn with_visibility(mut self, visibility: Visibility) -> Self {
        self.version.visibility = visibility;
        self
    }

    /// Make the version visible. Cannot fail.
    pub fn publish(self) -> ArtifactVersion {
        let chain = self.chain;
        let version = self.version;
        {
            let mut state = chain.state.write().unwrap_or_else(PoisonError::into_inner);
            state.insert(version.clone());
        }
        info!(
            version = %version.id,
            lineage = %version.lineage(),
            number = version.version_number,
            visibility = %version.visibility,
            tags = ?version.tags,
            "published version"
        );
        version
    }
}
