//! Project storage and ownership checks.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use forge_chain::{ChainError, VersionChain};
use forge_types::{AccountId, NewProject, Project, ProjectId, ProjectUpdate, TypeError, VersionId};

#[derive(Debug, thiserror::Error)]
pub enum AccessError {
    #[error("{account} may not {action}")]
    NotOwner { account: AccountId, action: Action },

    #[error("project not found: {0}")]
    ProjectNotFound(ProjectId),

    #[error("project already exists: {0}")]
    ProjectExists(ProjectId),

    #[error(transparent)]
    Invalid(#[from] TypeError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error("project registry lock poisoned")]
    LockPoisoned,
}

impl AccessError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotOwner { .. } => "not_owner",
            Self::ProjectNotFound(_) => "project_not_found",
            Self::ProjectExists(_) => "project_exists",
            Self::Invalid(_) => "invalid_input",
            Self::Chain(e) => e.kind(),
            Self::LockPoisoned => "internal",
        }
    }
}

/// Something an account asks to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    ReadProject(ProjectId),
    MutateProject(ProjectId),
    ReadVersion(VersionId),
    MutateVersion(VersionId),
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadProject(id) => write!(f, "read {id}"),
            Self::MutateProject(id) => write!(f, "modify {id}"),
            Self::ReadVersion(id) => write!(f, "read {id}"),
            Self::MutateVersion(id) => write!(f, "modify {id}"),
        }
    }
}

// ---------------------------------------------------------------------------
// ProjectRegistry
// ---------------------------------------------------------------------------

/// In-memory store of projects keyed by id.
pub struct ProjectRegistry {
    projects: RwLock<BTreeMap<ProjectId, Project>>,
    next_id: AtomicU64,
}

impl Default for ProjectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectRegistry {
    pub fn new() -> Self {
        Self {
            projects: RwLock::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn create(&self, owner: &AccountId, new: NewProject) -> Result<Project, AccessError> {
        new.validate()?;
        let id = ProjectId::new(self.next_id.fetch_add(1, Ordering::SeqCst));
        let project = new.into_project(id, *owner);
        self.projects
            .write()
            .map_err(|_| AccessError::LockPoisoned)?
            .insert(id, project.clone());
        info!(project = %id, owner = %owner, name = %project.name, "project created");
        Ok(project)
    }

    /// Apply `update` if `account` owns the project.
    pub fn update(
        &self,
        account: &AccountId,
        id: &ProjectId,
        update: ProjectUpdate,
    ) -> Result<Project, AccessError> {
        let mut projects = self.projects.write().map_err(|_| AccessError::LockPoisoned)?;
        let project = projects
            .get_mut(id)
            .ok_or(AccessError::ProjectNotFound(*id))?;
        if !project.is_owned_by(account) {
            return Err(AccessError::NotOwner {
                account: *account,
                action: Action::MutateProject(*id),
            });
        }
        // Apply to a copy so a rejected update leaves the stored project intact.
        let mut updated = project.clone();
        update.apply(&mut updated)?;
        *project = updated.clone();
        debug!(project = %id, "project updated");
        Ok(updated)
    }

    pub fn get(&self, id: &ProjectId) -> Result<Project, AccessError> {
        self.projects
            .read()
            .map_err(|_| AccessError::LockPoisoned)?
            .get(id)
            .cloned()
            .ok_or(AccessError::ProjectNotFound(*id))
    }

    /// Projects owned by `owner`, oldest first.
    pub fn list_by_owner(&self, owner: &AccountId) -> Result<Vec<Project>, AccessError> {
        Ok(self
            .projects
            .read()
            .map_err(|_| AccessError::LockPoisoned)?
            .values()
            .filter(|p| p.is_owned_by(owner))
            .cloned()
            .collect())
    }

    pub fn all(&self) -> Result<Vec<Project>, AccessError> {
        Ok(self
            .projects
            .read()
            .map_err(|_| AccessError::LockPoisoned)?
            .values()
            .cloned()
            .collect())
    }

    /// Load persisted projects. Ids must not collide with existing ones.
    pub fn restore(&self, projects: Vec<Project>) -> Result<usize, AccessError> {
        let mut stored = self.projects.write().map_err(|_| AccessError::LockPoisoned)?;
        if let Some(dup) = projects.iter().find(|p| stored.contains_key(&p.id)) {
            return Err(AccessError::ProjectExists(dup.id));
        }
        let count = projects.len();
        for project in projects {
            self.next_id.fetch_max(project.id.get() + 1, Ordering::SeqCst);
            stored.insert(project.id, project);
        }
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.projects.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// AccessPolicy
// ---------------------------------------------------------------------------

/// Owner-only access to projects and the versions generated from them.
#[derive(Clone)]
pub struct AccessPolicy {
    projects: Arc<ProjectRegistry>,
    chain: Arc<VersionChain>,
}

impl AccessPolicy {
    pub fn new(projects: Arc<ProjectRegistry>, chain: Arc<VersionChain>) -> Self {
        Self { projects, chain }
    }

    pub fn authorize(&self, account: &AccountId, action: &Action) -> Result<(), AccessError> {
        let owner = match action {
            Action::ReadProject(id) | Action::MutateProject(id) => self.projects.get(id)?.owner,
            Action::ReadVersion(id) | Action::MutateVersion(id) => self.chain.get(id)?.owner,
        };
        if &owner != account {
            debug!(account = %account, action = %action, "access denied");
            return Err(AccessError::NotOwner {
                account: *account,
                action: *action,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use forge_types::DeveloperStyle;

    use super::*;

    fn alice() -> AccountId {
        AccountId::new(1)
    }

    fn bob() -> AccountId {
        AccountId::new(2)
    }

    fn sample() -> NewProject {
        NewProject::new("api", "Inventory service")
            .with_stack(["Go"])
            .with_style(DeveloperStyle::ExperiencedDev)
    }

    #[test]
    fn create_assigns_sequential_ids() {
        let registry = ProjectRegistry::new();
        let a = registry.create(&alice(), sample()).unwrap();
        let b = registry.create(&bob(), sample()).unwrap();
        assert_eq!(a.id, ProjectId::new(1));
        assert_eq!(b.id, ProjectId::new(2));
        assert_eq!(registry.list_by_owner(&alice()).unwrap(), vec![a]);
    }

    #[test]
    fn create_requires_a_name() {
        let registry = ProjectRegistry::new();
        let err = registry.create(&alice(), NewProject::new("  ", "x")).unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
        assert!(registry.is_empty());
    }

    #[test]
    fn only_owner_may_update() {
        let registry = ProjectRegistry::new();
        let project = registry.create(&alice(), sample()).unwrap();

        let err = registry
            .update(&bob(), &project.id, ProjectUpdate::default())
            .unwrap_err();
        assert_eq!(err.kind(), "not_owner");

        let update = ProjectUpdate {
            description: Some("Warehouse service".into()),
            ..Default::default()
        };
        let updated = registry.update(&alice(), &project.id, update).unwrap();
        assert_eq!(updated.description, "Warehouse service");
        assert_eq!(registry.get(&project.id).unwrap(), updated);
    }

    #[test]
    fn rejected_update_changes_nothing() {
        let registry = ProjectRegistry::new();
        let project = registry.create(&alice(), sample()).unwrap();
        let update = ProjectUpdate {
            name: Some(" ".into()),
            description: Some("changed".into()),
            ..Default::default()
        };
        assert!(registry.update(&alice(), &project.id, update).is_err());
        assert_eq!(registry.get(&project.id).unwrap(), project);
    }

    #[test]
    fn restore_continues_numbering() {
        let source = ProjectRegistry::new();
        source.create(&alice(), sample()).unwrap();
        source.create(&alice(), sample()).unwrap();

        let registry = ProjectRegistry::new();
        assert_eq!(registry.restore(source.all().unwrap()).unwrap(), 2);
        let next = registry.create(&bob(), sample()).unwrap();
        assert_eq!(next.id, ProjectId::new(3));

        let err = registry.restore(source.all().unwrap()).unwrap_err();
        assert_eq!(err.kind(), "project_exists");
    }

    #[tokio::test]
    async fn policy_checks_project_and_version_owners() {
        let registry = Arc::new(ProjectRegistry::new());
        let chain = Arc::new(VersionChain::new());
        let policy = AccessPolicy::new(registry.clone(), chain.clone());
        let project = registry.create(&alice(), sample()).unwrap();
        let v1 = chain
            .create_root(&alice(), Some(&project), "Use golang.")
            .await
            .unwrap();

        policy.authorize(&alice(), &Action::MutateProject(project.id)).unwrap();
        policy.authorize(&alice(), &Action::ReadVersion(v1.id)).unwrap();

        let err = policy
            .authorize(&bob(), &Action::ReadVersion(v1.id))
            .unwrap_err();
        assert_eq!(err.to_string(), "acct:2 may not read ver:1");

        let err = policy
            .authorize(&alice(), &Action::ReadProject(ProjectId::new(99)))
            .unwrap_err();
        assert_eq!(err.kind(), "project_not_found");

        let err = policy
            .authorize(&alice(), &Action::MutateVersion(VersionId::new(42)))
            .unwrap_err();
        assert_eq!(err.kind(), "version_not_found");
    }
}
