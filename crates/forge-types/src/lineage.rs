use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::{AccountId, ProjectId};

/// Scope of one version chain: an owner plus an optional project.
///
/// Version numbers are unique and gapless within a lineage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LineageKey {
    pub owner: AccountId,
    pub project: Option<ProjectId>,
}

impl LineageKey {
    pub fn new(owner: AccountId, project: Option<ProjectId>) -> Self {
        Self { owner, project }
    }

    pub fn for_project(owner: AccountId, project: ProjectId) -> Self {
        Self::new(owner, Some(project))
    }
}

impl fmt::Display for LineageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.project {
            Some(project) => write!(f, "{}/{}", self.owner, project),
            None => write!(f, "{}/-", self.owner),
        }
    }
}
