use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::{AccountId, ProjectId};
use crate::is_blank;

/// How the developer behind a project prefers to work.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeveloperStyle {
    /// Creative, experimental, rapid iteration.
    VibeCoder,
    /// Established practice, maintainability, thorough testing.
    ExperiencedDev,
}

impl DeveloperStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::VibeCoder => "vibe_coder",
            Self::ExperiencedDev => "experienced_dev",
        }
    }

    /// Human-readable label, e.g. "Experienced dev".
    pub fn label(&self) -> &'static str {
        match self {
            Self::VibeCoder => "Vibe coder",
            Self::ExperiencedDev => "Experienced dev",
        }
    }
}

impl fmt::Display for DeveloperStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeveloperStyle {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace(['-', ' '], "_").as_str() {
            "vibe_coder" | "vibe" | "creative" => Ok(Self::VibeCoder),
            "experienced_dev" | "experienced" | "professional" => Ok(Self::ExperiencedDev),
            other => Err(TypeError::UnknownStyle(other.to_string())),
        }
    }
}

/// A group of ruleset versions. Projects are mutable but not versioned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub owner: AccountId,
    pub name: String,
    pub description: String,
    /// Declared technologies, in the order the owner listed them.
    pub tech_stack: Vec<String>,
    pub developer_style: Option<DeveloperStyle>,
    /// Free-form requirements appended to every generated ruleset.
    pub requirements: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Names of the inputs generation needs that are absent or blank.
    pub fn missing_generation_inputs(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if is_blank(&self.description) {
            missing.push("description");
        }
        if self.tech_stack.iter().all(|t| is_blank(t)) {
            missing.push("tech stack");
        }
        if self.developer_style.is_none() {
            missing.push("developer style");
        }
        missing
    }

    /// Non-blank stack entries, trimmed, in declared order.
    pub fn declared_stack(&self) -> Vec<String> {
        self.tech_stack
            .iter()
            .map(|t| t.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn is_owned_by(&self, account: &AccountId) -> bool {
        &self.owner == account
    }
}

/// Input for creating a project.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub tech_stack: Vec<String>,
    pub developer_style: Option<DeveloperStyle>,
    pub requirements: Option<String>,
}

impl NewProject {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            ..Self::default()
        }
    }

    pub fn with_stack<I, S>(mut self, stack: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tech_stack = stack.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_style(mut self, style: DeveloperStyle) -> Self {
        self.developer_style = Some(style);
        self
    }

    pub fn with_requirements(mut self, requirements: impl Into<String>) -> Self {
        self.requirements = Some(requirements.into());
        self
    }

    /// A project needs at least a name to be stored.
    pub fn validate(&self) -> Result<(), TypeError> {
        if is_blank(&self.name) {
            return Err(TypeError::InvalidProject("name is required".into()));
        }
        Ok(())
    }

    pub fn into_project(self, id: ProjectId, owner: AccountId) -> Project {
        let now = Utc::now();
        Project {
            id,
            owner,
            name: self.name.trim().to_string(),
            description: self.description,
            tech_stack: self.tech_stack,
            developer_style: self.developer_style,
            requirements: self.requirements.filter(|r| !is_blank(r)),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update of a project; `None` fields are left untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub tech_stack: Option<Vec<String>>,
    pub developer_style: Option<DeveloperStyle>,
    pub requirements: Option<String>,
}

impl ProjectUpdate {
    pub fn apply(self, project: &mut Project) -> Result<(), TypeError> {
        if let Some(name) = self.name {
            if is_blank(&name) {
                return Err(TypeError::InvalidProject("name is required".into()));
            }
            project.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            project.description = description;
        }
        if let Some(stack) = self.tech_stack {
            project.tech_stack = stack;
        }
        if let Some(style) = self.developer_style {
            project.developer_style = Some(style);
        }
        if let Some(requirements) = self.requirements {
            project.requirements = Some(requirements).filter(|r| !is_blank(r));
        }
        project.updated_at = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn project() -> Project {
        NewProject::new("api", "sample")
            .with_stack(["Go", "PostgreSQL"])
            .with_style(DeveloperStyle::ExperiencedDev)
            .into_project(ProjectId::new(1), AccountId::new(1))
    }

    #[test]
    fn complete_project_has_no_missing_inputs() {
        assert!(project().missing_generation_inputs().is_empty());
    }

    #[test]
    fn missing_inputs_are_reported_in_order() {
        let mut p = project();
        p.description = "   ".into();
        p.tech_stack = vec![" ".into()];
        p.developer_style = None;
        assert_eq!(
            p.missing_generation_inputs(),
            vec!["description", "tech stack", "developer style"]
        );
    }

    #[test]
    fn declared_stack_drops_blank_entries() {
        let mut p = project();
        p.tech_stack = vec![" Go ".into(), "".into(), "Redis".into()];
        assert_eq!(p.declared_stack(), vec!["Go", "Redis"]);
    }

    #[test]
    fn style_parses_aliases() {
        assert_eq!(
            "experienced".parse::<DeveloperStyle>().unwrap(),
            DeveloperStyle::ExperiencedDev
        );
        assert_eq!(
            "vibe-coder".parse::<DeveloperStyle>().unwrap(),
            DeveloperStyle::VibeCoder
        );
        assert!("lazy".parse::<DeveloperStyle>().is_err());
    }

    #[test]
    fn new_project_requires_name() {
        assert!(NewProject::new(" ", "d").validate().is_err());
        assert!(NewProject::new("x", "d").validate().is_ok());
    }

    #[test]
    fn update_applies_only_present_fields() {
        let mut p = project();
        ProjectUpdate {
            description: Some("new description".into()),
            ..ProjectUpdate::default()
        }
        .apply(&mut p)
        .unwrap();
        assert_eq!(p.description, "new description");
        assert_eq!(p.name, "api");
        assert_eq!(p.tech_stack, vec!["Go", "PostgreSQL"]);
    }

    #[test]
    fn update_rejects_blank_name() {
        let mut p = project();
        let err = ProjectUpdate {
            name: Some("".into()),
            ..ProjectUpdate::default()
        }
        .apply(&mut p)
        .unwrap_err();
        assert!(matches!(err, TypeError::InvalidProject(_)));
    }
}
