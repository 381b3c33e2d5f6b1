//! What a generator is asked to produce.

use serde::{Deserialize, Serialize};

use forge_types::{DeveloperStyle, Project};

use crate::context::Insights;
use crate::error::GenerationError;

/// Everything a generator needs, assembled from a validated project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationSpec {
    pub project_name: String,
    pub description: String,
    /// Declared stack, trimmed and in declared order.
    pub tech_stack: Vec<String>,
    pub style: DeveloperStyle,
    pub requirements: Option<String>,
    pub insights: Insights,
}

impl GenerationSpec {
    /// Build a spec, rejecting projects that lack a description, a stack,
    /// or a developer style.
    pub fn from_project(project: &Project) -> Result<Self, GenerationError> {
        let missing = project.missing_generation_inputs();
        let style = match project.developer_style {
            Some(style) if missing.is_empty() => style,
            _ => {
                return Err(GenerationError::InvalidProject {
                    missing: missing.into_iter().map(str::to_string).collect(),
                })
            }
        };

        Ok(Self {
            project_name: project.name.clone(),
            description: project.description.trim().to_string(),
            tech_stack: project.declared_stack(),
            style,
            requirements: project
                .requirements
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            insights: Insights::default(),
        })
    }

    pub fn with_insights(mut self, insights: Insights) -> Self {
        self.insights = insights;
        self
    }

    pub fn stack_list(&self) -> String {
        self.tech_stack.join(", ")
    }

    /// Instruction text for a language-model backed [`Generator`].
    ///
    /// [`Generator`]: crate::generator::Generator
    pub fn prompt(&self) -> String {
        let mut sections = vec![
            "You are an expert software architect and coding mentor. Generate a comprehensive, \
             personalized coding ruleset in Markdown format."
                .to_string(),
            format!(
                "## Project Context\n**Developer Identity**: {}\n{}",
                self.style.as_str(),
                style_context(self.style)
            ),
            format!("**Application Description**:\n{}", self.description),
            format!("**Technology Stack**:\n{}", self.stack_list()),
        ];

        let notes = stack_notes(&self.tech_stack);
        if !notes.is_empty() {
            sections.push(format!("**Technology-Specific Notes**:\n{}", notes.join("\n")));
        }
        if let Some(community) = community_context(&self.insights) {
            sections.push(community);
        }
        sections.push(format!(
            "**Additional Requirements**:\n{}",
            self.requirements.as_deref().unwrap_or("None specified")
        ));
        sections.push(
            "## Instructions\nCreate a detailed, actionable ruleset covering code style and \
             formatting, architecture and design patterns, best practices, testing strategy, \
             documentation standards, development workflow, and technology-specific guidelines. \
             Format the response as clean Markdown with headers, bullet points, and code examples."
                .to_string(),
        );

        sections.join("\n\n")
    }
}

fn style_context(style: DeveloperStyle) -> &'static str {
    match style {
        DeveloperStyle::VibeCoder => {
            "*This developer values creativity, experimentation, and flexible approaches. They prefer:*\n\
             - Creative solutions over rigid patterns\n\
             - Rapid prototyping and iteration\n\
             - Flexible, adaptable code structures\n\
             - Learning through experimentation"
        }
        DeveloperStyle::ExperiencedDev => {
            "*This developer values professional standards, maintainability, and proven practices. They prefer:*\n\
             - Industry-standard patterns and conventions\n\
             - Robust, maintainable code architecture\n\
             - Comprehensive testing and documentation\n\
             - Scalable, enterprise-ready solutions"
        }
    }
}

fn stack_notes(stack: &[String]) -> Vec<&'static str> {
    let mut notes = Vec::new();
    for tech in stack {
        let tech = tech.to_lowercase();
        let note = if tech.contains("react") {
            "- React: Focus on hooks, component composition, and modern patterns"
        } else if tech.contains("rails") {
            "- Rails: Emphasize convention over configuration, RESTful design"
        } else if tech.contains("node") {
            "- Node.js: Async/await patterns, proper error handling, security"
        } else if tech.contains("python") {
            "- Python: PEP 8 compliance, type hints, virtual environments"
        } else if tech.contains("typescript") {
            "- TypeScript: Strong typing, interface definitions, strict mode"
        } else if tech.contains("docker") {
            "- Docker: Multi-stage builds, security scanning, optimization"
        } else {
            continue;
        };
        notes.push(note);
    }
    notes
}

fn community_context(insights: &Insights) -> Option<String> {
    if insights.is_empty() {
        return None;
    }
    let mut out = String::from("## Community Best Practices\n");
    let lists = [
        ("Common Patterns", &insights.common_patterns),
        ("Best Practices", &insights.best_practices),
    ];
    for (title, items) in lists {
        if !items.is_empty() {
            out.push_str(&format!("**{title}**:\n"));
            for item in items {
                out.push_str(&format!("- {item}\n"));
            }
        }
    }
    if !insights.tech_specific_rules.is_empty() {
        out.push_str("**Technology-Specific Guidelines**:\n");
        for (tech, rules) in &insights.tech_specific_rules {
            out.push_str(&format!("*{tech}*:\n"));
            for rule in rules {
                out.push_str(&format!("  - {rule}\n"));
            }
        }
    }
    Some(out.trim_end().to_string())
}
