//! Deterministic local ruleset generator.
//!
//! Output depends only on the [`GenerationSpec`], so the same project always
//! renders the same ruleset. Used as the last link of every
//! [`FallbackChain`](crate::generator::FallbackChain).

use async_trait::async_trait;

use forge_types::DeveloperStyle;

use crate::context::Insights;
use crate::generator::{Generator, GeneratorError};
use crate::spec::GenerationSpec;

/// Tone used for per-technology guidance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Tone {
    Creative,
    Professional,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct TemplateGenerator;

impl TemplateGenerator {
    pub const NAME: &'static str = "template";

    pub fn new() -> Self {
        Self
    }

    /// Render the ruleset for `spec`. Cannot fail.
    pub fn render(&self, spec: &GenerationSpec) -> String {
        match spec.style {
            DeveloperStyle::VibeCoder => vibe_coder(spec),
            DeveloperStyle::ExperiencedDev => experienced_dev(spec),
        }
    }
}

#[async_trait]
impl Generator for TemplateGenerator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn produce(&self, spec: &GenerationSpec) -> Result<String, GeneratorError> {
        Ok(self.render(spec))
    }
}

fn vibe_coder(spec: &GenerationSpec) -> String {
    let tone = Tone::Creative;
    let mut sections = overview("🎨 Vibe Coder Rules", spec);
    sections.push(
        "## Coding Philosophy\n\
         - **Creativity First**: Experiment with new approaches and don't be afraid to try unconventional solutions\n\
         - **Fun & Flow**: Keep coding enjoyable and maintain a good development flow\n\
         - **Rapid Prototyping**: Build quickly, iterate often, and refine as you go\n\
         - **Learn by Doing**: Embrace learning through experimentation and hands-on experience"
            .to_string(),
    );
    sections.push(
        "## Code Style Guidelines\n\
         - Write expressive, readable code that tells a story\n\
         - Use meaningful variable and function names that reflect their purpose\n\
         - Comment your creative solutions and explain the \"why\" behind unusual approaches\n\
         - Keep functions focused but don't over-engineer early iterations"
            .to_string(),
    );
    sections.push(
        "## Development Practices\n\
         - Start with working code, then refactor for elegance\n\
         - Use version control to experiment fearlessly with branches\n\
         - Document interesting discoveries and lessons learned\n\
         - Share cool findings with the team"
            .to_string(),
    );
    sections.push(tech_section(&spec.tech_stack, tone));
    sections.extend(community_section(&spec.insights, tone));
    sections.push(
        "## Quality Standards\n\
         - Code should work reliably, even if the approach is unconventional\n\
         - Test the happy path thoroughly, edge cases can be refined later\n\
         - Performance optimization comes after functionality is proven\n\
         - Security basics are non-negotiable, creativity doesn't compromise safety"
            .to_string(),
    );
    finish(sections, spec, "a creative, experimental development approach")
}

fn experienced_dev(spec: &GenerationSpec) -> String {
    let tone = Tone::Professional;
    let mut sections = overview("⚡ Professional Development Rules", spec);
    sections.push(
        "## Development Philosophy\n\
         - **Best Practices First**: Follow established patterns and industry standards\n\
         - **Maintainable Code**: Write code that your future self and teammates will thank you for\n\
         - **Comprehensive Testing**: Test-driven development with thorough coverage\n\
         - **Documentation**: Clear, comprehensive documentation for all components"
            .to_string(),
    );
    sections.push(
        "## Code Quality Standards\n\
         - Follow SOLID principles and established design patterns\n\
         - Implement comprehensive error handling and logging\n\
         - Use consistent naming conventions and code formatting\n\
         - Write self-documenting code with strategic comments"
            .to_string(),
    );
    sections.push(
        "## Architecture Guidelines\n\
         - Design for scalability and maintainability from the start\n\
         - Implement proper separation of concerns\n\
         - Use dependency injection and inversion of control\n\
         - Plan for configuration management and environment differences"
            .to_string(),
    );
    sections.push(
        "## Development Workflow\n\
         - Feature branch workflow with code reviews\n\
         - Continuous integration and automated testing\n\
         - Comprehensive documentation for all APIs and components\n\
         - Regular refactoring and technical debt management"
            .to_string(),
    );
    sections.push(tech_section(&spec.tech_stack, tone));
    sections.extend(community_section(&spec.insights, tone));
    sections.push(
        "## Security & Performance\n\
         - Implement security best practices from day one\n\
         - Performance monitoring and optimization strategies\n\
         - Proper input validation and sanitization\n\
         - Regular security audits and dependency updates"
            .to_string(),
    );
    sections.push(
        "## Testing Strategy\n\
         - Unit tests for all business logic\n\
         - Integration tests for critical workflows\n\
         - End-to-end tests for user journeys\n\
         - Performance and load testing for production readiness"
            .to_string(),
    );
    finish(sections, spec, "professional, enterprise-grade development")
}

fn overview(title: &str, spec: &GenerationSpec) -> Vec<String> {
    vec![
        format!("# {title} for {}", spec.project_name),
        format!("## Project Overview\n{}", spec.description),
        format!("## Tech Stack\n{}", spec.stack_list()),
    ]
}

fn finish(mut sections: Vec<String>, spec: &GenerationSpec, approach: &str) -> String {
    if let Some(requirements) = &spec.requirements {
        sections.push(format!("## Additional Requirements\n{requirements}"));
    }
    sections.push(format!("---\n*Generated for {approach}.*"));

    let mut out = sections
        .into_iter()
        .filter(|s| !s.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    out.push('\n');
    out
}

fn tech_section(stack: &[String], tone: Tone) -> String {
    let guidelines: Vec<String> = stack
        .iter()
        .filter_map(|tech| tech_guideline(tech, tone))
        .collect();
    if guidelines.is_empty() {
        return "## Tech-Specific Guidelines\n- Follow the idioms and official style guides of each technology in the stack".to_string();
    }
    format!("## Tech-Specific Guidelines\n{}", guidelines.join("\n\n"))
}

fn tech_guideline(tech: &str, tone: Tone) -> Option<String> {
    let bullets: [&str; 3] = match (tech.to_lowercase().as_str(), tone) {
        ("javascript" | "typescript", Tone::Creative) => [
            "Embrace modern ES6+ features and experiment with new APIs",
            "Use functional programming concepts when they make code more expressive",
            "Try different approaches to async handling (promises, async/await, observables)",
        ],
        ("javascript" | "typescript", Tone::Professional) => [
            "Use TypeScript for type safety and better developer experience",
            "Implement ESLint and Prettier for consistent code formatting",
            "Follow established patterns for error handling and async operations",
        ],
        ("react" | "vue.js" | "vue" | "angular", tone) => {
            return Some(format!("### {tech}\n{}", bullet_list(&frontend(tone))));
        }
        ("node.js" | "nodejs" | "express.js" | "express", Tone::Creative) => [
            "Experiment with different middleware patterns",
            "Try new npm packages and tools",
            "Use streams and events creatively for data processing",
        ],
        ("node.js" | "nodejs" | "express.js" | "express", Tone::Professional) => [
            "Implement proper error handling and logging",
            "Use established patterns for API design",
            "Follow security best practices for server-side code",
        ],
        ("python" | "django" | "flask", Tone::Creative) => [
            "Explore Python's rich ecosystem and libraries",
            "Use list comprehensions and generators creatively",
            "Experiment with decorators and context managers",
        ],
        ("python" | "django" | "flask", Tone::Professional) => [
            "Follow PEP 8 style guidelines strictly",
            "Implement comprehensive type hints",
            "Use virtual environments and dependency management",
        ],
        ("ruby" | "ruby on rails" | "rails", Tone::Creative) => [
            "Embrace Ruby's expressiveness and metaprogramming",
            "Experiment with blocks, procs, and lambdas",
            "Use Ruby's flexibility to create elegant solutions",
        ],
        ("ruby" | "ruby on rails" | "rails", Tone::Professional) => [
            "Follow Ruby style guides and best practices",
            "Implement proper testing with RSpec or Minitest",
            "Use Rails conventions and patterns consistently",
        ],
        ("go" | "golang", Tone::Creative) => [
            "Lean on goroutines and channels to explore concurrent designs",
            "Prototype small packages and let interfaces emerge from usage",
            "Try table-driven tests to iterate on edge cases quickly",
        ],
        ("go" | "golang", Tone::Professional) => [
            "Run gofmt and go vet in CI and treat lint failures as errors",
            "Return wrapped errors with context instead of panicking",
            "Propagate context.Context through every request path",
        ],
        ("postgresql" | "postgres" | "mysql" | "sqlite", Tone::Creative) => [
            "Sketch schemas early and evolve them with migrations",
            "Experiment with indexes and EXPLAIN to learn query plans",
            "Keep seed data handy for fast local iteration",
        ],
        ("postgresql" | "postgres" | "mysql" | "sqlite", Tone::Professional) => [
            "Version every schema change with reviewed migrations",
            "Use parameterized queries exclusively",
            "Index for known access patterns and monitor slow queries",
        ],
        ("docker" | "kubernetes", Tone::Creative) => [
            "Experiment with different containerization strategies",
            "Try multi-stage builds and optimization techniques",
            "Explore different orchestration patterns",
        ],
        ("docker" | "kubernetes", Tone::Professional) => [
            "Follow security best practices for containers",
            "Implement proper health checks and monitoring",
            "Use established patterns for CI/CD with containers",
        ],
        _ => return None,
    };
    Some(format!("### {}\n{}", heading(tech), bullet_list(&bullets)))
}

fn frontend(tone: Tone) -> [&'static str; 3] {
    match tone {
        Tone::Creative => [
            "Experiment with component composition patterns",
            "Try different state management approaches",
            "Use the latest features and hooks creatively",
        ],
        Tone::Professional => [
            "Follow component design patterns and best practices",
            "Implement proper state management architecture",
            "Use established testing patterns for components",
        ],
    }
}

/// Shared heading for technologies that get grouped guidance.
fn heading(tech: &str) -> String {
    match tech.to_lowercase().as_str() {
        "javascript" | "typescript" => "JavaScript/TypeScript".into(),
        "node.js" | "nodejs" | "express.js" | "express" => "Node.js".into(),
        "python" | "django" | "flask" => "Python".into(),
        "ruby" | "ruby on rails" | "rails" => "Ruby".into(),
        "go" | "golang" => "Go".into(),
        "postgresql" | "postgres" | "mysql" | "sqlite" => format!("{tech} (SQL)"),
        "docker" | "kubernetes" => "Docker/Kubernetes".into(),
        _ => tech.to_string(),
    }
}

fn bullet_list(items: &[&str]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// The community section, present only when there are best practices.
fn community_section(insights: &Insights, tone: Tone) -> Option<String> {
    if insights.best_practices.is_empty() {
        return None;
    }

    let mut parts = vec![
        "### 🌟 Community Best Practices\n*Enhanced with insights from the community rule archive*"
            .to_string(),
    ];

    let keywords: &[&str] = match tone {
        Tone::Creative => &["creative", "experiment", "flexible"],
        Tone::Professional => &["comprehensive", "enterprise", "professional"],
    };
    let practices: Vec<&str> = insights
        .best_practices
        .iter()
        .map(String::as_str)
        .filter(|p| {
            let lower = p.to_lowercase();
            keywords.iter().any(|k| lower.contains(k))
        })
        .take(5)
        .collect();
    if !practices.is_empty() {
        parts.push(bullet_list(&practices));
    }

    let tech_rules: Vec<String> = insights
        .tech_specific_rules
        .iter()
        .filter(|(_, rules)| !rules.is_empty())
        .map(|(tech, rules)| format!("**{tech}:**\n{}", first_three(rules)))
        .collect();
    if !tech_rules.is_empty() {
        parts.push(format!(
            "#### Technology-Specific Insights:\n{}",
            tech_rules.join("\n\n")
        ));
    }

    if tone == Tone::Professional && !insights.security_practices.is_empty() {
        parts.push(format!(
            "#### Security Insights:\n{}",
            first_three(&insights.security_practices)
        ));
    }

    if !insights.testing_strategies.is_empty() {
        parts.push(format!(
            "#### Testing Insights:\n{}",
            first_three(&insights.testing_strategies)
        ));
    }

    Some(parts.join("\n\n"))
}

fn first_three(items: &[String]) -> String {
    let items: Vec<&str> = items.iter().take(3).map(String::as_str).collect();
    bullet_list(&items)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(style: DeveloperStyle, stack: &[&str]) -> GenerationSpec {
        GenerationSpec {
            project_name: "Atlas".into(),
            description: "A mapping service".into(),
            tech_stack: stack.iter().map(|s| s.to_string()).collect(),
            style,
            requirements: None,
            insights: Insights::default(),
        }
    }

    #[test]
    fn vibe_coder_uses_creative_sections() {
        let out = TemplateGenerator.render(&spec(DeveloperStyle::VibeCoder, &["React", "Python"]));
        assert!(out.starts_with("# 🎨 Vibe Coder Rules for Atlas"));
        assert!(out.contains("## Coding Philosophy"));
        assert!(out.contains("### React\n- Experiment with component composition patterns"));
        assert!(out.contains("### Python\n- Explore Python's rich ecosystem and libraries"));
        assert!(out.contains("creative, experimental development approach"));
        assert!(!out.contains("## Additional Requirements"));
    }

    #[test]
    fn experienced_dev_uses_professional_sections() {
        let out =
            TemplateGenerator.render(&spec(DeveloperStyle::ExperiencedDev, &["Go", "PostgreSQL"]));
        assert!(out.starts_with("# ⚡ Professional Development Rules for Atlas"));
        assert!(out.contains("## Tech Stack\nGo, PostgreSQL"));
        assert!(out.contains("### Go\n- Run gofmt and go vet"));
        assert!(out.contains("### PostgreSQL (SQL)"));
        assert!(out.contains("## Testing Strategy"));
    }

    #[test]
    fn unknown_stack_gets_generic_guidance() {
        let out = TemplateGenerator.render(&spec(DeveloperStyle::VibeCoder, &["Zig"]));
        assert!(out.contains("## Tech-Specific Guidelines\n- Follow the idioms"));
    }

    #[test]
    fn requirements_are_appended() {
        let mut s = spec(DeveloperStyle::ExperiencedDev, &["Rust"]);
        s.requirements = Some("All endpoints must be idempotent.".into());
        let out = TemplateGenerator.render(&s);
        assert!(out.contains("## Additional Requirements\nAll endpoints must be idempotent."));
    }

    #[test]
    fn community_section_filters_by_tone() {
        let mut s = spec(DeveloperStyle::ExperiencedDev, &["React"]);
        s.insights.best_practices = vec![
            "Write comprehensive tests".into(),
            "Use version control effectively".into(),
        ];
        s.insights.security_practices = vec!["Validate all inputs".into()];
        s.insights
            .tech_specific_rules
            .insert("React".into(), vec!["Use hooks instead of class components".into()]);

        let out = TemplateGenerator.render(&s);
        assert!(out.contains("### 🌟 Community Best Practices"));
        assert!(out.contains("- Write comprehensive tests"));
        assert!(!out.contains("- Use version control effectively"));
        assert!(out.contains("**React:**\n- Use hooks instead of class components"));
        assert!(out.contains("#### Security Insights:\n- Validate all inputs"));

        s.style = DeveloperStyle::VibeCoder;
        let creative = TemplateGenerator.render(&s);
        assert!(!creative.contains("#### Security Insights"));
    }

    #[test]
    fn no_best_practices_means_no_community_section() {
        let mut s = spec(DeveloperStyle::VibeCoder, &["React"]);
        s.insights.testing_strategies = vec!["End-to-end testing".into()];
        let out = TemplateGenerator.render(&s);
        assert!(!out.contains("Community Best Practices"));
    }

    #[test]
    fn rendering_is_deterministic_and_never_collapses() {
        let s = spec(DeveloperStyle::ExperiencedDev, &["TypeScript", "Docker"]);
        let first = TemplateGenerator.render(&s);
        assert_eq!(first, TemplateGenerator.render(&s));
        assert!(!first.contains("\n\n\n"));
    }

    #[tokio::test]
    async fn produce_never_fails() {
        let s = spec(DeveloperStyle::VibeCoder, &[]);
        let out = TemplateGenerator.produce(&s).await.unwrap();
        assert!(!out.trim().is_empty());
    }
}
