//! Community context: insights drawn from published rulesets.
//!
//! A [`ContextProvider`] is a read-only, best-effort source of [`Insights`].
//! The orchestrator gives it its own timeout and treats any failure as empty
//! context.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_INSIGHTS: usize = 10;
const MAX_TECH_RULES: usize = 5;
const PER_TECHNOLOGY: usize = 2;

/// Errors from a context provider. Never fatal to generation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    #[error("context provider unavailable: {0}")]
    Unavailable(String),

    #[error("context provider rejected credentials")]
    Unauthorized,

    #[error("context provider rate limit exceeded")]
    RateLimited,

    #[error("context lookup timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("malformed context response: {0}")]
    Malformed(String),
}

impl ContextError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "context_unavailable",
            Self::Unauthorized => "context_unauthorized",
            Self::RateLimited => "context_rate_limited",
            Self::Timeout { .. } => "context_timeout",
            Self::Malformed(_) => "context_malformed",
        }
    }
}

/// Read-only source of community insights for a technology stack.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    fn name(&self) -> &str {
        "context"
    }

    /// Insights drawn from at most `limit` rulesets relevant to `stack`.
    async fn fetch_insights(&self, stack: &[String], limit: usize)
        -> Result<Insights, ContextError>;
}

/// A published community ruleset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityRuleset {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// Structured guidance extracted from community rulesets.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Insights {
    pub common_patterns: Vec<String>,
    pub best_practices: Vec<String>,
    /// Technology name (as published) -> rules.
    pub tech_specific_rules: BTreeMap<String, Vec<String>>,
    pub security_practices: Vec<String>,
    pub testing_strategies: Vec<String>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.common_patterns.is_empty()
            && self.best_practices.is_empty()
            && self.security_practices.is_empty()
            && self.testing_strategies.is_empty()
            && self.tech_specific_rules.values().all(Vec::is_empty)
    }

    /// Deduplicate every list, keeping first occurrences, and cap list
    /// lengths (10 per list, 5 per technology).
    pub fn normalize(&mut self) {
        dedup_capped(&mut self.common_patterns, MAX_INSIGHTS);
        dedup_capped(&mut self.best_practices, MAX_INSIGHTS);
        dedup_capped(&mut self.security_practices, MAX_INSIGHTS);
        dedup_capped(&mut self.testing_strategies, MAX_INSIGHTS);
        for rules in self.tech_specific_rules.values_mut() {
            dedup_capped(rules, MAX_TECH_RULES);
        }
        self.tech_specific_rules.retain(|_, rules| !rules.is_empty());
    }

    pub fn normalized(mut self) -> Self {
        self.normalize();
        self
    }

    /// Scan ruleset content for recognizable practices.
    pub fn extract<'a, I>(rulesets: I) -> Self
    where
        I: IntoIterator<Item = &'a CommunityRuleset>,
    {
        let mut insights = Self::default();
        for ruleset in rulesets {
            let text = Text::new(&ruleset.content);
            insights.common_patterns.extend(patterns(&text));
            insights.best_practices.extend(best_practices(&text));
            for tech in &ruleset.technologies {
                insights
                    .tech_specific_rules
                    .entry(tech.clone())
                    .or_default()
                    .extend(tech_rules(&text, tech));
            }
            insights.security_practices.extend(security_practices(&text));
            insights.testing_strategies.extend(testing_strategies(&text));
        }
        insights.normalized()
    }
}

fn dedup_capped(list: &mut Vec<String>, cap: usize) {
    let mut seen = HashSet::new();
    list.retain(|item| seen.insert(item.clone()));
    list.truncate(cap);
}

/// Lowercased content with loose phrase matching.
struct Text(String);

impl Text {
    fn new(content: &str) -> Self {
        Self(content.to_lowercase())
    }

    fn has(&self, needle: &str) -> bool {
        self.0.contains(needle)
    }

    /// `left` and `right` adjacent or separated by exactly one character,
    /// so "type safety", "type-safety" and "typesafety" all match.
    fn joined(&self, left: &str, right: &str) -> bool {
        self.0.match_indices(left).any(|(at, _)| {
            let rest = &self.0[at + left.len()..];
            if rest.starts_with(right) {
                return true;
            }
            let mut chars = rest.chars();
            chars.next().is_some() && chars.as_str().starts_with(right)
        })
    }

    /// `word` immediately followed by whitespace.
    fn word_then_space(&self, word: &str) -> bool {
        self.0.match_indices(word).any(|(at, _)| {
            self.0[at + word.len()..]
                .chars()
                .next()
                .is_some_and(char::is_whitespace)
        })
    }

    /// `first` somewhere before `second`.
    fn in_order(&self, first: &str, second: &str) -> bool {
        self.0
            .find(first)
            .is_some_and(|at| self.0[at + first.len()..].contains(second))
    }
}

fn collect(checks: &[(bool, &str)]) -> Vec<String> {
    checks
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, insight)| insight.to_string())
        .collect()
}

fn patterns(t: &Text) -> Vec<String> {
    collect(&[
        (t.has("typescript") || t.joined("type", "safety"), "Use TypeScript for type safety"),
        (t.joined("error", "boundar"), "Implement error boundaries"),
        (t.joined("functional", "component"), "Use functional components"),
        (t.joined("single", "responsibility"), "Follow single responsibility principle"),
        (t.joined("dependency", "injection"), "Use dependency injection"),
        (t.has("logging") || t.word_then_space("log"), "Implement proper logging"),
    ])
}

fn best_practices(t: &Text) -> Vec<String> {
    collect(&[
        (t.has("test"), "Write comprehensive tests"),
        (t.joined("naming", "convention"), "Use consistent naming conventions"),
        (t.joined("code", "review"), "Implement code reviews"),
        (t.joined("version", "control") || t.has("git"), "Use version control effectively"),
        (t.has("document"), "Document your code"),
        (t.has("security"), "Follow security best practices"),
    ])
}

fn tech_rules(t: &Text, technology: &str) -> Vec<String> {
    match technology.to_lowercase().as_str() {
        "react" => collect(&[
            (t.has("hook"), "Use hooks instead of class components"),
            (t.joined("state", "management"), "Implement proper state management"),
            (t.has("memo"), "Use React.memo for performance"),
        ]),
        "python" => collect(&[
            (t.joined("pep", "8"), "Follow PEP 8 style guide"),
            (t.joined("type", "hint"), "Use type hints"),
            (t.joined("virtual", "env") || t.has("venv"), "Use virtual environments"),
        ]),
        "javascript" | "typescript" => collect(&[
            (t.has("es6") || t.joined("modern", "javascript"), "Use modern ES6+ syntax"),
            (
                t.has("async") || t.has("await") || t.has("promise"),
                "Implement proper async handling",
            ),
            (t.joined("strict", "mode"), "Use strict mode"),
        ]),
        "docker" => collect(&[
            (t.joined("multi", "stage"), "Use multi-stage builds"),
            (t.joined("image", "size") || t.has("minimize"), "Minimize image size"),
            (t.joined("specific", "tag") || t.has("latest"), "Use specific tags"),
        ]),
        _ => Vec::new(),
    }
}

fn security_practices(t: &Text) -> Vec<String> {
    collect(&[
        (
            t.joined("input", "validation") || t.joined("validate", "input"),
            "Validate all inputs",
        ),
        (t.has("https"), "Use HTTPS everywhere"),
        (t.has("auth"), "Implement proper authentication"),
        (t.has("sanitiz"), "Sanitize user data"),
        (
            t.joined("environment", "variable") || t.in_order("env", "secret"),
            "Use environment variables for secrets",
        ),
        (t.joined("security", "audit"), "Regular security audits"),
    ])
}

fn testing_strategies(t: &Text) -> Vec<String> {
    let end_to_end = t.has("e2e")
        || ["end-to-end", "end to end", "endtoend", "end_to_end"]
            .iter()
            .any(|p| t.has(p));
    collect(&[
        (t.joined("unit", "test"), "Unit testing for business logic"),
        (t.joined("integration", "test"), "Integration testing for APIs"),
        (end_to_end, "End-to-end testing"),
        (t.has("tdd") || t.joined("test", "driven"), "Test-driven development"),
        (t.has("mock"), "Mock external dependencies"),
        (t.joined("performance", "test"), "Performance testing"),
    ])
}

/// An in-process community archive.
///
/// For each declared technology it picks up to two matching rulesets,
/// deduplicates them by id, and keeps the first `limit`.
#[derive(Clone, Debug, Default)]
pub struct ArchiveContextProvider {
    rulesets: Vec<CommunityRuleset>,
}

impl ArchiveContextProvider {
    pub fn new(rulesets: Vec<CommunityRuleset>) -> Self {
        Self { rulesets }
    }

    /// Parse an archive stored as a JSON array of rulesets.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        Ok(Self::new(serde_json::from_str(text)?))
    }

    pub fn len(&self) -> usize {
        self.rulesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rulesets.is_empty()
    }

    /// Rulesets relevant to `stack`, in stack order.
    pub fn relevant(&self, stack: &[String], limit: usize) -> Vec<&CommunityRuleset> {
        let mut seen = HashSet::new();
        let mut picked = Vec::new();
        for tech in stack {
            let matches = self
                .rulesets
                .iter()
                .filter(|r| r.technologies.iter().any(|t| t.eq_ignore_ascii_case(tech)))
                .take(PER_TECHNOLOGY);
            for ruleset in matches {
                if seen.insert(ruleset.id.as_str()) {
                    picked.push(ruleset);
                }
            }
        }
        picked.truncate(limit);
        picked
    }
}

#[async_trait]
impl ContextProvider for ArchiveContextProvider {
    fn name(&self) -> &str {
        "archive"
    }

    async fn fetch_insights(
        &self,
        stack: &[String],
        limit: usize,
    ) -> Result<Insights, ContextError> {
        let relevant = self.relevant(stack, limit);
        debug!(matched = relevant.len(), limit, "community rulesets selected");
        Ok(Insights::extract(relevant))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ruleset(id: &str, techs: &[&str], content: &str) -> CommunityRuleset {
        CommunityRuleset {
            id: id.into(),
            name: Some(format!("Ruleset {id}")),
            content: content.into(),
            technologies: techs.iter().map(|t| t.to_string()).collect(),
        }
    }

    #[test]
    fn extracts_known_practices() {
        let rs = ruleset(
            "1",
            &["React", "Docker"],
            "Use hooks and state-management. Unit tests required. \
             Validate input, use HTTPS, multi-stage builds, type safety, log every error.",
        );
        let insights = Insights::extract([&rs]);

        assert!(insights.common_patterns.contains(&"Use TypeScript for type safety".to_string()));
        assert!(insights.common_patterns.contains(&"Implement proper logging".to_string()));
        assert!(insights.best_practices.contains(&"Write comprehensive tests".to_string()));
        assert!(insights.security_practices.contains(&"Validate all inputs".to_string()));
        assert!(insights.security_practices.contains(&"Use HTTPS everywhere".to_string()));
        assert!(insights.testing_strategies.contains(&"Unit testing for business logic".to_string()));
        assert_eq!(
            insights.tech_specific_rules["React"],
            vec!["Use hooks instead of class components", "Implement proper state management"]
        );
        assert_eq!(insights.tech_specific_rules["Docker"], vec!["Use multi-stage builds"]);
    }

    #[test]
    fn unrelated_content_yields_empty_insights() {
        let rs = ruleset("1", &["Go"], "Keep handlers small.");
        let insights = Insights::extract([&rs]);
        assert!(insights.is_empty(), "{insights:?}");
        assert!(insights.tech_specific_rules.is_empty());
    }

    #[test]
    fn normalize_dedupes_and_caps() {
        let mut insights = Insights {
            best_practices: (0..15).map(|i| format!("p{}", i % 12)).collect(),
            ..Default::default()
        };
        insights
            .tech_specific_rules
            .insert("Rust".into(), (0..8).map(|i| format!("r{i}")).collect());
        insights.tech_specific_rules.insert("Go".into(), Vec::new());
        insights.normalize();

        assert_eq!(insights.best_practices.len(), 10);
        assert_eq!(insights.best_practices[0], "p0");
        assert_eq!(insights.tech_specific_rules["Rust"].len(), 5);
        assert!(!insights.tech_specific_rules.contains_key("Go"));
    }

    #[test]
    fn joined_allows_one_separator() {
        let t = Text::new("Type-Safety and code  review");
        assert!(t.joined("type", "safety"));
        assert!(!t.joined("code", "review"));
        assert!(Text::new("codereview").joined("code", "review"));
    }

    #[test]
    fn archive_picks_two_per_technology_and_respects_limit() {
        let archive = ArchiveContextProvider::new(vec![
            ruleset("a", &["react"], ""),
            ruleset("b", &["React", "Python"], ""),
            ruleset("c", &["react"], ""),
            ruleset("d", &["python"], ""),
        ]);
        let stack = vec!["React".to_string(), "Python".to_string()];

        let ids: Vec<&str> = archive
            .relevant(&stack, 5)
            .iter()
            .map(|r| r.id.as_str())
            .collect();
        assert_eq!(ids, vec!["a", "b", "d"]);
        assert_eq!(archive.relevant(&stack, 1).len(), 1);
    }

    #[tokio::test]
    async fn archive_provider_returns_insights() {
        let archive = ArchiveContextProvider::new(vec![ruleset(
            "a",
            &["python"],
            "Follow PEP 8. Write tests with mocks.",
        )]);
        let insights = archive
            .fetch_insights(&["Python".to_string()], 3)
            .await
            .unwrap();
        assert_eq!(insights.tech_specific_rules["python"], vec!["Follow PEP 8 style guide"]);
        assert!(insights.testing_strategies.contains(&"Mock external dependencies".to_string()));
    }

    #[test]
    fn archive_parses_from_json() {
        let archive = ArchiveContextProvider::from_json(
            r#"[{"id": "7", "content": "Use hooks", "technologies": ["React"]}, {"id": "8"}]"#,
        )
        .unwrap();
        assert_eq!(archive.len(), 2);
        assert_eq!(archive.relevant(&["react".to_string()], 5)[0].id, "7");
        assert!(ArchiveContextProvider::from_json("{}").is_err());
    }

    #[tokio::test]
    async fn empty_archive_yields_empty_insights() {
        let archive = ArchiveContextProvider::default();
        let insights = archive.fetch_insights(&["Go".to_string()], 5).await.unwrap();
        assert!(insights.is_empty());
    }
}
