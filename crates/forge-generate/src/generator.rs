//! The generator capability and the fallback chain around it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use forge_types::is_blank;

use crate::spec::GenerationSpec;
use crate::template::TemplateGenerator;

/// Why a generator produced no usable content.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GeneratorError {
    #[error("generator timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("remote generator failed: {0}")]
    Remote(String),

    #[error("generator returned malformed output: {0}")]
    Malformed(String),
}

impl GeneratorError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Timeout { .. } => "generator_timeout",
            Self::Remote(_) => "generator_remote",
            Self::Malformed(_) => "generator_malformed",
        }
    }
}

/// Produces ruleset text for a [`GenerationSpec`].
///
/// Implementations may call remote services. Callers bound every call with
/// a timeout, so implementations need not enforce one themselves.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Short name recorded on the generated version's outcome.
    fn name(&self) -> &str;

    async fn produce(&self, spec: &GenerationSpec) -> Result<String, GeneratorError>;
}

/// Content plus how it was obtained.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedContent {
    pub content: String,
    /// Name of the generator that produced `content`.
    pub generator: String,
    /// One entry per generator that failed before `generator` succeeded.
    pub reasons: Vec<String>,
}

impl GeneratedContent {
    pub fn used_fallback(&self) -> bool {
        !self.reasons.is_empty()
    }
}

/// Optional primary generator followed by the local template.
///
/// The primary runs under `timeout`; blank output counts as malformed.
/// Accepted primary output gets a metadata header. The template always
/// succeeds, so [`FallbackChain::run`] cannot fail.
#[derive(Clone)]
pub struct FallbackChain {
    primary: Option<Arc<dyn Generator>>,
    fallback: TemplateGenerator,
    timeout: Duration,
}

impl FallbackChain {
    /// A chain with only the template generator.
    pub fn template_only() -> Self {
        Self {
            primary: None,
            fallback: TemplateGenerator,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn new(primary: Arc<dyn Generator>, timeout: Duration) -> Self {
        Self {
            primary: Some(primary),
            fallback: TemplateGenerator,
            timeout,
        }
    }

    pub async fn run(&self, spec: &GenerationSpec) -> GeneratedContent {
        let mut reasons = Vec::new();

        if let Some(primary) = &self.primary {
            match self.try_primary(primary.as_ref(), spec).await {
                Ok(content) => {
                    info!(generator = primary.name(), "primary generator succeeded");
                    return GeneratedContent {
                        content,
                        generator: primary.name().to_string(),
                        reasons,
                    };
                }
                Err(err) => {
                    warn!(generator = primary.name(), kind = err.kind(), error = %err, "primary generator failed, using template");
                    reasons.push(format!("{}: {err}", primary.name()));
                }
            }
        }

        GeneratedContent {
            content: self.fallback.render(spec),
            generator: TemplateGenerator::NAME.to_string(),
            reasons,
        }
    }

    async fn try_primary(
        &self,
        primary: &dyn Generator,
        spec: &GenerationSpec,
    ) -> Result<String, GeneratorError> {
        let raw = tokio::time::timeout(self.timeout, primary.produce(spec))
            .await
            .map_err(|_| GeneratorError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            })??;
        if is_blank(&raw) {
            return Err(GeneratorError::Malformed("empty response".into()));
        }
        Ok(format_primary_output(spec, &raw))
    }
}

/// Prefix primary output with a metadata header and collapse runs of three
/// or more newlines.
pub fn format_primary_output(spec: &GenerationSpec, raw: &str) -> String {
    let description: String = spec.description.chars().take(100).collect();
    let ellipsis = if spec.description.chars().count() > 100 {
        "..."
    } else {
        ""
    };

    let formatted = format!(
        "# 🎯 Personalized Coding Ruleset\n\n\
         *Generated with AI assistance and community best practices*\n\n\
         **Project**: {description}{ellipsis}\n\
         **Developer Style**: {}\n\
         **Tech Stack**: {}\n\n\
         ---\n\n\
         {}",
        spec.style.label(),
        spec.stack_list(),
        raw.trim()
    );
    collapse_blank_lines(&formatted)
}

fn collapse_blank_lines(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut newlines = 0usize;
    for ch in text.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use forge_types::DeveloperStyle;

    use crate::context::Insights;

    use super::*;

    struct Fixed(&'static str);

    #[async_trait]
    impl Generator for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn produce(&self, _spec: &GenerationSpec) -> Result<String, GeneratorError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing(AtomicUsize);

    #[async_trait]
    impl Generator for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn produce(&self, _spec: &GenerationSpec) -> Result<String, GeneratorError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Err(GeneratorError::Remote("503 service unavailable".into()))
        }
    }

    struct Sleepy;

    #[async_trait]
    impl Generator for Sleepy {
        fn name(&self) -> &str {
            "sleepy"
        }

        async fn produce(&self, _spec: &GenerationSpec) -> Result<String, GeneratorError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok("too late".into())
        }
    }

    fn spec() -> GenerationSpec {
        GenerationSpec {
            project_name: "Atlas".into(),
            description: "sample".into(),
            tech_stack: vec!["Go".into(), "PostgreSQL".into()],
            style: DeveloperStyle::ExperiencedDev,
            requirements: None,
            insights: Insights::default(),
        }
    }

    #[tokio::test]
    async fn template_only_chain_uses_template() {
        let out = FallbackChain::template_only().run(&spec()).await;
        assert_eq!(out.generator, "template");
        assert!(!out.used_fallback());
        assert!(out.content.contains("Professional Development Rules"));
    }

    #[tokio::test]
    async fn primary_output_gets_header() {
        let chain = FallbackChain::new(Arc::new(Fixed("## Rules\n\n\n\n- Use golang")), Duration::from_secs(1));
        let out = chain.run(&spec()).await;
        assert_eq!(out.generator, "fixed");
        assert!(out.content.starts_with("# 🎯 Personalized Coding Ruleset"));
        assert!(out.content.contains("**Developer Style**: Experienced dev"));
        assert!(out.content.contains("**Tech Stack**: Go, PostgreSQL"));
        assert!(out.content.ends_with("## Rules\n\n- Use golang"));
        assert!(!out.content.contains("\n\n\n"));
    }

    #[tokio::test]
    async fn failing_primary_falls_back_with_reason() {
        let failing = Arc::new(Failing(AtomicUsize::new(0)));
        let chain = FallbackChain::new(failing.clone(), Duration::from_secs(1));
        let out = chain.run(&spec()).await;

        assert_eq!(failing.0.load(Ordering::SeqCst), 1);
        assert_eq!(out.generator, "template");
        assert_eq!(
            out.reasons,
            vec!["failing: remote generator failed: 503 service unavailable"]
        );
        assert!(!out.content.trim().is_empty());
    }

    #[tokio::test]
    async fn blank_primary_output_is_malformed() {
        let chain = FallbackChain::new(Arc::new(Fixed("  \n ")), Duration::from_secs(1));
        let out = chain.run(&spec()).await;
        assert_eq!(out.generator, "template");
        assert!(out.reasons[0].contains("malformed"));
    }

    #[tokio::test]
    async fn slow_primary_times_out() {
        let chain = FallbackChain::new(Arc::new(Sleepy), Duration::from_millis(20));
        let out = chain.run(&spec()).await;
        assert_eq!(out.generator, "template");
        assert!(out.reasons[0].contains("timed out after 20ms"));
    }

    #[test]
    fn long_descriptions_are_truncated_in_header() {
        let mut s = spec();
        s.description = "x".repeat(150);
        let out = format_primary_output(&s, "body");
        assert!(out.contains(&format!("**Project**: {}...", "x".repeat(100))));
    }

    #[test]
    fn collapse_keeps_single_blank_lines() {
        assert_eq!(collapse_blank_lines("a\n\nb\n\n\n\nc\nd"), "a\n\nb\n\nc\nd");
    }
}
