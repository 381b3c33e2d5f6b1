use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use forge_chain::{ArtifactVersion, VersionChain};
use forge_ledger::CreditLedger;
use forge_types::{AccountId, LineageKey, Project};

use crate::config::GenerationConfig;
use crate::context::{ContextError, ContextProvider, Insights};
use crate::error::GenerationError;
use crate::generator::{FallbackChain, Generator};
use crate::spec::GenerationSpec;
use crate::stage::{GenerationStage, StageRecord};

/// Credits charged for one committed generation.
pub const GENERATION_COST: i64 = 1;

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// A committed generation.
#[derive(Clone, Debug, Serialize)]
pub struct GenerationOutcome {
    pub version: ArtifactVersion,
    pub word_count: usize,
    pub byte_count: usize,
    pub tags: Vec<String>,
    /// Balance after the debit for this version.
    pub remaining_balance: i64,
    /// Name of the generator whose content was committed.
    pub generator: String,
    /// Whether community insights were folded into the request.
    pub community_enhanced: bool,
    /// Why earlier generators in the fallback chain were skipped.
    pub reasons: Vec<String>,
    pub stages: Vec<StageRecord>,
}

/// A generation that committed nothing and charged nothing.
#[derive(Debug, thiserror::Error)]
#[error("generation failed at {stage}: {error}")]
pub struct GenerationFailure {
    #[source]
    pub error: GenerationError,
    /// The stage that did not complete.
    pub stage: GenerationStage,
    pub reasons: Vec<String>,
    /// The requester's balance after the failure, when it could be read.
    pub remaining_balance: Option<i64>,
    /// Stages completed before the failure, followed by a `Failed` record.
    pub stages: Vec<StageRecord>,
}

impl GenerationFailure {
    pub fn kind(&self) -> &'static str {
        self.error.kind()
    }
}

// ---------------------------------------------------------------------------
// Progress tracking
// ---------------------------------------------------------------------------

struct Progress {
    started: Instant,
    last: Instant,
    stages: Vec<StageRecord>,
    reasons: Vec<String>,
}

impl Progress {
    fn start() -> Self {
        let now = Instant::now();
        Self {
            started: now,
            last: now,
            stages: vec![StageRecord::new(GenerationStage::Requested, Default::default())],
            reasons: Vec::new(),
        }
    }

    fn reached(&mut self, stage: GenerationStage, note: Option<String>) {
        let now = Instant::now();
        let mut record = StageRecord::new(stage, now - self.last);
        if let Some(note) = note {
            record = record.with_note(note);
        }
        self.stages.push(record);
        self.last = now;
    }

    fn failed(
        mut self,
        stage: GenerationStage,
        error: GenerationError,
        remaining_balance: Option<i64>,
    ) -> GenerationFailure {
        self.reached(GenerationStage::Failed, Some(error.kind().to_string()));
        warn!(
            stage = %stage,
            kind = error.kind(),
            error = %error,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "generation failed"
        );
        GenerationFailure {
            error,
            stage,
            reasons: self.reasons,
            remaining_balance,
            stages: self.stages,
        }
    }
}

// ---------------------------------------------------------------------------
// GenerationOrchestrator
// ---------------------------------------------------------------------------

/// Turns a project into a committed ruleset version, charging exactly
/// [`GENERATION_COST`] if and only if a version is committed.
pub struct GenerationOrchestrator {
    ledger: Arc<dyn CreditLedger>,
    chain: Arc<VersionChain>,
    generators: FallbackChain,
    context: Option<Arc<dyn ContextProvider>>,
    config: GenerationConfig,
}

impl GenerationOrchestrator {
    /// An orchestrator backed only by the template generator and no context.
    pub fn new(
        ledger: Arc<dyn CreditLedger>,
        chain: Arc<VersionChain>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            ledger,
            chain,
            generators: FallbackChain::template_only(),
            context: None,
            config,
        }
    }

    /// Try `primary` first, within the configured generator timeout.
    pub fn with_primary(mut self, primary: Arc<dyn Generator>) -> Self {
        self.generators = FallbackChain::new(primary, self.config.generator_timeout());
        self
    }

    pub fn with_context_provider(mut self, provider: Arc<dyn ContextProvider>) -> Self {
        self.context = Some(provider);
        self
    }

    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<dyn CreditLedger> {
        &self.ledger
    }

    pub fn chain(&self) -> &Arc<VersionChain> {
        &self.chain
    }

    /// Generate a ruleset for `project` on behalf of `requester`.
    ///
    /// Nothing is charged or committed unless the returned outcome is `Ok`.
    /// Dropping the future at any point has the same effect as a failure.
    pub async fn generate(
        &self,
        requester: &AccountId,
        project: &Project,
    ) -> Result<GenerationOutcome, GenerationFailure> {
        let mut progress = Progress::start();
        debug!(account = %requester, project = %project.id, "generation requested");

        if !project.is_owned_by(requester) {
            let error = GenerationError::NotOwner {
                account: *requester,
                project: project.id,
            };
            return Err(self.fail(progress, GenerationStage::Requested, error, requester));
        }
        let spec = match GenerationSpec::from_project(project) {
            Ok(spec) => spec,
            Err(error) => {
                return Err(self.fail(progress, GenerationStage::Requested, error, requester))
            }
        };

        match self.ledger.can_spend(requester, GENERATION_COST) {
            Ok(true) => {}
            Ok(false) => {
                let balance = self.ledger.balance_of(requester).unwrap_or_default();
                let error = GenerationError::InsufficientCredits {
                    balance,
                    required: GENERATION_COST,
                };
                return Err(self.fail(progress, GenerationStage::BalanceChecked, error, requester));
            }
            Err(err) => {
                return Err(self.fail(
                    progress,
                    GenerationStage::BalanceChecked,
                    err.into(),
                    requester,
                ))
            }
        }
        progress.reached(GenerationStage::BalanceChecked, None);

        let (insights, note) = self.gather_context(&spec).await;
        let community_enhanced = !insights.is_empty();
        progress.reached(GenerationStage::ContextGathered, note);
        let spec = spec.with_insights(insights);

        let generated = self.generators.run(&spec).await;
        progress.reasons = generated.reasons.clone();
        progress.reached(
            GenerationStage::Generated,
            Some(format!("generator {}", generated.generator)),
        );

        let (version, remaining_balance) =
            match self.commit(requester, project, &generated.content).await {
                Ok(committed) => committed,
                Err(error) => {
                    return Err(self.fail(progress, GenerationStage::Committed, error, requester))
                }
            };
        progress.reached(GenerationStage::Committed, None);

        info!(
            account = %requester,
            version = %version.id,
            number = version.version_number,
            generator = %generated.generator,
            fallback = generated.used_fallback(),
            community_enhanced,
            balance = remaining_balance,
            elapsed_ms = progress.started.elapsed().as_millis() as u64,
            "generation committed"
        );

        Ok(GenerationOutcome {
            word_count: version.word_count(),
            byte_count: version.byte_count(),
            tags: version.tags.clone(),
            version,
            remaining_balance,
            generator: generated.generator,
            community_enhanced,
            reasons: progress.reasons,
            stages: progress.stages,
        })
    }

    /// Fetch community insights. Failures and timeouts degrade to empty
    /// insights with an explanatory note.
    async fn gather_context(&self, spec: &GenerationSpec) -> (Insights, Option<String>) {
        let Some(provider) = &self.context else {
            return (Insights::default(), Some("no context provider".into()));
        };
        if self.config.context_limit == 0 {
            return (Insights::default(), Some("context disabled".into()));
        }

        let timeout = self.config.context_timeout();
        let fetched = tokio::time::timeout(
            timeout,
            provider.fetch_insights(&spec.tech_stack, self.config.context_limit),
        )
        .await
        .unwrap_or(Err(ContextError::Timeout {
            after_ms: timeout.as_millis() as u64,
        }));

        match fetched {
            Ok(insights) => {
                let insights = insights.normalized();
                debug!(
                    provider = provider.name(),
                    best_practices = insights.best_practices.len(),
                    "community context gathered"
                );
                (insights, None)
            }
            Err(err) => {
                warn!(provider = provider.name(), kind = err.kind(), error = %err, "community context unavailable");
                (Insights::default(), Some(format!("{}: {err}", provider.name())))
            }
        }
    }

    /// Prepare the next version under the lineage lock, debit it, publish.
    ///
    /// There is no await point between preparing and publishing, so the
    /// debit and the publish happen together or not at all.
    async fn commit(
        &self,
        requester: &AccountId,
        project: &Project,
        content: &str,
    ) -> Result<(ArtifactVersion, i64), GenerationError> {
        let guard = self
            .chain
            .lock_lineage(LineageKey::for_project(*requester, project.id))
            .await?;
        let prepared = match guard.latest()? {
            Some(tip) => guard.prepare_next(requester, &tip.id, content, Some(project))?,
            None => guard.prepare_root(requester, Some(project), content)?,
        };

        let debit = self
            .ledger
            .debit_usage(requester, GENERATION_COST, prepared.id())?;
        let version = prepared.publish();
        Ok((version, debit.balance_after))
    }

    fn fail(
        &self,
        progress: Progress,
        stage: GenerationStage,
        error: GenerationError,
        requester: &AccountId,
    ) -> GenerationFailure {
        let balance = self.ledger.balance_of(requester).ok();
        progress.failed(stage, error, balance)
    }
}
