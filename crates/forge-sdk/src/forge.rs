use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use forge_chain::{ArtifactVersion, ChainAuditor, LineageReport, VersionChain, Visibility};
use forge_generate::{ArchiveContextProvider, ContextProvider, GenerationOrchestrator, Generator};
use forge_ledger::{
    CreditSummary, InMemoryLedger, LedgerEntry, LedgerReader, LedgerWriter, ProjectionBuilder,
    ReplayEngine, ReplayResult, StreamValidator, ValidationReport,
};
use forge_types::{
    Account, AccountId, LineageKey, NewProject, Project, ProjectId, ProjectUpdate, Role, VersionId,
};

use crate::access::{AccessPolicy, Action, ProjectRegistry};
use crate::config::ForgeConfig;
use crate::error::{SdkError, SdkResult};
use crate::response::{FailureResponse, GenerationResponse};
use crate::snapshot::{Snapshot, SNAPSHOT_FORMAT};

/// Replay and validation results for one account.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    pub replay: ReplayResult,
    pub report: ValidationReport,
}

impl Reconciliation {
    pub fn is_clean(&self) -> bool {
        self.report.is_valid() && self.replay.balance == self.report.cached_balance
    }
}

/// High-level Ruleforge API.
pub struct Forge {
    config: ForgeConfig,
    ledger: Arc<InMemoryLedger>,
    chain: Arc<VersionChain>,
    projects: Arc<ProjectRegistry>,
    access: AccessPolicy,
    orchestrator: GenerationOrchestrator,
    next_account: AtomicU64,
}

impl Default for Forge {
    fn default() -> Self {
        Self::new(ForgeConfig::default())
    }
}

impl Forge {
    pub fn new(config: ForgeConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new(config.initial_credits));
        let chain = Arc::new(VersionChain::new());
        let projects = Arc::new(ProjectRegistry::new());
        let access = AccessPolicy::new(projects.clone(), chain.clone());
        let orchestrator =
            GenerationOrchestrator::new(ledger.clone(), chain.clone(), config.generation.clone());
        Self {
            config,
            ledger,
            chain,
            projects,
            access,
            orchestrator,
            next_account: AtomicU64::new(1),
        }
    }

    /// Try `generator` before the built-in template.
    pub fn with_generator(self, generator: Arc<dyn Generator>) -> Self {
        Self {
            orchestrator: self.orchestrator.with_primary(generator),
            ..self
        }
    }

    pub fn with_context_provider(self, provider: Arc<dyn ContextProvider>) -> Self {
        Self {
            orchestrator: self.orchestrator.with_context_provider(provider),
            ..self
        }
    }

    /// Attach the community archive named by `community_archive`, if any.
    pub fn with_configured_context(self) -> SdkResult<Self> {
        let Some(path) = self.config.community_archive.clone() else {
            return Ok(self);
        };
        let archive = ArchiveContextProvider::from_json(&std::fs::read_to_string(&path)?)?;
        debug!(path = %path.display(), rulesets = archive.len(), "community archive loaded");
        Ok(self.with_context_provider(Arc::new(archive)))
    }

    pub fn config(&self) -> &ForgeConfig {
        &self.config
    }

    // ---- Accounts and credits ----

    /// Register an account and grant it the configured opening credits.
    ///
    /// Emails are unique ignoring case; a rejected email still consumes an id.
    pub fn create_account(&self, email: &str, role: Role) -> SdkResult<Account> {
        let email = email.trim();
        let id = AccountId::new(self.next_account.fetch_add(1, Ordering::SeqCst));
        let account = Account::new(id, email, role);
        self.ledger.register(&account)?;
        if self.config.initial_credits > 0 {
            self.ledger.grant_initial(&id)?;
        }
        info!(account = %id, role = %role, "account created");
        Ok(account)
    }

    pub fn account(&self, id: &AccountId) -> SdkResult<Account> {
        Ok(self.ledger.account(id)?)
    }

    pub fn accounts(&self) -> SdkResult<Vec<Account>> {
        let mut ids = self.ledger.accounts()?;
        ids.sort();
        ids.iter()
            .map(|id| self.ledger.account(id).map_err(SdkError::from))
            .collect()
    }

    pub fn grant(
        &self,
        admin: &AccountId,
        account: &AccountId,
        amount: i64,
    ) -> SdkResult<LedgerEntry> {
        Ok(self.ledger.grant_admin(account, amount, admin)?)
    }

    pub fn balance(&self, account: &AccountId) -> SdkResult<i64> {
        Ok(self.ledger.balance_of(account)?)
    }

    pub fn credit_summary(&self, account: &AccountId, recent: usize) -> SdkResult<CreditSummary> {
        Ok(ProjectionBuilder::credit_summary(
            self.ledger.as_ref(),
            account,
            recent,
        )?)
    }

    /// Replay the account's entries and validate the stream.
    pub fn reconcile(&self, account: &AccountId) -> SdkResult<Reconciliation> {
        Ok(Reconciliation {
            replay: ReplayEngine::replay(self.ledger.as_ref(), account)?,
            report: StreamValidator::validate_account(self.ledger.as_ref(), account)?,
        })
    }

    // ---- Projects ----

    pub fn create_project(&self, owner: &AccountId, new: NewProject) -> SdkResult<Project> {
        self.ledger.account(owner)?;
        Ok(self.projects.create(owner, new)?)
    }

    pub fn update_project(
        &self,
        account: &AccountId,
        id: &ProjectId,
        update: ProjectUpdate,
    ) -> SdkResult<Project> {
        Ok(self.projects.update(account, id, update)?)
    }

    pub fn project(&self, account: &AccountId, id: &ProjectId) -> SdkResult<Project> {
        self.access.authorize(account, &Action::ReadProject(*id))?;
        Ok(self.projects.get(id)?)
    }

    pub fn projects(&self, owner: &AccountId) -> SdkResult<Vec<Project>> {
        Ok(self.projects.list_by_owner(owner)?)
    }

    // ---- Generation and versions ----

    /// Generate a ruleset for the project, charging one credit on success.
    pub async fn generate(
        &self,
        account: &AccountId,
        project: &ProjectId,
    ) -> Result<GenerationResponse, FailureResponse> {
        let project = match self.projects.get(project) {
            Ok(project) => project,
            Err(err) => return Err(self.failure(account, err.into())),
        };
        self.orchestrator
            .generate(account, &project)
            .await
            .map(GenerationResponse::from)
            .map_err(FailureResponse::from)
    }

    /// Record an edited ruleset derived from `from`. Edits are free.
    pub async fn edit(
        &self,
        account: &AccountId,
        from: &VersionId,
        content: &str,
    ) -> SdkResult<ArtifactVersion> {
        self.access.authorize(account, &Action::MutateVersion(*from))?;
        let project = self.project_of(&self.chain.get(from)?)?;
        Ok(self
            .chain
            .create_next(account, from, content, project.as_ref())
            .await?)
    }

    /// Commit a copy of `from` with the given visibility. Versions never
    /// change, so sharing or unsharing always creates a new version.
    pub async fn share(
        &self,
        account: &AccountId,
        from: &VersionId,
        visibility: Visibility,
    ) -> SdkResult<ArtifactVersion> {
        self.access.authorize(account, &Action::MutateVersion(*from))?;
        let source = self.chain.get(from)?;
        let project = self.project_of(&source)?;
        let version = self
            .chain
            .create_next_with(
                account,
                from,
                &source.content,
                project.as_ref(),
                Some(visibility),
            )
            .await?;
        info!(account = %account, version = %version.id, %visibility, "visibility changed");
        Ok(version)
    }

    /// Commit a copy of version `target` as the project's newest version.
    pub async fn revert(
        &self,
        account: &AccountId,
        project: &ProjectId,
        target: u32,
    ) -> SdkResult<ArtifactVersion> {
        self.access.authorize(account, &Action::MutateProject(*project))?;
        let project = self.projects.get(project)?;
        let key = LineageKey::for_project(*account, project.id);
        Ok(self.chain.revert(account, key, target, Some(&project)).await?)
    }

    pub fn show(&self, account: &AccountId, version: &VersionId) -> SdkResult<ArtifactVersion> {
        self.access.authorize(account, &Action::ReadVersion(*version))?;
        Ok(self.chain.get(version)?)
    }

    /// A public version by uuid. No account is needed; private and unknown
    /// uuids are indistinguishable.
    pub fn show_public(&self, uuid: &Uuid) -> SdkResult<ArtifactVersion> {
        Ok(self.chain.get_public(uuid)?)
    }

    /// Every version the account created, across its projects, newest first.
    pub fn rulesets(&self, account: &AccountId) -> SdkResult<Vec<ArtifactVersion>> {
        self.ledger.account(account)?;
        Ok(self.chain.by_owner(account)?)
    }

    /// The version and its ancestors, root first.
    pub fn history(
        &self,
        account: &AccountId,
        version: &VersionId,
    ) -> SdkResult<Vec<ArtifactVersion>> {
        self.access.authorize(account, &Action::ReadVersion(*version))?;
        Ok(self.chain.history(version)?)
    }

    pub fn latest(
        &self,
        account: &AccountId,
        project: &ProjectId,
    ) -> SdkResult<Option<ArtifactVersion>> {
        let key = self.project_lineage(account, project)?;
        Ok(self.chain.latest(&key)?)
    }

    /// Every version of the project, oldest first.
    pub fn versions(
        &self,
        account: &AccountId,
        project: &ProjectId,
    ) -> SdkResult<Vec<ArtifactVersion>> {
        let key = self.project_lineage(account, project)?;
        Ok(self.chain.lineage(&key)?)
    }

    pub fn audit(&self) -> SdkResult<Vec<LineageReport>> {
        Ok(ChainAuditor::audit_all(&self.chain)?)
    }

    // ---- Persistence ----

    pub fn export(&self) -> SdkResult<Snapshot> {
        let accounts = self.accounts()?;
        let mut entries = Vec::new();
        for account in &accounts {
            entries.extend(self.ledger.entries(&account.id)?);
        }
        entries.sort_by_key(|e| e.id);

        Ok(Snapshot {
            format: SNAPSHOT_FORMAT,
            exported_at: Utc::now(),
            accounts,
            entries,
            projects: self.projects.all()?,
            versions: self.chain.versions()?,
        })
    }

    /// Rebuild a forge from a snapshot. Balances are replayed from entries.
    pub fn import(config: ForgeConfig, snapshot: Snapshot) -> SdkResult<Self> {
        let forge = Self::new(config);

        if let Some(orphan) = snapshot
            .entries
            .iter()
            .find(|e| !snapshot.accounts.iter().any(|a| a.id == e.account))
        {
            return Err(SdkError::Snapshot(format!(
                "{} belongs to unknown {}",
                orphan.id, orphan.account
            )));
        }
        if let Some(orphan) = snapshot
            .projects
            .iter()
            .find(|p| !snapshot.accounts.iter().any(|a| a.id == p.owner))
        {
            return Err(SdkError::Snapshot(format!(
                "{} is owned by unknown {}",
                orphan.id, orphan.owner
            )));
        }

        for account in &snapshot.accounts {
            let balance = forge
                .ledger
                .restore(account.clone(), snapshot.entries_for(account))?;
            forge
                .next_account
                .fetch_max(account.id.get() + 1, Ordering::SeqCst);
            if balance < 0 && !account.is_admin() {
                warn!(account = %account.id, balance, "restored member balance is negative");
            }
        }
        forge.projects.restore(snapshot.projects)?;
        let versions = forge.chain.restore(snapshot.versions)?;

        info!(
            accounts = snapshot.accounts.len(),
            versions,
            "forge imported"
        );
        Ok(forge)
    }

    // ---- Helpers ----

    fn project_of(&self, version: &ArtifactVersion) -> SdkResult<Option<Project>> {
        Ok(version
            .project_id
            .map(|id| self.projects.get(&id))
            .transpose()?)
    }

    fn project_lineage(&self, account: &AccountId, project: &ProjectId) -> SdkResult<LineageKey> {
        self.access.authorize(account, &Action::ReadProject(*project))?;
        Ok(LineageKey::for_project(*account, *project))
    }

    fn failure(&self, account: &AccountId, error: SdkError) -> FailureResponse {
        FailureResponse::from_error(&error, self.ledger.balance_of(account).ok())
    }
}
