use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use colored::Colorize;
use fs2::FileExt;
use serde::Serialize;
use tracing::debug;

use forge_sdk::{
    ArtifactVersion, Forge, ForgeConfig, NewProject, Project, ProjectUpdate, Role, Snapshot,
    Visibility,
};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ForgeConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ForgeConfig::default(),
    };
    let json = cli.format == OutputFormat::Json;
    let writes = cli.command.writes_state();
    // Held until the state is saved, so concurrent runs never load the same
    // snapshot and overwrite each other's writes.
    let _lock = if writes || cli.state.exists() {
        Some(lock_state(&cli.state, writes).await?)
    } else {
        None
    };
    let forge = open(&cli.state, config)?;

    match cli.command {
        Command::Account(args) => cmd_account(&forge, args, json)?,
        Command::Grant(args) => cmd_grant(&forge, args, json)?,
        Command::Balance(args) => cmd_balance(&forge, args, json)?,
        Command::Credits(args) => cmd_credits(&forge, args, json)?,
        Command::Project(args) => cmd_project(&forge, args, json)?,
        Command::Generate(args) => cmd_generate(&forge, args, json).await?,
        Command::Edit(args) => cmd_edit(&forge, args, json).await?,
        Command::Revert(args) => cmd_revert(&forge, args, json).await?,
        Command::History(args) => cmd_history(&forge, args, json)?,
        Command::Show(args) => cmd_show(&forge, args, json)?,
        Command::Share(args) => cmd_share(&forge, args, json).await?,
        Command::Public(args) => cmd_public(&forge, args, json)?,
        Command::Rulesets(args) => cmd_rulesets(&forge, args, json)?,
        Command::Verify(_) => cmd_verify(&forge, json)?,
    }

    if writes {
        forge
            .export()?
            .save(&cli.state)
            .with_context(|| format!("saving state to {}", cli.state.display()))?;
        debug!(state = %cli.state.display(), "state saved");
    }
    Ok(())
}

impl Command {
    fn writes_state(&self) -> bool {
        match self {
            Self::Account(args) => matches!(args.action, AccountAction::Create { .. }),
            Self::Project(args) => matches!(
                args.action,
                ProjectAction::Create { .. } | ProjectAction::Update { .. }
            ),
            Self::Grant(_)
            | Self::Generate(_)
            | Self::Edit(_)
            | Self::Revert(_)
            | Self::Share(_) => true,
            Self::Balance(_)
            | Self::Credits(_)
            | Self::History(_)
            | Self::Show(_)
            | Self::Public(_)
            | Self::Rulesets(_)
            | Self::Verify(_) => false,
        }
    }
}

fn lock_path(state: &Path) -> PathBuf {
    let mut name = state.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Lock `<state>.lock`: exclusive for commands that save, shared otherwise.
/// Blocks until other runs on the same state file finish.
async fn lock_state(state: &Path, exclusive: bool) -> anyhow::Result<File> {
    let path = lock_path(state);
    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("opening state lock {}", path.display()))?;
    let locked = tokio::task::spawn_blocking(move || {
        let result = if exclusive {
            FileExt::lock_exclusive(&file)
        } else {
            FileExt::lock_shared(&file)
        };
        result.map(|()| file)
    })
    .await?
    .with_context(|| format!("locking state {}", path.display()))?;
    debug!(lock = %path.display(), exclusive, "state locked");
    Ok(locked)
}

fn open(state: &Path, config: ForgeConfig) -> anyhow::Result<Forge> {
    let forge = if state.exists() {
        let snapshot = Snapshot::load(state)
            .with_context(|| format!("reading state {}", state.display()))?;
        Forge::import(config, snapshot)?
    } else {
        Forge::new(config)
    };
    Ok(forge
        .with_configured_context()
        .context("loading community archive")?)
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_account(forge: &Forge, args: AccountArgs, json: bool) -> anyhow::Result<()> {
    match args.action {
        AccountAction::Create { email, admin } => {
            let role = if admin { Role::Admin } else { Role::Member };
            let account = forge.create_account(&email, role)?;
            if json {
                return print_json(&account);
            }
            let balance = forge.balance(&account.id)?;
            println!(
                "{} Created {} {} ({})",
                "✓".green().bold(),
                account.id.to_string().yellow(),
                account.email.bold(),
                account.role
            );
            println!("  Balance: {}", balance.to_string().green());
        }
        AccountAction::List => {
            let accounts = forge.accounts()?;
            if json {
                return print_json(&accounts);
            }
            if accounts.is_empty() {
                println!("No accounts.");
            }
            for account in accounts {
                let balance = forge.balance(&account.id)?;
                println!(
                    "{}  {}  {}  {}",
                    account.id.to_string().yellow(),
                    account.email,
                    account.role.to_string().dimmed(),
                    balance
                );
            }
        }
    }
    Ok(())
}

fn cmd_grant(forge: &Forge, args: GrantArgs, json: bool) -> anyhow::Result<()> {
    let entry = forge.grant(&args.actor, &args.account, args.amount)?;
    if json {
        return print_json(&entry);
    }
    println!(
        "{} Granted {} credits to {}",
        "✓".green().bold(),
        entry.formatted_amount().green(),
        args.account.to_string().yellow()
    );
    println!("  Balance: {}", forge.balance(&args.account)?);
    Ok(())
}

fn cmd_balance(forge: &Forge, args: BalanceArgs, json: bool) -> anyhow::Result<()> {
    let balance = forge.balance(&args.account)?;
    if json {
        return print_json(&serde_json::json!({ "account": args.account, "balance": balance }));
    }
    println!("{} {}", args.account.to_string().yellow(), balance.to_string().bold());
    Ok(())
}

fn cmd_credits(forge: &Forge, args: CreditsArgs, json: bool) -> anyhow::Result<()> {
    let summary = forge.credit_summary(&args.account, args.limit)?;
    if json {
        return print_json(&summary);
    }
    println!("Credits for {}", args.account.to_string().yellow().bold());
    println!("  Balance: {}", summary.current_balance.to_string().bold());
    println!("  Granted: {}", summary.total_granted.to_string().green());
    println!("  Used: {}", summary.total_used.to_string().red());
    for entry in &summary.recent_entries {
        let amount = if entry.amount >= 0 {
            entry.formatted_amount().green()
        } else {
            entry.formatted_amount().red()
        };
        println!(
            "  {} {:>4}  {}  {}",
            entry.id.to_string().dimmed(),
            amount,
            entry.kind,
            entry.description
        );
    }
    Ok(())
}

fn cmd_project(forge: &Forge, args: ProjectArgs, json: bool) -> anyhow::Result<()> {
    match args.action {
        ProjectAction::Create {
            actor,
            name,
            description,
            stack,
            style,
            requirements,
        } => {
            let new = NewProject {
                name,
                description,
                tech_stack: stack,
                developer_style: style,
                requirements,
            };
            let project = forge.create_project(&actor, new)?;
            if json {
                return print_json(&project);
            }
            println!("{} Created project {}", "✓".green().bold(), project.id.to_string().yellow());
            print_project(&project);
        }
        ProjectAction::Update {
            actor,
            project,
            name,
            description,
            stack,
            style,
            requirements,
        } => {
            let update = ProjectUpdate {
                name,
                description,
                tech_stack: stack,
                developer_style: style,
                requirements,
            };
            let project = forge.update_project(&actor, &project, update)?;
            if json {
                return print_json(&project);
            }
            println!("{} Updated project {}", "✓".green().bold(), project.id.to_string().yellow());
            print_project(&project);
        }
        ProjectAction::List { actor } => {
            let projects = forge.projects(&actor)?;
            if json {
                return print_json(&projects);
            }
            if projects.is_empty() {
                println!("No projects.");
            }
            for project in &projects {
                let latest = forge
                    .latest(&actor, &project.id)?
                    .map(|v| format!("v{}", v.version_number))
                    .unwrap_or_else(|| "no versions".into());
                println!(
                    "{}  {}  {}",
                    project.id.to_string().yellow(),
                    project.name.bold(),
                    latest.dimmed()
                );
            }
        }
        ProjectAction::Show { actor, project } => {
            let project = forge.project(&actor, &project)?;
            if json {
                return print_json(&project);
            }
            print_project(&project);
            for version in forge.versions(&actor, &project.id)? {
                println!("  {}", version.summary());
            }
        }
    }
    Ok(())
}

fn print_project(project: &Project) {
    println!("  Name: {}", project.name.bold());
    println!("  Description: {}", project.description);
    println!("  Tech stack: {}", project.tech_stack.join(", ").cyan());
    let style = project
        .developer_style
        .map(|s| s.label().to_string())
        .unwrap_or_else(|| "(not set)".into());
    println!("  Style: {style}");
    let missing = project.missing_generation_inputs();
    if !missing.is_empty() {
        println!("  {} missing {}", "!".yellow(), missing.join(", "));
    }
}

async fn cmd_generate(forge: &Forge, args: GenerateArgs, json: bool) -> anyhow::Result<()> {
    match forge.generate(&args.actor, &args.project).await {
        Ok(response) => {
            if json {
                return print_json(&response);
            }
            println!(
                "{} Generated v{} ({}) with {}",
                "✓".green().bold(),
                response.version_number,
                response.version_id.to_string().yellow(),
                response.generator.cyan()
            );
            println!("  Tags: {}", response.tags.join(", "));
            println!("  Words: {}", response.word_count);
            if response.community_enhanced {
                println!("  {}", "Enhanced with community insights".cyan());
            }
            println!("  Remaining balance: {}", response.remaining_balance.to_string().bold());
            Ok(())
        }
        Err(failure) => {
            if json {
                print_json(&failure)?;
            } else {
                println!("{} Generation failed: {}", "✗".red().bold(), failure.message);
                for reason in &failure.reasons {
                    println!("  {}", reason.dimmed());
                }
                if let Some(balance) = failure.remaining_balance {
                    println!("  Balance: {balance}");
                }
            }
            bail!("{}: {}", failure.error_kind, failure.message)
        }
    }
}

async fn cmd_edit(forge: &Forge, args: EditArgs, json: bool) -> anyhow::Result<()> {
    let content = match (args.content, args.file) {
        (Some(content), _) => content,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?,
        (None, None) => bail!("provide --content or --file"),
    };
    let version = forge.edit(&args.actor, &args.version, &content).await?;
    report_version(&version, "Saved", json)
}

async fn cmd_revert(forge: &Forge, args: RevertArgs, json: bool) -> anyhow::Result<()> {
    let version = forge.revert(&args.actor, &args.project, args.number).await?;
    report_version(&version, &format!("Reverted to v{} as", args.number), json)
}

fn report_version(version: &ArtifactVersion, verb: &str, json: bool) -> anyhow::Result<()> {
    if json {
        return print_json(version);
    }
    println!(
        "{} {verb} v{} ({})",
        "✓".green().bold(),
        version.version_number,
        version.id.to_string().yellow()
    );
    if let Some(parent) = version.derived_from {
        println!("  Derived from: {}", parent.to_string().dimmed());
    }
    println!("  Tags: {}", version.tags.join(", "));
    Ok(())
}

fn cmd_history(forge: &Forge, args: HistoryArgs, json: bool) -> anyhow::Result<()> {
    let history = forge.history(&args.actor, &args.version)?;
    if json {
        return print_json(&history);
    }
    for version in history.iter().rev() {
        println!(
            "{}  {}  {}  {} words",
            format!("v{}", version.version_number).yellow().bold(),
            version.id.to_string().dimmed(),
            version.created_at.format("%Y-%m-%d %H:%M:%S"),
            version.word_count()
        );
    }
    Ok(())
}

fn cmd_show(forge: &Forge, args: ShowArgs, json: bool) -> anyhow::Result<()> {
    let version = forge.show(&args.actor, &args.version)?;
    if json {
        return print_json(&version);
    }
    if !args.raw {
        println!("{}", version.summary().yellow().bold());
        println!("  Hash: {}", version.content_hash.dimmed());
        println!("  Tags: {}", version.tags.join(", "));
        println!();
    }
    println!("{}", version.content);
    Ok(())
}

async fn cmd_share(forge: &Forge, args: ShareArgs, json: bool) -> anyhow::Result<()> {
    let visibility = if args.private {
        Visibility::Private
    } else {
        Visibility::Public
    };
    let version = forge.share(&args.actor, &args.version, visibility).await?;
    report_version(&version, &format!("Saved {visibility} copy as"), json)?;
    if !json && version.is_public() {
        println!("  Public id: {}", version.uuid.to_string().cyan());
    }
    Ok(())
}

fn cmd_public(forge: &Forge, args: PublicArgs, json: bool) -> anyhow::Result<()> {
    let version = forge.show_public(&args.uuid)?;
    if json {
        return print_json(&version);
    }
    if !args.raw {
        println!("{}", format!("v{}", version.version_number).yellow().bold());
        println!("  Tags: {}", version.tags.join(", "));
        println!();
    }
    println!("{}", version.content);
    Ok(())
}

fn cmd_rulesets(forge: &Forge, args: RulesetsArgs, json: bool) -> anyhow::Result<()> {
    let versions = forge.rulesets(&args.actor)?;
    if json {
        return print_json(&versions);
    }
    if versions.is_empty() {
        println!("No rulesets.");
    }
    for version in &versions {
        let project = version
            .project_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".into());
        println!(
            "{}  {}  v{}  {}  {}",
            version.id.to_string().yellow(),
            project,
            version.version_number,
            version.visibility.to_string().dimmed(),
            version.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_verify(forge: &Forge, json: bool) -> anyhow::Result<()> {
    let mut reconciliations = Vec::new();
    for account in forge.accounts()? {
        reconciliations.push(forge.reconcile(&account.id)?);
    }
    let lineages = forge.audit()?;
    let clean = reconciliations.iter().all(|r| r.is_clean())
        && lineages.iter().all(|l| l.is_valid());

    if json {
        let ledgers: Vec<_> = reconciliations
            .iter()
            .map(|r| {
                serde_json::json!({
                    "account": r.report.account,
                    "cached_balance": r.report.cached_balance,
                    "replayed_balance": r.replay.balance,
                    "violations": r.report.violations.iter().map(|v| &v.description).collect::<Vec<_>>(),
                })
            })
            .collect();
        print_json(&serde_json::json!({ "clean": clean, "ledgers": ledgers, "lineages": lineages }))?;
    } else {
        for r in &reconciliations {
            let mark = if r.is_clean() { "✓".green() } else { "✗".red() };
            println!(
                "{mark} {} balance {} (replayed {})",
                r.report.account.to_string().yellow(),
                r.report.cached_balance,
                r.replay.balance
            );
            for v in &r.report.violations {
                println!("    {}", v.description.red());
            }
        }
        for l in &lineages {
            let mark = if l.is_valid() { "✓".green() } else { "✗".red() };
            let branched = if l.is_branched() { " (branched)" } else { "" };
            println!("{mark} {} {} versions{branched}", l.lineage.to_string().yellow(), l.version_count);
            for v in &l.violations {
                println!("    {}", v.description.red());
            }
        }
    }

    if !clean {
        bail!("integrity check failed");
    }
    if !json {
        println!("{} Ledgers and version chains verified", "✓".green().bold());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use clap::Parser;
    use forge_sdk::{AccountId, ProjectId, VersionId};

    use super::*;

    async fn run(state: &Path, args: &[&str]) -> anyhow::Result<()> {
        let mut argv = vec!["forge", "--state", state.to_str().unwrap()];
        argv.extend_from_slice(args);
        run_command(Cli::try_parse_from(argv).unwrap()).await
    }

    fn state_file() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        (dir, path)
    }

    fn reload(path: &Path) -> Forge {
        Forge::import(ForgeConfig::default(), Snapshot::load(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn read_only_commands_do_not_create_state() {
        let (_dir, path) = state_file();
        run(&path, &["verify"]).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn generate_edit_revert_through_state_file() {
        let (_dir, path) = state_file();
        run(&path, &["account", "create", "dev@example.com"]).await.unwrap();
        run(
            &path,
            &[
                "project", "create", "--as", "1", "inventory",
                "--description", "Inventory service",
                "--stack", "Go,PostgreSQL",
                "--style", "experienced_dev",
            ],
        )
        .await
        .unwrap();
        run(&path, &["generate", "--as", "1", "1"]).await.unwrap();
        run(&path, &["edit", "--as", "1", "ver:1", "--content", "Use golang and Redis."])
            .await
            .unwrap();
        run(&path, &["revert", "--as", "1", "proj:1", "1"]).await.unwrap();
        run(&path, &["history", "--as", "1", "3"]).await.unwrap();
        run(&path, &["verify"]).await.unwrap();

        let forge = reload(&path);
        let account = AccountId::new(1);
        assert_eq!(forge.balance(&account).unwrap(), 9);
        let versions = forge.versions(&account, &ProjectId::new(1)).unwrap();
        assert_eq!(versions.len(), 3);
        assert_eq!(versions[2].content, versions[0].content);
        assert!(versions[1].tags.contains(&"redis".to_string()));
    }

    #[tokio::test]
    async fn failed_generation_leaves_state_unchanged() {
        let (_dir, path) = state_file();
        let config = path.with_file_name("forge.toml");
        std::fs::write(&config, "initial_credits = 0\n").unwrap();
        let config = config.to_str().unwrap();

        run(&path, &["--config", config, "account", "create", "dev@example.com"])
            .await
            .unwrap();
        run(
            &path,
            &[
                "--config", config, "project", "create", "--as", "1", "api",
                "--description", "Billing API", "--stack", "Python", "--style", "vibe_coder",
            ],
        )
        .await
        .unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        let err = run(&path, &["--config", config, "generate", "--as", "1", "1"])
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("insufficient_credits"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);
    }

    #[tokio::test]
    async fn admin_grant_persists() {
        let (_dir, path) = state_file();
        run(&path, &["account", "create", "ops@example.com", "--admin"]).await.unwrap();
        run(&path, &["account", "create", "dev@example.com"]).await.unwrap();
        run(&path, &["grant", "--as", "1", "2", "5"]).await.unwrap();
        assert!(run(&path, &["grant", "--as", "2", "2", "5"]).await.is_err());

        assert_eq!(reload(&path).balance(&AccountId::new(2)).unwrap(), 15);
    }

    #[tokio::test]
    async fn strangers_cannot_show_versions() {
        let (_dir, path) = state_file();
        run(&path, &["account", "create", "a@example.com"]).await.unwrap();
        run(&path, &["account", "create", "b@example.com"]).await.unwrap();
        run(
            &path,
            &[
                "project", "create", "--as", "1", "site", "--description", "Landing page",
                "--stack", "React", "--style", "vibe",
            ],
        )
        .await
        .unwrap();
        run(&path, &["generate", "--as", "1", "1"]).await.unwrap();

        assert!(run(&path, &["show", "--as", "2", "1"]).await.is_err());
        assert!(run(&path, &["show", "--as", "1", "1", "--raw"]).await.is_ok());
        assert!(reload(&path).show(&AccountId::new(1), &VersionId::new(1)).is_ok());
    }

    async fn go_project(path: &Path) {
        run(path, &["account", "create", "dev@example.com"]).await.unwrap();
        run(
            path,
            &[
                "project", "create", "--as", "1", "inventory",
                "--description", "Inventory service",
                "--stack", "Go,PostgreSQL",
                "--style", "experienced_dev",
            ],
        )
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn concurrent_generates_both_persist() {
        let (_dir, path) = state_file();
        go_project(&path).await;

        let (a, b) = tokio::join!(
            run(&path, &["--format", "json", "generate", "--as", "1", "1"]),
            run(&path, &["--format", "json", "generate", "--as", "1", "1"]),
        );
        a.unwrap();
        b.unwrap();

        let forge = reload(&path);
        let account = AccountId::new(1);
        let numbers: Vec<u32> = forge
            .versions(&account, &ProjectId::new(1))
            .unwrap()
            .iter()
            .map(|v| v.version_number)
            .collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(forge.balance(&account).unwrap(), 8);
        assert!(forge.reconcile(&account).unwrap().is_clean());
    }

    #[tokio::test]
    async fn writers_create_a_lock_file_beside_the_state() {
        let (_dir, path) = state_file();
        run(&path, &["account", "create", "dev@example.com"]).await.unwrap();
        assert!(lock_path(&path).exists());
        assert_eq!(lock_path(&path).file_name().unwrap(), "state.json.lock");
    }

    #[tokio::test]
    async fn shared_ruleset_is_readable_by_uuid() {
        let (_dir, path) = state_file();
        go_project(&path).await;
        run(&path, &["generate", "--as", "1", "1"]).await.unwrap();
        run(&path, &["share", "--as", "1", "1"]).await.unwrap();
        run(&path, &["rulesets", "--as", "1"]).await.unwrap();

        let forge = reload(&path);
        let versions = forge.versions(&AccountId::new(1), &ProjectId::new(1)).unwrap();
        assert_eq!(versions.len(), 2);
        assert!(!versions[0].is_public());
        assert!(versions[1].is_public());

        let public = versions[1].uuid.to_string();
        run(&path, &["public", &public, "--raw"]).await.unwrap();
        let private = versions[0].uuid.to_string();
        let err = run(&path, &["public", &private]).await.unwrap_err();
        assert!(err.to_string().contains("not found or not public"));
    }

    #[tokio::test]
    async fn configured_archive_is_loaded_for_every_command() {
        let (_dir, path) = state_file();
        let missing = path.with_file_name("forge.toml");
        std::fs::write(&missing, "community_archive = \"/nonexistent/community.json\"\n").unwrap();

        let err = run(&path, &["--config", missing.to_str().unwrap(), "verify"])
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "loading community archive");
    }

    #[tokio::test]
    async fn edit_requires_content() {
        let (_dir, path) = state_file();
        let err = run(&path, &["edit", "--as", "1", "1"]).await.unwrap_err();
        assert_eq!(err.to_string(), "provide --content or --file");
    }
}
