use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use forge_sdk::{AccountId, DeveloperStyle, ProjectId, Uuid, VersionId};

#[derive(Parser)]
#[command(
    name = "forge",
    about = "Ruleforge: metered coding-ruleset generation with full version history",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Raise log verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// JSON state file; created on first write
    #[arg(long, global = true, default_value = "forge-state.json")]
    pub state: PathBuf,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or list accounts
    Account(AccountArgs),
    /// Grant credits as an admin
    Grant(GrantArgs),
    /// Show an account's balance
    Balance(BalanceArgs),
    /// Show a credit summary with recent entries
    Credits(CreditsArgs),
    /// Create, update, list, or show projects
    Project(ProjectArgs),
    /// Generate a ruleset for a project (costs one credit)
    Generate(GenerateArgs),
    /// Record an edited ruleset derived from a version
    Edit(EditArgs),
    /// Commit a copy of an earlier version as the newest one
    Revert(RevertArgs),
    /// Show a version and its ancestors
    History(HistoryArgs),
    /// Show one version
    Show(ShowArgs),
    /// Commit a public (or, with --private, private) copy of a version
    Share(ShareArgs),
    /// Show a public ruleset by uuid; no account needed
    Public(PublicArgs),
    /// List an account's rulesets across all projects, newest first
    Rulesets(RulesetsArgs),
    /// Reconcile every ledger and audit every version lineage
    Verify(VerifyArgs),
}

#[derive(Args)]
pub struct AccountArgs {
    #[command(subcommand)]
    pub action: AccountAction,
}

#[derive(Subcommand)]
pub enum AccountAction {
    Create {
        email: String,
        #[arg(long)]
        admin: bool,
    },
    List,
}

#[derive(Args)]
pub struct GrantArgs {
    /// Admin account granting the credits
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub account: AccountId,
    pub amount: i64,
}

#[derive(Args)]
pub struct BalanceArgs {
    pub account: AccountId,
}

#[derive(Args)]
pub struct CreditsArgs {
    pub account: AccountId,
    #[arg(short = 'n', long, default_value = "10")]
    pub limit: usize,
}

#[derive(Args)]
pub struct ProjectArgs {
    #[command(subcommand)]
    pub action: ProjectAction,
}

#[derive(Subcommand)]
pub enum ProjectAction {
    Create {
        #[arg(long = "as", value_name = "ACCOUNT")]
        actor: AccountId,
        name: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Comma-separated technologies
        #[arg(long, value_delimiter = ',')]
        stack: Vec<String>,
        /// vibe_coder or experienced_dev
        #[arg(long)]
        style: Option<DeveloperStyle>,
        #[arg(long)]
        requirements: Option<String>,
    },
    Update {
        #[arg(long = "as", value_name = "ACCOUNT")]
        actor: AccountId,
        project: ProjectId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long, value_delimiter = ',')]
        stack: Option<Vec<String>>,
        #[arg(long)]
        style: Option<DeveloperStyle>,
        #[arg(long)]
        requirements: Option<String>,
    },
    List {
        #[arg(long = "as", value_name = "ACCOUNT")]
        actor: AccountId,
    },
    Show {
        #[arg(long = "as", value_name = "ACCOUNT")]
        actor: AccountId,
        project: ProjectId,
    },
}

#[derive(Args)]
pub struct GenerateArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub project: ProjectId,
}

#[derive(Args)]
pub struct EditArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub version: VersionId,
    #[arg(long, conflicts_with = "file")]
    pub content: Option<String>,
    /// Read the new content from a file
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Args)]
pub struct RevertArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub project: ProjectId,
    /// Version number to restore
    pub number: u32,
}

#[derive(Args)]
pub struct HistoryArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub version: VersionId,
}

#[derive(Args)]
pub struct ShowArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub version: VersionId,
    /// Print only the ruleset content
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct ShareArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
    pub version: VersionId,
    /// Make the copy private instead
    #[arg(long)]
    pub private: bool,
}

#[derive(Args)]
pub struct PublicArgs {
    pub uuid: Uuid,
    #[arg(long)]
    pub raw: bool,
}

#[derive(Args)]
pub struct RulesetsArgs {
    #[arg(long = "as", value_name = "ACCOUNT")]
    pub actor: AccountId,
}

#[derive(Args)]
pub struct VerifyArgs {}
