use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use gatekeeper::gate_config::GateConfig;
use gatekeeper::review::{ReviewerCode, TriggerContext, Verdict};
use gatekeeper::{Actor, GateEngine, Phase, Role};

mod cmd;

#[derive(Parser)]
#[command(name = "gatekeeper")]
#[command(version, about = "Directive lifecycle engine with validation gates and a circuit breaker")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Path to gatekeeper.toml. Defaults to ./gatekeeper.toml when present.
    #[arg(long, global = true, env = "GATEKEEPER_CONFIG")]
    pub config: Option<PathBuf>,

    /// SQLite database path. Overrides [store] path.
    #[arg(long, global = true, env = "GATEKEEPER_DB")]
    pub db: Option<PathBuf>,

    /// Acceptance threshold (1-100). Overrides [circuit_breaker] threshold.
    #[arg(long, global = true, env = "GATEKEEPER_THRESHOLD")]
    pub threshold: Option<i64>,

    /// Identity of the acting agent
    #[arg(long, global = true, env = "GATEKEEPER_ACTOR", default_value = "")]
    pub actor: String,

    /// Role of the acting agent: lead, plan, exec or reviewer
    #[arg(long, global = true, env = "GATEKEEPER_ROLE")]
    pub role: Option<Role>,

    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// The acting identity. Writes are refused without a role.
    pub fn actor(&self) -> Result<Actor> {
        let role = self
            .role
            .context("--role (or GATEKEEPER_ROLE) is required for this command")?;
        Ok(Actor::new(self.actor.trim(), role))
    }

    pub fn resolve_config(&self) -> Result<GateConfig> {
        Ok(GateConfig::load(self.config.as_deref())?.with_cli_args(self.db.clone(), self.threshold)?)
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and manage directives
    Directive {
        #[command(subcommand)]
        command: DirectiveCommands,
    },
    /// Write the plan document
    Plan {
        #[command(subcommand)]
        command: PlanCommands,
    },
    /// Track and complete deliverables
    Deliverable {
        #[command(subcommand)]
        command: DeliverableCommands,
    },
    /// Create, decide and inspect phase handoffs
    Handoff {
        #[command(subcommand)]
        command: HandoffCommands,
    },
    /// Show the weighted progress breakdown for a directive
    Progress { directive_id: i64 },
    /// Record reviewer verdicts and deliver reviewer activations
    Review {
        #[command(subcommand)]
        command: ReviewCommands,
    },
    /// Show which reviewers a text would activate
    Dispatch {
        text: String,
        /// Trigger context: directive or plan
        #[arg(long, default_value = "directive")]
        context: TriggerContext,
    },
    /// List constraint violations and circuit breaker blocks
    Audit {
        #[arg(long)]
        directive: Option<i64>,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum DirectiveCommands {
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        /// Parent directive id
        #[arg(long)]
        parent: Option<i64>,
    },
    Activate { id: i64 },
    Defer { id: i64 },
    Show { id: i64 },
    List,
}

#[derive(Subcommand, Clone)]
pub enum PlanCommands {
    Set {
        directive_id: i64,
        /// Plan text
        #[arg(long, conflicts_with = "file")]
        content: Option<String>,
        /// Read the plan from a file
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(Subcommand, Clone)]
pub enum DeliverableCommands {
    Track {
        directive_id: i64,
        name: String,
        #[arg(long, default_value = "artifact")]
        kind: String,
    },
    Complete { deliverable_id: i64 },
}

#[derive(Subcommand, Clone)]
pub enum HandoffCommands {
    /// Hand off from the current phase, or from --from to --to
    Create {
        directive_id: i64,
        #[arg(long, requires = "to")]
        from: Option<Phase>,
        #[arg(long, requires = "from")]
        to: Option<Phase>,
        /// TOML file with the handoff narrative fields
        #[arg(long)]
        draft: Option<PathBuf>,
        #[arg(long)]
        summary: Option<String>,
        #[arg(long)]
        key_decisions: Option<String>,
        #[arg(long)]
        known_issues: Option<String>,
        #[arg(long)]
        resource_utilization: Option<String>,
        /// Repeat for each action item
        #[arg(long = "action-item")]
        action_items: Vec<String>,
    },
    Accept { handoff_id: i64 },
    Reject {
        handoff_id: i64,
        #[arg(long)]
        reason: String,
    },
    /// List handoffs awaiting acceptance
    Pending {
        #[arg(long)]
        directive: Option<i64>,
        /// Only handoffs this role may decide
        #[arg(long)]
        acceptable_by: Option<Role>,
    },
    /// Every attempt for a directive
    History { directive_id: i64 },
}

#[derive(Subcommand, Clone)]
pub enum ReviewCommands {
    Record {
        directive_id: i64,
        #[arg(long)]
        reviewer: ReviewerCode,
        /// PASS, FAIL, CONDITIONAL or BLOCKED
        #[arg(long)]
        verdict: Verdict,
        #[arg(long, default_value = "80")]
        confidence: i64,
        #[arg(long = "issue")]
        issues: Vec<String>,
        #[arg(long = "warning")]
        warnings: Vec<String>,
        #[arg(long = "recommendation")]
        recommendations: Vec<String>,
    },
    /// List queued reviewer activations
    Activations {
        #[arg(long)]
        directive: Option<i64>,
    },
    /// Push undelivered activations to stdout as JSON lines
    Deliver,
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    Show,
    Validate,
    /// Write a default gatekeeper.toml
    Init {
        #[arg(long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    if let Err(e) = run(&cli).await {
        cmd::report_error(&e, cli.json);
        std::process::exit(1);
    }
}

async fn run(cli: &Cli) -> Result<()> {
    // Config commands must work on a broken config file.
    if let Commands::Config { command } = &cli.command {
        return cmd::cmd_config(cli, command.clone());
    }

    let config = cli.resolve_config()?;
    let _guard = gatekeeper::logging::init(config.logging(), cli.verbose)?;

    if let Commands::Dispatch { text, context } = &cli.command {
        return cmd::cmd_dispatch(cli, &config, text, *context);
    }

    let engine = GateEngine::from_config(&config)?;
    match &cli.command {
        Commands::Directive { command } => cmd::cmd_directive(cli, &engine, command.clone()).await?,
        Commands::Plan { command } => cmd::cmd_plan(cli, &engine, command.clone()).await?,
        Commands::Deliverable { command } => {
            cmd::cmd_deliverable(cli, &engine, command.clone()).await?
        }
        Commands::Handoff { command } => cmd::cmd_handoff(cli, &engine, command.clone()).await?,
        Commands::Progress { directive_id } => cmd::cmd_progress(cli, &engine, *directive_id).await?,
        Commands::Review { command } => cmd::cmd_review(cli, &engine, command.clone()).await?,
        Commands::Audit { directive } => cmd::cmd_audit(cli, &engine, *directive).await?,
        Commands::Dispatch { .. } | Commands::Config { .. } => {}
    }
    Ok(())
}
