use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use loanflow::{util, Address, FlowManagerBuilder, RestoreOutcome};
use loanflow_fake_chain::FakeChain;
use loanflow_redb::FlowRedbDatabase;
use tracing::Level;
use tracing_subscriber::EnvFilter;

mod config;
mod sub_commands;

use crate::config::Settings;

const DEFAULT_WORK_DIR: &str = ".loanflow-cli";

/// Drive loanflow flows against a fake chain
#[derive(Parser)]
#[command(name = "loanflow-cli")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to working dir
    #[arg(short, long)]
    work_dir: Option<PathBuf>,
    /// Logging level
    #[arg(short, long, default_value = "error")]
    log_level: Level,
    /// Config file, defaults to `config.toml` in the working dir
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Connected account
    #[arg(short, long)]
    account: Option<Address>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available flows
    Flows,
    /// Start a flow, replacing the current one
    Start(sub_commands::start::StartSubCommand),
    /// Show the current flow
    Status,
    /// Commit the current step
    Commit,
    /// Commit steps until the flow completes or a step fails
    Run,
    /// Drop the current flow
    Discard,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Cli = Cli::parse();

    let env_filter = EnvFilter::new(format!("{},redb=warn", args.log_level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let work_dir = match &args.work_dir {
        Some(work_dir) => work_dir.clone(),
        None => home::home_dir()
            .ok_or_else(|| anyhow!("Could not find home dir"))?
            .join(DEFAULT_WORK_DIR),
    };
    fs::create_dir_all(&work_dir)?;

    let mut settings = match &args.config {
        Some(config) => Settings::new(config, true)?,
        None => Settings::new(&work_dir.join("config.toml"), false)?,
    };
    if settings.fake_chain.hash_prefix == 0 {
        settings.fake_chain.hash_prefix = util::unix_time();
    }
    tracing::debug!("Using settings {:?}", settings);

    let localstore = Arc::new(FlowRedbDatabase::new(&work_dir.join("loanflow.redb"))?);
    let chain = FakeChain::new(settings.deployment.clone(), settings.fake_chain.clone());
    let read_model = chain.read_model();

    let mut builder = FlowManagerBuilder::new()
        .localstore(localstore)
        .chain(Arc::new(chain))
        .read_model(Arc::new(read_model))
        .deployment(settings.deployment.clone())
        .post_flow_check(settings.post_flow_check);
    if let Some(account) = args.account.or(settings.account) {
        builder = builder.account(account);
    }
    let manager = builder.build()?;

    if let RestoreOutcome::Discarded(reason) = manager.restore().await? {
        println!("Stored flow was unreadable and has been cleared: {reason}");
    }

    match &args.command {
        Commands::Flows => sub_commands::flows::flows(&manager),
        Commands::Start(sub_command_args) => {
            sub_commands::start::start(&manager, sub_command_args).await
        }
        Commands::Status => sub_commands::status::status(&manager),
        Commands::Commit => sub_commands::commit::commit(&manager).await,
        Commands::Run => sub_commands::run::run(&manager).await,
        Commands::Discard => sub_commands::discard::discard(&manager).await,
    }
}
