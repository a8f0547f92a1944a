//! Command-line interface for gitlabfs.

pub mod args;
mod commands;

use std::sync::Arc;

use clap::{Parser, Subcommand};
use thiserror::Error;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use crate::config::{read_config, Config, ConfigError};
use crate::fs::{FsError, TreeParam, VirtualTree};
use crate::git::{GitOps, GitRepoClient};
use crate::gitlab::{GitlabClient, RemoteFetcher};
use crate::sync::{RepoRegistry, SyncQueue};

pub use args::GlobalArgs;

// =============================================================================
// Error Types
// =============================================================================

/// Errors that can occur during CLI execution.
#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration error. Fatal: nothing was built.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Tree access error.
    #[error("{0}")]
    Fs(#[from] FsError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Other error.
    #[error("{0}")]
    Other(String),
}

/// Result type for CLI operations.
pub type Result<T> = std::result::Result<T, CliError>;

// =============================================================================
// Engine Assembly
// =============================================================================

/// The wired-up core: tree, queue, and their collaborators.
pub struct Engine {
    pub tree: VirtualTree,
    pub queue: Arc<SyncQueue>,
}

/// Build the engine from a validated configuration.
pub fn build_engine(config: &Config) -> Engine {
    let registry = Arc::new(RepoRegistry::new(config.git.clone_location.clone()));

    let git: Arc<dyn GitOps> = Arc::new(GitRepoClient::new(
        config.git.remote_name.clone(),
        config.git.depth,
    ));

    let queue = SyncQueue::start(
        config.git.queue_size,
        config.git.worker_count,
        Arc::clone(&registry),
        Arc::clone(&git),
    );

    let fetcher: Arc<dyn RemoteFetcher> = Arc::new(GitlabClient::new(
        config.gitlab.url.clone(),
        config.gitlab.token.clone(),
        config.git.pull_method,
    ));

    let param = TreeParam {
        root_group_ids: config.gitlab.group_ids.clone(),
        user_ids: config.gitlab.user_ids.clone(),
        // Without a token there is no current user to fetch.
        include_current_user: config.gitlab.include_current_user && config.gitlab.token.is_some(),
        clone_method: config.git.on_clone,
        auto_pull: config.git.auto_pull,
    };

    let tree = VirtualTree::new(param, fetcher, git, Arc::clone(&queue), registry);

    Engine { tree, queue }
}

// =============================================================================
// CLI Definition
// =============================================================================

/// gitlabfs - browse a GitLab hierarchy as a tree of git working copies.
#[derive(Parser, Debug)]
#[command(name = "gitlabfs", version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the children of a tree path.
    Ls(commands::tree::LsCommand),

    /// Resolve a tree path to a directory or working-copy symlink.
    Resolve(commands::tree::ResolveCommand),

    /// Schedule synchronization for a project path.
    Sync(commands::tree::SyncCommand),

    /// Print the resolved configuration.
    ConfigDump,
}

// =============================================================================
// CLI Execution
// =============================================================================

impl Cli {
    /// Parse command-line arguments and return the CLI instance.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Run the CLI command.
    pub async fn run(self) -> Result<()> {
        let config_result = read_config(&self.global.to_config_source())?;
        for warning in &config_result.warnings {
            warn!("{}", warning);
        }
        let config = config_result.config;

        if let Command::ConfigDump = self.command {
            return commands::config::dump(&config);
        }

        let engine = build_engine(&config);
        match self.command {
            Command::Ls(cmd) => cmd.run(&engine, &self.global).await,
            Command::Resolve(cmd) => cmd.run(&engine, &self.global).await,
            Command::Sync(cmd) => cmd.run(&engine, &self.global).await,
            Command::ConfigDump => unreachable!("handled above"),
        }
    }
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("gitlabfs_rs=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Main entry point for the CLI.
pub async fn main() -> Result<()> {
    let cli = Cli::parse_args();
    init_tracing(cli.global.debug);
    cli.run().await
}
