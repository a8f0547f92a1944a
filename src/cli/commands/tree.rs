//! Tree inspection and synchronization commands.

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use serde_json::json;

use crate::cli::{CliError, Engine, GlobalArgs, Result};
use crate::fs::ResolvedNode;
use crate::sync::SyncState;

/// List the children of a tree path.
#[derive(Args, Debug)]
pub struct LsCommand {
    /// Tree path, e.g. / or /mygroup/subgroup.
    pub path: PathBuf,
}

impl LsCommand {
    pub async fn run(self, engine: &Engine, global: &GlobalArgs) -> Result<()> {
        let names = engine.tree.list_children(&self.path).await?;

        if global.json {
            println!("{}", serde_json::to_string(&names)?);
        } else {
            for name in names {
                println!("{}", name);
            }
        }
        Ok(())
    }
}

/// Resolve a tree path.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    /// Tree path, e.g. /mygroup/myproject.
    pub path: PathBuf,
}

impl ResolveCommand {
    pub async fn run(self, engine: &Engine, global: &GlobalArgs) -> Result<()> {
        let resolved = engine.tree.resolve(&self.path).await?;

        match resolved {
            ResolvedNode::Directory => {
                if global.json {
                    println!("{}", json!({ "kind": "directory" }));
                } else {
                    println!("directory");
                }
            }
            ResolvedNode::Symlink { target } => {
                if global.json {
                    println!("{}", json!({ "kind": "symlink", "target": target }));
                } else {
                    println!("symlink -> {}", target.display());
                }
            }
        }
        Ok(())
    }
}

/// Schedule synchronization for a project path.
#[derive(Args, Debug)]
pub struct SyncCommand {
    /// Tree path of a project, e.g. /mygroup/myproject.
    pub path: PathBuf,

    /// Wait for the scheduled job to finish before returning.
    #[arg(long)]
    pub wait: bool,
}

impl SyncCommand {
    pub async fn run(self, engine: &Engine, global: &GlobalArgs) -> Result<()> {
        let entry = engine
            .tree
            .project_at(&self.path)
            .await?
            .ok_or_else(|| CliError::Other(format!("not a project: {}", self.path.display())))?;

        if self.wait {
            while matches!(entry.state(), SyncState::Pending | SyncState::Syncing) {
                // The timeout covers the race between reading the state and
                // registering for the completion notification.
                let _ = tokio::time::timeout(
                    Duration::from_millis(200),
                    engine.queue.completion(),
                )
                .await;
            }
        }

        let state = format!("{:?}", entry.state());
        if global.json {
            println!(
                "{}",
                json!({
                    "path": entry.local_path(),
                    "state": state,
                    "error": entry.last_error(),
                })
            );
        } else {
            println!("{}: {}", entry.local_path().display(), state);
            if let Some(error) = entry.last_error() {
                println!("last error: {}", error);
            }
        }
        Ok(())
    }
}
