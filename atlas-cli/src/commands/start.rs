use std::path::PathBuf;
use std::process::{Command, Stdio};

use anyhow::Context;
use clap::Args;

use atlas_core::daemon::Daemon;
use atlas_core::daemon::lock::LockFile;
use atlas_core::error::DaemonError;

use super::client;

#[derive(Args, Debug)]
pub struct StartArgs {
    /// Path to the repository root (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Stay attached to the terminal instead of detaching
    #[arg(long)]
    pub foreground: bool,
}

pub async fn run(args: StartArgs) -> anyhow::Result<()> {
    let graph_dir = client::open_graph_dir(&args.path)?;

    if args.foreground {
        let daemon = Daemon::new(graph_dir).map_err(anyhow::Error::new)?;
        return daemon.run().await.map_err(anyhow::Error::new);
    }

    // Detached start: hand the event loop to a background copy of this
    // binary running `start --foreground`. The child's own lock
    // acquisition is authoritative; this check just fails fast.
    if LockFile::holder_alive(&graph_dir)? {
        let pid = LockFile::holder(&graph_dir)?.unwrap_or(0);
        return Err(anyhow::Error::new(DaemonError::LockHeld { pid }));
    }

    let exe = std::env::current_exe().context("Cannot locate own executable")?;
    let child = Command::new(exe)
        .arg("start")
        .arg("--foreground")
        .arg("--path")
        .arg(graph_dir.repo_root())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .context("Cannot spawn background daemon")?;

    println!("Daemon started (pid {})", child.id());
    Ok(())
}
