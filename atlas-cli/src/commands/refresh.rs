use std::path::PathBuf;

use clap::Args;

use atlas_core::api::Request;

use super::client;

#[derive(Args, Debug)]
pub struct RefreshArgs {
    /// Path to the repository root (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: RefreshArgs) -> anyhow::Result<()> {
    let graph_dir = client::open_graph_dir(&args.path)?;
    anyhow::ensure!(
        client::daemon_available(&graph_dir),
        "No daemon running in {}; run `atlas scan` for a one-shot index",
        graph_dir.path().display()
    );
    client::into_value(client::call(&graph_dir, &Request::Refresh).await?)?;
    println!("Full re-scan queued");
    Ok(())
}
