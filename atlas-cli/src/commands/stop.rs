use std::path::PathBuf;

use clap::Args;

use atlas_core::api::Request;

use super::client;

#[derive(Args, Debug)]
pub struct StopArgs {
    /// Path to the repository root (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,
}

pub async fn run(args: StopArgs) -> anyhow::Result<()> {
    let graph_dir = client::open_graph_dir(&args.path)?;
    if !client::daemon_available(&graph_dir) {
        println!("No daemon running in {}", graph_dir.path().display());
        return Ok(());
    }
    client::into_value(client::call(&graph_dir, &Request::Stop).await?)?;
    println!("Stop requested");
    Ok(())
}
