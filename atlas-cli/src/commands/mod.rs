pub mod client;
pub mod query;
pub mod refresh;
pub mod scan;
pub mod start;
pub mod status;
pub mod stop;

use clap::Subcommand;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the watch daemon (detached unless --foreground)
    Start(start::StartArgs),
    /// Stop a running daemon
    Stop(stop::StopArgs),
    /// Ask a running daemon for a full re-scan
    Refresh(refresh::RefreshArgs),
    /// Show daemon and graph state from the snapshot artifacts
    Status(status::StatusArgs),
    /// One-shot scan: build the graph and write a snapshot, no daemon
    Scan(scan::ScanArgs),
    /// Query the structural graph
    Query(query::QueryArgs),
}

pub async fn run(cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Start(args) => start::run(args).await,
        Command::Stop(args) => stop::run(args).await,
        Command::Refresh(args) => refresh::run(args).await,
        Command::Status(args) => status::run(args).await,
        Command::Scan(args) => scan::run(args).await,
        Command::Query(args) => query::run(args).await,
    }
}
