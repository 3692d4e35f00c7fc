use clap::Parser;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "atlas",
    version,
    about = "Live structural graph of a source repository"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Map an error to the documented exit codes:
///   0 — success
///   1 — general error
///   2 — another daemon instance holds the lock
///   3 — snapshot I/O failure
///   4 — invalid configuration
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    if let Some(atlas) = err.downcast_ref::<atlas_core::error::AtlasError>() {
        return atlas_core::daemon::exit_code_for(atlas);
    }
    if err.downcast_ref::<atlas_core::error::ConfigError>().is_some() {
        return 4;
    }
    if err.downcast_ref::<atlas_core::error::SnapshotError>().is_some() {
        return 3;
    }
    if let Some(daemon) = err.downcast_ref::<atlas_core::error::DaemonError>() {
        if matches!(daemon, atlas_core::error::DaemonError::LockHeld { .. }) {
            return 2;
        }
    }
    1
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: Failed to create runtime: {e}");
            std::process::exit(1);
        }
    };

    match runtime.block_on(commands::run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
