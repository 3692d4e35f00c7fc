use std::path::PathBuf;

use clap::Args;

use atlas_core::daemon::lock::LockFile;
use atlas_core::snapshot;

use super::client;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Path to the repository root (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Emit machine-readable JSON
    #[arg(long)]
    pub json: bool,
}

/// Status is read from disk — lock, metrics blob, super-graph — so it
/// works whether or not a daemon is running.
pub async fn run(args: StatusArgs) -> anyhow::Result<()> {
    let graph_dir = client::open_graph_dir(&args.path)?;

    let holder = LockFile::holder(&graph_dir)?;
    let alive = LockFile::holder_alive(&graph_dir)?;
    let metrics = snapshot::load_metrics(&graph_dir).ok();
    let supergraph = snapshot::load_supergraph(&graph_dir).ok();

    if args.json {
        let value = serde_json::json!({
            "daemon": { "pid": holder, "running": alive },
            "metrics": metrics,
            "supergraph": supergraph.as_ref().map(|g| &g.metadata),
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    match (holder, alive) {
        (Some(pid), true) => println!("daemon: running (pid {pid})"),
        (Some(pid), false) => println!("daemon: stale lock (pid {pid}, not running)"),
        (None, _) => println!("daemon: not running"),
    }

    match metrics {
        Some(m) => {
            println!(
                "updates: {}  errors: {}  avg update: {:.1} ms",
                m.updates, m.errors, m.avg_update_ms
            );
            if let Some(ts) = m.last_update {
                println!("last update: {ts}");
            }
            if !m.files_by_language.is_empty() {
                let langs: Vec<String> = m
                    .files_by_language
                    .iter()
                    .map(|(lang, count)| format!("{lang}: {count}"))
                    .collect();
                println!("files: {}", langs.join(", "));
            }
        }
        None => println!("no metrics snapshot yet"),
    }

    if let Some(graph) = supergraph {
        println!(
            "clusters: {} over {} files (compression {:.1}x, {:?})",
            graph.metadata.total_clusters,
            graph.metadata.total_files,
            graph.metadata.compression_ratio,
            graph.metadata.strategy
        );
    }
    Ok(())
}
