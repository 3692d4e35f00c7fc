use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Subcommand};

use atlas_core::api::{self, ApiContext, Request};
use atlas_core::metrics::DaemonMetrics;
use atlas_core::snapshot;
use atlas_core::types::EdgeKind;
use atlas_extract::ExtractorRegistry;

use super::client;

#[derive(Args, Debug)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub op: QueryOp,

    /// Path to the repository root (default: current directory)
    #[arg(long, default_value = ".", global = true)]
    pub path: PathBuf,

    /// Emit machine-readable JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum QueryOp {
    /// Files related to a file via dependency edges
    Related {
        /// Repo-relative file path
        file: String,
        /// Maximum traversal depth
        #[arg(long, default_value_t = 2)]
        depth: u32,
        /// Comma-separated edge kinds (import,include,require,call,inheritance)
        #[arg(long)]
        types: Option<String>,
        /// Also follow incoming edges
        #[arg(long)]
        reverse: bool,
    },
    /// Keyword search over file paths and symbols
    Symbols {
        /// Keywords, matched case-insensitively
        keywords: Vec<String>,
    },
    /// Longest dependency chains between well-connected files
    HotPaths {
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Import/include cycles
    Cycles,
    /// Architecture overview: languages, hot paths, cycles, metrics
    Overview,
}

fn parse_types(types: Option<&str>) -> anyhow::Result<Option<Vec<EdgeKind>>> {
    let Some(types) = types else {
        return Ok(None);
    };
    let kinds = types
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<EdgeKind>().map_err(|e| anyhow::anyhow!(e)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(Some(kinds))
}

fn to_request(op: &QueryOp) -> anyhow::Result<Request> {
    Ok(match op {
        QueryOp::Related {
            file,
            depth,
            types,
            reverse,
        } => Request::FindRelated {
            file: file.clone(),
            max_depth: *depth,
            types: parse_types(types.as_deref())?,
            include_reverse: *reverse,
        },
        QueryOp::Symbols { keywords } => Request::SearchSymbols {
            keywords: keywords.clone(),
        },
        QueryOp::HotPaths { limit } => Request::HotPaths { limit: *limit },
        QueryOp::Cycles => Request::DetectCycles,
        QueryOp::Overview => Request::Overview,
    })
}

pub async fn run(args: QueryArgs) -> anyhow::Result<()> {
    let graph_dir = client::open_graph_dir(&args.path)?;
    let request = to_request(&args.op)?;

    // Prefer the live daemon; answer from the snapshot otherwise.
    let value = if client::daemon_available(&graph_dir) {
        client::into_value(client::call(&graph_dir, &request).await?)?
    } else {
        let store = snapshot::load_store(&graph_dir)?;
        let supergraph = snapshot::load_supergraph(&graph_dir).ok();
        let (control, _control_rx) = tokio::sync::mpsc::channel(1);
        let ctx = ApiContext {
            store: Arc::new(store),
            supergraph: Arc::new(tokio::sync::RwLock::new(supergraph)),
            metrics: Arc::new(DaemonMetrics::new()),
            registry: Arc::new(ExtractorRegistry::new()),
            control,
        };
        client::into_value(api::dispatch(&ctx, request).await)?
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }
    render(&args.op, &value);
    Ok(())
}

fn render(op: &QueryOp, value: &serde_json::Value) {
    match op {
        QueryOp::Related { file, .. } => {
            let rows = value.as_array().cloned().unwrap_or_default();
            if rows.is_empty() {
                println!("No known relationships for {file}");
                return;
            }
            for row in rows {
                println!(
                    "{}  ({}, depth {}, confidence {:.1})",
                    row["path"].as_str().unwrap_or("?"),
                    row["relation"].as_str().unwrap_or("?"),
                    row["depth"],
                    row["confidence"].as_f64().unwrap_or(0.0)
                );
            }
        }
        QueryOp::Symbols { .. } => {
            for row in value.as_array().cloned().unwrap_or_default() {
                println!(
                    "{}  [{}]  relevance {:.2}",
                    row["path"].as_str().unwrap_or("?"),
                    row["language"].as_str().unwrap_or("?"),
                    row["relevance"].as_f64().unwrap_or(0.0)
                );
            }
        }
        QueryOp::HotPaths { .. } | QueryOp::Cycles => {
            let label = if matches!(op, QueryOp::Cycles) {
                "cycle"
            } else {
                "path"
            };
            let rows = value.as_array().cloned().unwrap_or_default();
            if rows.is_empty() {
                println!("No {label}s found");
                return;
            }
            for row in rows {
                let hops: Vec<String> = row
                    .as_array()
                    .map(|nodes| {
                        nodes
                            .iter()
                            .map(|n| n.as_str().unwrap_or("?").to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                println!("{}", hops.join(" -> "));
            }
        }
        QueryOp::Overview => {
            if let Some(by_language) = value["modules_by_language"].as_object() {
                for (lang, count) in by_language {
                    println!("{lang}: {count} files");
                }
            }
            println!(
                "edges: {}  hot paths: {}  cycles: {}",
                value["metrics"]["edges"],
                value["hot_paths"].as_array().map_or(0, Vec::len),
                value["cycles"].as_array().map_or(0, Vec::len)
            );
        }
    }
}
