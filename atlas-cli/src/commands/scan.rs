use std::path::PathBuf;

use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};

use atlas_core::cluster::Clusterer;
use atlas_core::metrics::{DaemonMetrics, ExtractorAvailability};
use atlas_core::scan::{self, RepoScanner};
use atlas_core::snapshot;
use atlas_core::store::GraphStore;
use atlas_extract::ExtractorRegistry;

use super::client;

#[derive(Args, Debug)]
pub struct ScanArgs {
    /// Path to the repository root (default: current directory)
    #[arg(long, default_value = ".")]
    pub path: PathBuf,

    /// Extractor parallelism (default: CPU count)
    #[arg(long)]
    pub jobs: Option<usize>,
}

/// One-shot index: walk the repository, build the graph and clusters,
/// and write the full artifact set. No daemon involved.
pub async fn run(args: ScanArgs) -> anyhow::Result<()> {
    let graph_dir = client::open_graph_dir(&args.path)?;
    let config = graph_dir.load_config()?;
    let scanner = RepoScanner::new(&graph_dir, &config.watcher)?;
    let registry = ExtractorRegistry::new();
    let store = GraphStore::new();

    let total = scanner.eligible_files().len();
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .expect("static template"),
    );
    bar.set_message("extracting");

    let parallelism = args.jobs.unwrap_or_else(|| config.worker_parallelism());
    let report = scan::full_scan(&scanner, &store, &registry, parallelism, |_| {
        bar.inc(1);
    })?;
    bar.finish_with_message("done");

    let clusterer = Clusterer::new(config.cluster.clone());
    let supergraph = clusterer.build(&store)?;

    snapshot::write_store(&graph_dir, &store)?;
    snapshot::write_supergraph(&graph_dir, &supergraph)?;

    let metrics = DaemonMetrics::new();
    let stats = store.stats()?;
    let extractors: Vec<ExtractorAvailability> = registry
        .availability()
        .into_iter()
        .map(|(language, extractor)| ExtractorAvailability {
            language,
            extractor: extractor.to_string(),
        })
        .collect();
    snapshot::write_metrics(
        &graph_dir,
        &metrics.snapshot(stats.files_by_language.clone(), extractors, 0),
    )?;

    println!(
        "Indexed {} files ({} failed), {} edges, {} clusters → {}",
        report.scanned,
        report.failed,
        stats.edges,
        supergraph.metadata.total_clusters,
        graph_dir.path().display()
    );
    Ok(())
}
