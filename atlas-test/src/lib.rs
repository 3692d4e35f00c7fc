// Integration test fixtures: throwaway repositories with known shapes.

use std::path::Path;

use atlas_core::config::AtlasConfig;
use atlas_core::graphdir::GraphDir;
use atlas_core::scan::{RepoScanner, full_scan};
use atlas_core::store::GraphStore;
use atlas_extract::ExtractorRegistry;

/// A temporary repository for pipeline tests.
#[derive(Debug)]
pub struct TestRepo {
    pub dir: tempfile::TempDir,
}

impl TestRepo {
    pub fn empty() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write a file, creating parent directories.
    pub fn write(&self, rel: &str, contents: &str) {
        let path = self.path().join(rel);
        std::fs::create_dir_all(path.parent().expect("parent dir")).expect("mkdir");
        std::fs::write(path, contents).expect("write fixture file");
    }

    pub fn remove(&self, rel: &str) {
        std::fs::remove_file(self.path().join(rel)).expect("remove fixture file");
    }

    /// The S1 shape: `a.js` imports `b.js`, `b.js` empty.
    pub fn two_js_files() -> Self {
        let repo = Self::empty();
        repo.write("a.js", "import './b.js'\n");
        repo.write("b.js", "");
        repo
    }

    /// The S2 shape: three Python files in an import cycle.
    pub fn python_cycle() -> Self {
        let repo = Self::empty();
        repo.write("x.py", "import y\n");
        repo.write("y.py", "import z\n");
        repo.write("z.py", "import x\n");
        repo
    }

    /// The S3 shape: five mutually disconnected files.
    pub fn five_disconnected() -> Self {
        let repo = Self::empty();
        for i in 0..5 {
            repo.write(&format!("f{i}.py"), "VALUE = 1\n");
        }
        repo
    }

    /// The S4 shape scaled down: `dirs` directory trees of `per_dir`
    /// files with dense intra-tree imports and one cross edge per tree.
    pub fn directory_trees(dirs: &[&str], per_dir: usize) -> Self {
        let repo = Self::empty();
        for (d, dir) in dirs.iter().enumerate() {
            for i in 0..per_dir {
                let mut body = String::new();
                if i > 0 {
                    body.push_str(&format!("import {dir}.m{}\n", i - 1));
                    body.push_str(&format!("import {dir}.m0\n"));
                }
                if i == 0 && d > 0 {
                    body.push_str(&format!("import {}.m0\n", dirs[d - 1]));
                }
                repo.write(&format!("{dir}/m{i}.py"), &body);
            }
        }
        repo
    }

    /// Scan the repository into a fresh store.
    pub fn scan(&self) -> (GraphDir, GraphStore) {
        let graph_dir = GraphDir::open(self.path()).expect("open graph dir");
        let config = AtlasConfig::default();
        let scanner = RepoScanner::new(&graph_dir, &config.watcher).expect("scanner");
        let store = GraphStore::new();
        let registry = ExtractorRegistry::new();
        full_scan(&scanner, &store, &registry, 2, |_| {}).expect("full scan");
        (graph_dir, store)
    }

    /// Re-scan one file in place (extraction + apply + sweep).
    pub fn rescan_file(&self, store: &GraphStore, rel: &str) {
        let registry = ExtractorRegistry::new();
        let source = std::fs::read_to_string(self.path().join(rel)).expect("read fixture");
        let record = registry.extract(rel, &source).expect("supported language");
        store.apply_delta(&record).expect("apply");
        store.resolve_sweep().expect("sweep");
    }
}
