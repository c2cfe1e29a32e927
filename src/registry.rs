//! Project registry (spec §4.10): one `ProjectHandle` per indexed root,
//! coordinating that project's store, orchestrator and watcher. Concurrent
//! `set_project` calls for the same path share a single creation future
//! rather than racing to build duplicate state.
//!
//! Grounded on the teacher's `Database` (per-instance storage/index
//! coordination bundled behind `Arc`s), generalized from a single global
//! database to a name/path-keyed registry of many.

use crate::config::EngineConfig;
use crate::embedding_queue::LocalEmbeddingService;
use crate::error::{FelixError, Result};
use crate::orchestrator::{IndexResult, Orchestrator};
use crate::parsing::ParserRegistry;
use crate::store::FelixStore;
use crate::watcher::ProjectWatcher;
use dashmap::DashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OnceCell};
use tracing::{info, warn};

const EMBEDDING_DIMENSION: usize = 128;

/// Everything a project needs to index, resolve and query: its own store,
/// orchestrator, and (optionally) filesystem watcher.
pub struct ProjectHandle {
    pub name: String,
    pub root: PathBuf,
    pub store: Arc<FelixStore>,
    pub orchestrator: Arc<Orchestrator<FelixStore>>,
    watcher: Mutex<Option<ProjectWatcher>>,
    indexed_once: AtomicBool,
}

impl ProjectHandle {
    pub fn watcher_stats(&self) -> Option<Arc<crate::watcher::WatcherStats>> {
        self.watcher.try_lock().ok().and_then(|w| w.as_ref().map(|w| w.stats()))
    }
}

pub struct ProjectRegistry {
    config: EngineConfig,
    by_path: DashMap<PathBuf, Arc<OnceCell<Arc<ProjectHandle>>>>,
    name_to_path: DashMap<String, PathBuf>,
}

impl ProjectRegistry {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            by_path: DashMap::new(),
            name_to_path: DashMap::new(),
        }
    }

    /// Open (or return the already-open) project rooted at `path`.
    /// Concurrent callers for the same canonical path all await the same
    /// underlying creation future.
    pub async fn set_project(&self, path: impl AsRef<Path>) -> Result<Arc<ProjectHandle>> {
        let canonical = canonicalize(path.as_ref())?;
        let cell = self
            .by_path
            .entry(canonical.clone())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let handle = cell
            .get_or_try_init(|| self.create_project(canonical.clone()))
            .await?;
        Ok(handle.clone())
    }

    /// Open the project and run a full directory index. `force` bypasses
    /// the "already indexed once" short-circuit.
    pub async fn index_project(&self, path: impl AsRef<Path>, force: bool) -> Result<IndexResult> {
        let handle = self.set_project(path).await?;
        if !force && handle.indexed_once.load(Ordering::SeqCst) {
            info!(project = %handle.name, "index_project skipped, already indexed (force=false)");
            return Ok(IndexResult {
                success: true,
                files_processed: 0,
                component_count: 0,
                relationship_count: 0,
                errors: Vec::new(),
                warnings: Vec::new(),
                total_issue_count: 0,
                phase_timings: Vec::new(),
                started_at: chrono::Utc::now(),
                ended_at: chrono::Utc::now(),
                processing_time_ms: 0,
            });
        }
        let result = handle.orchestrator.index_directory(&handle.root).await?;
        handle.indexed_once.store(true, Ordering::SeqCst);
        Ok(result)
    }

    /// Look up a project by its registered name, or by path if it matches
    /// a known root directly.
    pub fn get_project(&self, name_or_path: &str) -> Option<Arc<ProjectHandle>> {
        let path = self
            .name_to_path
            .get(name_or_path)
            .map(|e| e.value().clone())
            .or_else(|| {
                let as_path = PathBuf::from(name_or_path);
                self.by_path.contains_key(&as_path).then_some(as_path)
            })?;
        self.by_path.get(&path)?.get().cloned()
    }

    /// Idempotently tear down a project's registry entry. Does not delete
    /// its on-disk `.felix/` state.
    pub async fn cleanup(&self, name_or_path: &str) -> Result<()> {
        let Some(handle) = self.get_project(name_or_path) else {
            return Ok(());
        };
        self.by_path.remove(&handle.root);
        self.name_to_path.retain(|_, p| p != &handle.root);
        Ok(())
    }

    async fn create_project(&self, root: PathBuf) -> Result<Arc<ProjectHandle>> {
        let name = self.unique_name_for(&root);
        self.name_to_path.insert(name.clone(), root.clone());

        let store = Arc::new(FelixStore::open(root.join(".felix"), self.config.clone()).await?);
        let registry = Arc::new(default_parser_registry());
        let embedding_service = Arc::new(LocalEmbeddingService::new(EMBEDDING_DIMENSION));
        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            registry,
            embedding_service,
            self.config.clone(),
        ));

        let watcher = if self.config.disable_file_watcher {
            None
        } else {
            match ProjectWatcher::start(&root, orchestrator.clone(), &self.config) {
                Ok(w) => Some(w),
                Err(e) => {
                    warn!(project = %name, error = %e, "failed to start filesystem watcher, continuing without it");
                    None
                }
            }
        };

        let handle = Arc::new(ProjectHandle {
            name: name.clone(),
            root: root.clone(),
            store,
            orchestrator,
            watcher: Mutex::new(watcher),
            indexed_once: AtomicBool::new(false),
        });

        spawn_post_connect_tasks(handle.clone());
        info!(project = %name, root = %root.display(), "project opened");
        Ok(handle)
    }

    fn unique_name_for(&self, root: &Path) -> String {
        let base = root
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| root.display().to_string());

        if self.name_is_free(&base, root) {
            return base;
        }

        let parent_qualified = root
            .parent()
            .and_then(|p| p.file_name())
            .map(|p| format!("{}-{}", p.to_string_lossy(), base))
            .unwrap_or_else(|| base.clone());

        if self.name_is_free(&parent_qualified, root) {
            return parent_qualified;
        }

        let mut suffix = 2;
        loop {
            let candidate = format!("{parent_qualified}-{suffix}");
            if self.name_is_free(&candidate, root) {
                return candidate;
            }
            suffix += 1;
        }
    }

    fn name_is_free(&self, candidate: &str, root: &Path) -> bool {
        match self.name_to_path.get(candidate) {
            Some(existing) => existing.value() == root,
            None => true,
        }
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(|_| FelixError::InvalidPath(path.to_path_buf()))
}

/// A `ParserRegistry` with every parser this build ships registered. Every
/// project opened through `ProjectRegistry` gets one of these; a registry
/// with nothing registered on it would silently index zero components for
/// every file.
fn default_parser_registry() -> ParserRegistry {
    let mut registry = ParserRegistry::new();
    #[cfg(feature = "tree-sitter-parsing")]
    registry.register(Arc::new(crate::parsing::rust_parser::RustParser::new()));
    registry
}

/// Post-connect background work that must never block `set_project`:
/// backfilling missing metadata embeddings and auto-attaching doc bundles
/// named by a project manifest, if present.
fn spawn_post_connect_tasks(handle: Arc<ProjectHandle>) {
    tokio::spawn(async move {
        if let Err(e) = handle.orchestrator.run_embed_phases().await {
            warn!(project = %handle.name, error = %e, "post-connect embedding backfill failed");
        }
        attach_doc_bundles_if_manifest_present(&handle).await;
    });
}

async fn attach_doc_bundles_if_manifest_present(handle: &Arc<ProjectHandle>) {
    let manifest_path = handle.root.join("felix.toml");
    if !manifest_path.exists() {
        return;
    }
    match tokio::fs::read_to_string(&manifest_path).await {
        Ok(content) => match toml::from_str::<ManifestDocBundles>(&content) {
            Ok(manifest) => {
                for bundle in manifest.doc_bundles {
                    let source = handle.root.join(&bundle);
                    if !source.exists() {
                        continue;
                    }
                    let dest = handle.store.db_path().join("doc-bundles").join(&bundle);
                    if let Some(parent) = dest.parent() {
                        let _ = tokio::fs::create_dir_all(parent).await;
                    }
                    if let Err(e) = copy_dir_recursive(&source, &dest).await {
                        warn!(project = %handle.name, bundle = %bundle, error = %e, "failed to attach doc bundle");
                    }
                }
            }
            Err(e) => warn!(project = %handle.name, error = %e, "malformed project manifest"),
        },
        Err(e) => warn!(project = %handle.name, error = %e, "failed to read project manifest"),
    }
}

#[derive(serde::Deserialize, Default)]
struct ManifestDocBundles {
    #[serde(default)]
    doc_bundles: Vec<String>,
}

fn copy_dir_recursive<'a>(src: &'a Path, dst: &'a Path) -> std::pin::Pin<Box<dyn std::future::Future<Output = std::io::Result<()>> + Send + 'a>> {
    Box::pin(async move {
        tokio::fs::create_dir_all(dst).await?;
        let mut entries = tokio::fs::read_dir(src).await?;
        while let Some(entry) = entries.next_entry().await? {
            let entry_path = entry.path();
            let target = dst.join(entry.file_name());
            if entry_path.is_dir() {
                copy_dir_recursive(&entry_path, &target).await?;
            } else {
                tokio::fs::copy(&entry_path, &target).await?;
            }
        }
        Ok(())
    })
}
