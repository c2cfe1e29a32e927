//! Filesystem watcher (spec §4.8): bridges `notify`'s synchronous callback
//! onto a dedicated OS thread into an async channel, debounces bursts of
//! events per path behind a stability window, and dispatches the settled
//! event to the orchestrator's incremental entry points. A watcher-ready
//! event triggers exactly one reconcile pass, covering anything missed
//! before the watch was established.
//!
//! Grounded on the `lumina-desktop` `FileWatcher`'s sync-thread/notify-
//! channel bridge, generalized from a flat ignore list to
//! [`crate::resolver::debounce::Debouncer`]-based per-path settling and
//! wired to the orchestrator instead of a UI-facing aggregator.

use crate::config::EngineConfig;
use crate::contracts::{ComponentStore, EmbeddingStore, MetadataKvStore, MetadataStore, RelationshipStore};
use crate::orchestrator::Orchestrator;
use crate::resolver::debounce::Debouncer;
use dashmap::DashMap;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcherTrait};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Created,
    Modified,
    Removed,
}

/// Per-watcher counters exposed for health/metrics reporting.
#[derive(Default)]
pub struct WatcherStats {
    pub added: AtomicU64,
    pub changed: AtomicU64,
    pub removed: AtomicU64,
    pub last_event_unix: AtomicU64,
    pub ready: AtomicBool,
}

impl WatcherStats {
    fn record(&self, kind: Kind) {
        match kind {
            Kind::Created => self.added.fetch_add(1, Ordering::Relaxed),
            Kind::Modified => self.changed.fetch_add(1, Ordering::Relaxed),
            Kind::Removed => self.removed.fetch_add(1, Ordering::Relaxed),
        };
        self.last_event_unix.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            Ordering::Relaxed,
        );
    }
}

/// Owns the background notify thread and the debounce dispatch task. Dropped
/// when indexing for a project stops.
pub struct ProjectWatcher {
    _notify_watcher: RecommendedWatcher,
    stats: Arc<WatcherStats>,
}

impl ProjectWatcher {
    pub fn stats(&self) -> Arc<WatcherStats> {
        self.stats.clone()
    }

    /// Start watching `root` recursively, dispatching settled events to
    /// `orchestrator`. Returns once the notify watcher has been installed;
    /// the actual dispatch runs in background tasks.
    pub fn start<S>(
        root: &Path,
        orchestrator: Arc<Orchestrator<S>>,
        config: &EngineConfig,
    ) -> notify::Result<Self>
    where
        S: ComponentStore + RelationshipStore + MetadataStore + MetadataKvStore + EmbeddingStore + Send + Sync + 'static,
    {
        let stats = Arc::new(WatcherStats::default());
        let (raw_tx, mut raw_rx) = mpsc::channel::<Event>(1024);

        let raw_tx_for_callback = raw_tx.clone();
        let mut notify_watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let _ = raw_tx_for_callback.blocking_send(event);
            }
            Err(e) => error!(error = %e, "notify watcher error"),
        })?;
        notify_watcher.watch(root, RecursiveMode::Recursive)?;

        let stability_window = Duration::from_millis(config.watcher_stability_window_ms);
        let debouncers: Arc<DashMap<PathBuf, Arc<Debouncer>>> = Arc::new(DashMap::new());
        let stats_for_dispatch = stats.clone();
        let orchestrator_for_reconcile = orchestrator.clone();
        let root = root.to_path_buf();

        tokio::spawn(async move {
            while let Some(event) = raw_rx.recv().await {
                let Some(kind) = classify(&event.kind) else {
                    continue;
                };
                for path in event.paths {
                    if is_ignored(&path) {
                        continue;
                    }
                    schedule_dispatch(
                        &debouncers,
                        stability_window,
                        path,
                        kind,
                        orchestrator.clone(),
                        stats_for_dispatch.clone(),
                    )
                    .await;
                }
            }
        });

        // The watcher is now installed; run one reconcile pass to pick up
        // anything changed between the last run and this one starting.
        let stats_for_ready = stats.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator_for_reconcile.reconcile(&root).await {
                warn!(error = %e, "initial reconcile on watcher-ready failed");
            }
            stats_for_ready.ready.store(true, Ordering::Relaxed);
        });
        Ok(Self {
            _notify_watcher: notify_watcher,
            stats,
        })
    }
}

fn classify(kind: &EventKind) -> Option<Kind> {
    match kind {
        EventKind::Create(_) => Some(Kind::Created),
        EventKind::Modify(_) => Some(Kind::Modified),
        EventKind::Remove(_) => Some(Kind::Removed),
        _ => None,
    }
}

/// Hard-coded ignore list, mirrored from [`crate::discovery`]'s exclude set
/// since the watcher fires before discovery's ignore pipeline ever runs.
fn is_ignored(path: &Path) -> bool {
    const IGNORED: &[&str] = &[".git", "node_modules", "target", "dist", "build", ".felix"];
    path.components().any(|c| {
        let s = c.as_os_str().to_string_lossy();
        IGNORED.contains(&s.as_ref())
    })
}

async fn schedule_dispatch<S>(
    debouncers: &Arc<DashMap<PathBuf, Arc<Debouncer>>>,
    stability_window: Duration,
    path: PathBuf,
    kind: Kind,
    orchestrator: Arc<Orchestrator<S>>,
    stats: Arc<WatcherStats>,
) where
    S: ComponentStore + RelationshipStore + MetadataStore + MetadataKvStore + EmbeddingStore + Send + Sync + 'static,
{
    let debouncer = debouncers
        .entry(path.clone())
        .or_insert_with(|| Arc::new(Debouncer::new(stability_window)))
        .clone();

    let dispatch_path = path.clone();
    debouncer.trigger(async move {
        stats.record(kind);
        let path_str = dispatch_path.to_string_lossy().to_string();
        let outcome = match kind {
            Kind::Created | Kind::Modified => orchestrator.update_file(&path_str).await.map(|_| ()),
            Kind::Removed => orchestrator.remove_file(&path_str).await.map(|_| ()),
        };
        match outcome {
            Err(e) => warn!(path = %path_str, error = %e, "watcher dispatch failed"),
            Ok(()) => debug!(path = %path_str, kind = ?kind, "watcher dispatched event"),
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignores_hard_coded_directories() {
        assert!(is_ignored(Path::new("repo/.git/HEAD")));
        assert!(is_ignored(Path::new("repo/node_modules/pkg/index.js")));
        assert!(!is_ignored(Path::new("repo/src/main.rs")));
    }

    #[test]
    fn classifies_notify_event_kinds() {
        assert_eq!(classify(&EventKind::Create(notify::event::CreateKind::File)), Some(Kind::Created));
        assert_eq!(classify(&EventKind::Remove(notify::event::RemoveKind::File)), Some(Kind::Removed));
        assert_eq!(classify(&EventKind::Access(notify::event::AccessKind::Any)), None);
    }
}
