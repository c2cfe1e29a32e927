// Typed configuration for every environment toggle named in the engine's
// persisted-state/runtime contract. Loaded once at startup with
// `EngineConfig::from_env`, then threaded through the orchestrator/watcher/
// store/query construction the way the teacher threads builder-produced
// structs into its services.

use std::env;

/// Default worker-pool size when neither a caller-supplied override nor
/// `INDEX_CONCURRENCY` is set: `max(1, cpu_count - 1)`, clamped to 8.
fn default_concurrency() -> usize {
    let cpus = num_cpus::get();
    cpus.saturating_sub(1).max(1).min(8)
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Worker pool size for the parse/persist and embedding phases.
    pub index_concurrency: usize,
    /// Disables the filesystem watcher entirely; reconcile must then be
    /// driven manually.
    pub disable_file_watcher: bool,
    /// Per-kind cap on documentation links resolved in one pass.
    pub doc_link_resolve_limit: usize,
    /// Retry budget for documentation-link store writes under contention.
    pub doc_link_db_retries: u32,
    /// Maximum number of files re-indexed by a single `reconcile` call.
    pub reconcile_batch_limit: usize,
    /// When `false`, the query engine forces the legacy single-score
    /// re-rank instead of the z-score-normalized blend (spec §4.9).
    pub search_new_scoring: bool,
    /// Caps the number of errors/warnings kept on an `IndexResult` before
    /// the rest are summarized as a count (spec §4.7).
    pub error_surface_limit: usize,
    /// Stability window the watcher waits after the last event on a path
    /// before dispatching it to the orchestrator.
    pub watcher_stability_window_ms: u64,
    /// Batch size for the embedding queue's flush.
    pub embedding_batch_size: usize,
    /// Default write-lane retry schedule (spec §4.3): initial delay,
    /// doubling, capped, bounded attempt count.
    pub store_retry_initial_ms: u64,
    pub store_retry_max_ms: u64,
    pub store_retry_max_attempts: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            index_concurrency: default_concurrency(),
            disable_file_watcher: false,
            doc_link_resolve_limit: 10_000,
            doc_link_db_retries: 10,
            reconcile_batch_limit: 100,
            search_new_scoring: true,
            error_surface_limit: 25,
            watcher_stability_window_ms: 200,
            embedding_batch_size: 32,
            store_retry_initial_ms: 100,
            store_retry_max_ms: 1_000,
            store_retry_max_attempts: 10,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(v) = env_usize("INDEX_CONCURRENCY") {
            config.index_concurrency = v.clamp(1, 8);
        }
        if let Ok(v) = env::var("DISABLE_FILE_WATCHER") {
            config.disable_file_watcher = v.eq_ignore_ascii_case("true") || v == "1";
        }
        if let Some(v) = env_usize("DOC_LINK_RESOLVE_LIMIT") {
            config.doc_link_resolve_limit = v;
        }
        if let Some(v) = env_u32("DOC_LINK_DB_RETRIES") {
            config.doc_link_db_retries = v;
        }
        if let Some(v) = env_usize("RECONCILE_BATCH_LIMIT") {
            config.reconcile_batch_limit = v;
        }
        if let Ok(v) = env::var("SEARCH_NEW_SCORING") {
            config.search_new_scoring = v != "0";
        }

        config
    }

    /// Apply a caller-supplied concurrency override, which outranks both
    /// the environment and the cpu-derived default (spec §4.7).
    pub fn with_concurrency_override(mut self, override_value: Option<usize>) -> Self {
        if let Some(v) = override_value {
            self.index_concurrency = v.clamp(1, 8);
        }
        self
    }
}

fn env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

fn env_u32(key: &str) -> Option<u32> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}
