// Centralized observability infrastructure for the indexing/query engine.
// Structured logging, phase timers and atomic counters used across the
// pipeline, independent of any specific transport.

use anyhow::Result;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, instrument};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static FILES_INDEXED: AtomicU64 = AtomicU64::new(0);
static PARSE_ERRORS: AtomicU64 = AtomicU64::new(0);
static RESOLVE_PASSES: AtomicU64 = AtomicU64::new(0);
static QUERIES_EXECUTED: AtomicU64 = AtomicU64::new(0);

/// Initialize logging with the crate's default verbosity policy.
pub fn init_logging() -> Result<()> {
    init_logging_with_level(false, false)
}

/// Initialize logging with explicit verbose/quiet flags.
///
/// `RUST_LOG` overrides the flag-derived filter unless `quiet` is set, in
/// which case quiet always wins.
pub fn init_logging_with_level(verbose: bool, quiet: bool) -> Result<()> {
    let filter_level = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("felix_index=debug,info")
    } else {
        EnvFilter::new("felix_index=warn,error")
    };

    let env_filter = if quiet {
        EnvFilter::new("error")
    } else if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::try_from_default_env().unwrap_or(filter_level)
    } else {
        filter_level
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(!quiet)
        .with_thread_ids(!quiet)
        .with_line_number(!quiet)
        .with_file(!quiet)
        .with_ansi(true);

    match tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
    {
        Ok(()) => {
            if !quiet {
                info!("felix-index observability initialized");
            }
            Ok(())
        }
        Err(_) => Ok(()), // already initialized; fine in tests
    }
}

/// Named pipeline phases, used both for tracing spans and phase timing
/// reports returned to callers of the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Discovery,
    ParseAndPersist,
    Resolve,
    EmbedComponents,
    EmbedTasks,
    EmbedNotes,
    EmbedRules,
    Docs,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Discovery => "discovery",
            Phase::ParseAndPersist => "parse+persist",
            Phase::Resolve => "resolve",
            Phase::EmbedComponents => "embed.components",
            Phase::EmbedTasks => "embed.tasks",
            Phase::EmbedNotes => "embed.notes",
            Phase::EmbedRules => "embed.rules",
            Phase::Docs => "docs",
        }
    }
}

/// A single phase timing record, emitted by the orchestrator.
#[derive(Debug, Clone, serde::Serialize)]
pub struct PhaseTiming {
    pub phase: &'static str,
    pub duration_ms: u64,
}

/// Measures a phase, logs its completion, and returns the elapsed timing
/// alongside the wrapped closure's result.
pub fn time_phase<T>(phase: Phase, f: impl FnOnce() -> T) -> (T, PhaseTiming) {
    let start = Instant::now();
    let result = f();
    let elapsed = start.elapsed();
    info!(phase = phase.label(), elapsed_ms = elapsed.as_millis(), "phase complete");
    (
        result,
        PhaseTiming {
            phase: phase.label(),
            duration_ms: elapsed.as_millis() as u64,
        },
    )
}

/// Trace context threaded through a single pipeline run (one per
/// `index_directory`/`index_file`/`reconcile` invocation).
#[derive(Debug, Clone)]
pub struct RunContext {
    pub trace_id: Uuid,
    start_time: Instant,
}

impl RunContext {
    pub fn new() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            start_time: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Run a closure under a tracing span tagged with the run's trace id.
#[instrument(skip(ctx, f))]
pub fn with_trace_id<T>(ctx: &RunContext, label: &str, f: impl FnOnce() -> T) -> T {
    info!(trace_id = %ctx.trace_id, label, "entering span");
    f()
}

pub fn record_file_indexed() {
    FILES_INDEXED.fetch_add(1, Ordering::Relaxed);
}

pub fn record_parse_error() {
    PARSE_ERRORS.fetch_add(1, Ordering::Relaxed);
}

pub fn record_resolve_pass() {
    RESOLVE_PASSES.fetch_add(1, Ordering::Relaxed);
}

pub fn record_query_executed() {
    QUERIES_EXECUTED.fetch_add(1, Ordering::Relaxed);
}

/// Snapshot of process-wide counters, for health/metrics endpoints owned by
/// an external transport.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct CounterSnapshot {
    pub files_indexed: u64,
    pub parse_errors: u64,
    pub resolve_passes: u64,
    pub queries_executed: u64,
}

pub fn counters() -> CounterSnapshot {
    CounterSnapshot {
        files_indexed: FILES_INDEXED.load(Ordering::Relaxed),
        parse_errors: PARSE_ERRORS.load(Ordering::Relaxed),
        resolve_passes: RESOLVE_PASSES.load(Ordering::Relaxed),
        queries_executed: QUERIES_EXECUTED.load(Ordering::Relaxed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_timing_reports_elapsed() {
        let (value, timing) = time_phase(Phase::Discovery, || {
            std::thread::sleep(Duration::from_millis(1));
            42
        });
        assert_eq!(value, 42);
        assert_eq!(timing.phase, "discovery");
    }

    #[test]
    fn counters_increment() {
        let before = counters().files_indexed;
        record_file_indexed();
        assert_eq!(counters().files_indexed, before + 1);
    }
}
