// Single-writer mailbox (spec §9 "Single-writer lane"): write operations
// are submitted as boxed futures with a reply channel; one task drains the
// mailbox and runs them one at a time, retrying transient contention with
// exponential backoff. Grounded on the teacher's `RetryableStorage` backoff
// schedule, generalized from call-site retries to a lane-owned retry loop.
//
// Retries re-invoke a factory rather than the job itself: a `FnOnce` job
// can only run once, so the caller hands the lane a `Fn` that produces a
// fresh attempt on demand (mirroring `RetryableStorage::insert` calling
// `self.inner.insert(doc.clone())` again on each attempt).

use crate::config::EngineConfig;
use crate::error::{FelixError, Result};
use futures::future::BoxFuture;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::warn;

/// What a write-lane job reports back, distinguishing retryable contention
/// from an error the lane should propagate immediately (spec §4.3: "Contention
/// → retry with backoff; other errors → propagate").
pub enum JobOutcome {
    Ok,
    Contention,
    Fatal(anyhow::Error),
}

type JobFactory<T> = Box<dyn Fn(Arc<T>) -> BoxFuture<'static, JobOutcome> + Send>;

struct Envelope<T> {
    label: &'static str,
    make_job: JobFactory<T>,
    reply: oneshot::Sender<Result<()>>,
}

pub struct WriteLane<T> {
    tx: mpsc::Sender<Envelope<T>>,
}

impl<T: Send + Sync + 'static> WriteLane<T> {
    pub fn new(state: Arc<T>, config: EngineConfig) -> Self {
        let (tx, mut rx) = mpsc::channel::<Envelope<T>>(512);

        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let result =
                    run_with_retry(state.clone(), envelope.label, envelope.make_job.as_ref(), &config).await;
                let _ = envelope.reply.send(result);
            }
        });

        Self { tx }
    }

    /// Submit a write operation; `make_job` may be called more than once
    /// if the lane retries after contention. Awaits until the lane has
    /// executed it (including retries) and reports the outcome.
    pub async fn submit<F>(&self, label: &'static str, make_job: F) -> Result<()>
    where
        F: Fn(Arc<T>) -> BoxFuture<'static, JobOutcome> + Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                label,
                make_job: Box::new(make_job),
                reply: reply_tx,
            })
            .await
            .map_err(|_| FelixError::Fatal(anyhow::anyhow!("write lane closed")))?;

        reply_rx
            .await
            .map_err(|_| FelixError::Fatal(anyhow::anyhow!("write lane dropped reply")))?
    }
}

async fn run_with_retry<T>(
    state: Arc<T>,
    label: &'static str,
    make_job: &JobFactory<T>,
    config: &EngineConfig,
) -> Result<()> {
    let mut attempt = 0u32;
    let mut delay_ms = config.store_retry_initial_ms;

    loop {
        attempt += 1;
        match make_job(state.clone()).await {
            JobOutcome::Ok => return Ok(()),
            JobOutcome::Fatal(err) => {
                warn!(label, attempt, error = %err, "write lane job failed, not retrying");
                return Err(FelixError::Store(err));
            }
            JobOutcome::Contention if attempt >= config.store_retry_max_attempts => {
                warn!(label, attempt, "write lane exhausted retries");
                return Err(FelixError::StoreContentionExhausted {
                    operation: label.to_string(),
                    attempts: attempt,
                });
            }
            JobOutcome::Contention => {
                warn!(label, attempt, "write lane retrying after contention");
                tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
                delay_ms = (delay_ms * 2).min(config.store_retry_max_ms);
            }
        }
    }
}
