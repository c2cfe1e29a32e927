//! Bounded embedding queue: accepts fingerprint strings for components and
//! metadata entities, batches them (default 32), and flushes through an
//! [`EmbeddingService`]. Skips re-embedding an entity whose `content_hash`
//! hasn't changed since the last flush (idempotent flush). Backpressure is
//! the channel capacity itself — `enqueue` awaits a bounded `mpsc::Sender`,
//! matching spec §5 "embedding queue... enforce bounded memory; the
//! orchestrator respects their backpressure by awaiting `enqueue`".
//!
//! Grounded on the teacher's `embeddings::EmbeddingProvider` trait and its
//! batch-sized local provider; the ONNX placeholder below intentionally
//! keeps the teacher's own `// TODO` — no model is actually wired up here
//! either.

use crate::contracts::EmbeddingService;
use crate::error::{FelixError, Result};
use crate::types::EntityKind;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct QueueItem {
    pub entity_kind: EntityKind,
    pub entity_id: String,
    pub fingerprint_source: String,
}

/// Hash used for `Embedding::content_hash` / invalidation checks.
pub fn content_hash(fingerprint_source: &str) -> String {
    format!("{:016x}", xxh3_64(fingerprint_source.as_bytes()))
}

pub struct EmbeddingQueueConfig {
    pub batch_size: usize,
    pub channel_capacity: usize,
}

impl Default for EmbeddingQueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 32,
            channel_capacity: 256,
        }
    }
}

pub struct EmbeddingQueue {
    tx: mpsc::Sender<QueueItem>,
}

impl EmbeddingQueue {
    /// Spawn the queue's consumer task. `on_batch` is invoked with every
    /// drained batch and is responsible for the idempotent-skip + store
    /// write (kept outside this module so the queue has no store
    /// dependency of its own).
    pub fn spawn<F, Fut>(config: EmbeddingQueueConfig, on_batch: F) -> Self
    where
        F: Fn(Vec<(QueueItem, String)>) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::channel::<QueueItem>(config.channel_capacity);
        let on_batch = Arc::new(on_batch);

        tokio::spawn(async move {
            let mut buffer = Vec::with_capacity(config.batch_size);
            loop {
                let Some(first) = rx.recv().await else {
                    if !buffer.is_empty() {
                        flush(&on_batch, std::mem::take(&mut buffer)).await;
                    }
                    break;
                };
                buffer.push(first);

                while buffer.len() < config.batch_size {
                    match rx.try_recv() {
                        Ok(item) => buffer.push(item),
                        Err(_) => break,
                    }
                }
                flush(&on_batch, std::mem::take(&mut buffer)).await;
            }
        });

        Self { tx }
    }

    /// Enqueue an item; backpressures the caller when the channel is full.
    pub async fn enqueue(&self, item: QueueItem) -> Result<()> {
        self.tx
            .send(item)
            .await
            .map_err(|_| FelixError::Fatal(anyhow::anyhow!("embedding queue closed")))
    }
}

async fn flush<F, Fut>(on_batch: &Arc<F>, batch: Vec<QueueItem>)
where
    F: Fn(Vec<(QueueItem, String)>) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = ()> + Send + 'static,
{
    if batch.is_empty() {
        return;
    }
    let with_hashes: Vec<_> = batch
        .into_iter()
        .map(|item| {
            let hash = content_hash(&item.fingerprint_source);
            (item, hash)
        })
        .collect();
    on_batch(with_hashes).await;
}

/// Stand-in local embedding service (spec §6.3). A real deployment swaps
/// this for an ONNX-backed provider; no model is loaded here, so the
/// vectors are deterministic and dimension-correct but not semantically
/// meaningful.
pub struct LocalEmbeddingService {
    model_id: String,
    dimension: usize,
}

impl LocalEmbeddingService {
    pub fn new(dimension: usize) -> Self {
        Self {
            model_id: "local-stub-v1".to_string(),
            dimension,
        }
    }

    // TODO: load an ONNX model + tokenizer here and replace `run_inference`
    // with real inference once a model path is configured.
    fn run_inference(&self, inputs: &[String]) -> Vec<Vec<f32>> {
        inputs
            .iter()
            .map(|text| {
                let seed = xxh3_64(text.as_bytes());
                (0..self.dimension)
                    .map(|i| {
                        let v = seed.wrapping_add(i as u64 * 2654435761);
                        ((v % 2000) as f32 / 1000.0) - 1.0
                    })
                    .collect()
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl EmbeddingService for LocalEmbeddingService {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = inputs.len(), "embedding batch");
        let vectors = self.run_inference(inputs);
        if vectors.len() != inputs.len() {
            warn!("embedding provider returned mismatched batch size");
        }
        Ok(vectors)
    }
}
