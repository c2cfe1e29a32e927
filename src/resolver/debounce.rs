// Timer-reset debounce primitive (spec §9 "Debounced operations"): each
// `trigger` cancels the previously scheduled callback and reschedules a
// fresh one. The callback passed to the latest `trigger` call captures
// whatever state is current *then*, so a fired callback always observes
// the latest state rather than the state at the original scheduling time.

use std::future::Future;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub struct Debouncer {
    delay: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: Mutex::new(None),
        }
    }

    /// Schedule `callback` to run after the debounce delay, canceling any
    /// still-pending callback from an earlier `trigger` call.
    pub async fn trigger<F>(&self, callback: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut pending = self.pending.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let delay = self.delay;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            callback.await;
        }));
    }
}
