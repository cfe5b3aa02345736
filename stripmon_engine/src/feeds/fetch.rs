//! Cancellable background fetch with generation tagging.
//!
//! Network-fed miners start a fetch at their own cadence and keep polling
//! at the graph cadence; the result crosses back into the polling context
//! through a channel. Each `begin` supersedes the previous fetch: the old
//! task is aborted, and should its result already be in flight, the
//! generation check discards it on receipt. Late, lost, or malformed
//! deliveries never block unrelated miners.

use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::debug;

pub const FETCH_USER_AGENT: &str = concat!("stripmon/", env!("CARGO_PKG_VERSION"));
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

type Delivery<T> = (u64, Result<T, String>);

pub struct FetchTask<T> {
    generation: u64,
    handle: Option<JoinHandle<()>>,
    tx: UnboundedSender<Delivery<T>>,
    rx: UnboundedReceiver<Delivery<T>>,
}

impl<T: Send + 'static> FetchTask<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            generation: 0,
            handle: None,
            tx,
            rx,
        }
    }

    pub fn is_loading(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start a fetch, superseding any fetch still in flight.
    pub fn begin<F>(&mut self, fut: F)
    where
        F: Future<Output = Result<T, String>> + Send + 'static,
    {
        self.cancel();
        self.generation += 1;
        let generation = self.generation;
        let tx = self.tx.clone();
        self.handle = Some(tokio::spawn(async move {
            let result = fut.await;
            let _ = tx.send((generation, result));
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }

    /// Non-blocking poll for the current generation's result. Results from
    /// superseded generations are discarded here, never surfaced.
    pub fn try_take(&mut self) -> Option<Result<T, String>> {
        loop {
            match self.rx.try_recv() {
                Ok((generation, result)) if generation == self.generation => {
                    self.handle = None;
                    return Some(result);
                }
                Ok((generation, _)) => {
                    debug!(
                        got = generation,
                        current = self.generation,
                        "discarding superseded fetch result"
                    );
                }
                Err(_) => return None,
            }
        }
    }
}

impl<T: Send + 'static> Default for FetchTask<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Drop for FetchTask<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(FETCH_USER_AGENT)
        .timeout(FETCH_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// GET a text document, treating non-2xx statuses as failures.
pub async fn fetch_text(client: &reqwest::Client, url: &str) -> Result<String, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let response = response.error_for_status().map_err(|e| e.to_string())?;
    response.text().await.map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    #[tokio::test]
    async fn delivers_current_generation_result() {
        let mut task: FetchTask<u32> = FetchTask::new();
        task.begin(async { Ok(7) });
        sleep(Duration::from_millis(30)).await;
        assert_eq!(task.try_take(), Some(Ok(7)));
        assert!(task.try_take().is_none());
    }

    #[tokio::test]
    async fn superseded_fetch_is_discarded() {
        let mut task: FetchTask<u32> = FetchTask::new();
        task.begin(async {
            sleep(Duration::from_millis(10)).await;
            Ok(1)
        });
        // Supersede immediately; generation 1's result must never surface.
        task.begin(async { Ok(2) });
        sleep(Duration::from_millis(60)).await;
        assert_eq!(task.try_take(), Some(Ok(2)));
        assert!(task.try_take().is_none());
    }

    #[tokio::test]
    async fn cancel_prevents_delivery() {
        let mut task: FetchTask<u32> = FetchTask::new();
        task.begin(async {
            sleep(Duration::from_millis(10)).await;
            Ok(1)
        });
        task.cancel();
        sleep(Duration::from_millis(50)).await;
        assert!(task.try_take().is_none());
        assert!(!task.is_loading());
    }

    #[tokio::test]
    async fn errors_are_delivered_not_dropped() {
        let mut task: FetchTask<u32> = FetchTask::new();
        task.begin(async { Err("timed out".to_string()) });
        sleep(Duration::from_millis(30)).await;
        assert_eq!(task.try_take(), Some(Err("timed out".to_string())));
    }
}
