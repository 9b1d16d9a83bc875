//! Initial board snapshot loading.
//!
//! The board bytes and the dimension message that explains how to interpret
//! them arrive independently, so the fetch starts once at startup and its
//! result is memoized: every decoder entry point awaits the same shared
//! pending value and behaves identically regardless of which side resolves
//! first.
//!
//! Failures retry with exponential backoff starting at [`INITIAL_BACKOFF`];
//! once the *next* delay would cross [`BACKOFF_CEILING`] the loader gives up
//! (the just-scheduled retry is never slept) and the permanent failure is
//! surfaced on the event bus.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::event::{emit, EventSender, SyncEvent};

/// First retry delay after a failed fetch.
pub const INITIAL_BACKOFF: Duration = Duration::from_millis(50);

/// Give up once the next computed delay would exceed this.
pub const BACKOFF_CEILING: Duration = Duration::from_millis(8000);

/// A transient snapshot fetch failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub reason: String,
}

impl FetchError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "snapshot fetch failed: {}", self.reason)
    }
}

impl std::error::Error for FetchError {}

/// Transport seam for fetching the raw snapshot bytes.
#[async_trait]
pub trait SnapshotFetch: Send + Sync + 'static {
    /// GET the given URL and return the body bytes.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// Default fetcher backed by `reqwest`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetch {
    client: reqwest::Client,
}

impl HttpFetch {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SnapshotFetch for HttpFetch {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|err| FetchError::new(err.to_string()))?;
        if !response.status().is_success() {
            return Err(FetchError::new(format!("status {}", response.status())));
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::new(err.to_string()))?;
        Ok(body.to_vec())
    }
}

/// The single shared pending snapshot.
///
/// The outer `Option` in the watch value distinguishes "not resolved yet"
/// from resolved; the inner one distinguishes fetched bytes from permanent
/// failure, which downstream board setup treats as fatal.
#[derive(Debug, Clone)]
pub struct SnapshotLoader {
    result: watch::Receiver<Option<Option<Vec<u8>>>>,
}

impl SnapshotLoader {
    /// Kick off the fetch-with-retry task once and memoize its result.
    pub fn start<F: SnapshotFetch>(fetcher: F, url: impl Into<String>, events: EventSender) -> Self {
        let (tx, rx) = watch::channel(None);
        let url = url.into();
        tokio::spawn(async move {
            let outcome = fetch_with_retry(&fetcher, &url, &events).await;
            let _ = tx.send(Some(outcome));
        });
        Self { result: rx }
    }

    /// Build an already-resolved loader. Test seam for decoder entry points.
    #[cfg(test)]
    pub(crate) fn resolved(outcome: Option<Vec<u8>>) -> Self {
        let (tx, rx) = watch::channel(Some(outcome));
        // Keep the sender alive for the receiver's lifetime.
        std::mem::forget(tx);
        Self { result: rx }
    }

    /// Await the shared result: snapshot bytes, or `None` after give-up.
    ///
    /// Every consumer that needs the decoded board awaits this; the result
    /// is produced once and cloned to each caller.
    pub async fn wait(&self) -> Option<Vec<u8>> {
        let mut result = self.result.clone();
        let resolved = result
            .wait_for(|value| value.is_some())
            .await
            .ok()?
            .clone();
        resolved.flatten()
    }
}

/// Append a cache-defeating query parameter so intermediaries never serve a
/// stale board.
fn cache_busted(url: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}ts={}", url, separator, Utc::now().timestamp_millis())
}

async fn fetch_with_retry<F: SnapshotFetch>(
    fetcher: &F,
    url: &str,
    events: &EventSender,
) -> Option<Vec<u8>> {
    let mut delay = INITIAL_BACKOFF;
    let mut attempt: u32 = 1;
    loop {
        match fetcher.fetch(&cache_busted(url)).await {
            Ok(bytes) => {
                debug!(attempt, len = bytes.len(), "snapshot fetched");
                return Some(bytes);
            }
            Err(err) => {
                warn!(attempt, %err, "snapshot fetch attempt failed");
                emit(events, SyncEvent::SnapshotAttemptFailed { attempt });

                let next = delay * 2;
                if next > BACKOFF_CEILING {
                    warn!("snapshot backoff ceiling crossed; giving up");
                    emit(events, SyncEvent::SnapshotFailed);
                    return None;
                }
                tokio::time::sleep(delay).await;
                delay = next;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    /// Scripted fetcher: pops one canned response per attempt.
    struct MockFetch {
        responses: Mutex<VecDeque<Result<Vec<u8>, FetchError>>>,
    }

    impl MockFetch {
        fn scripted(
            responses: impl IntoIterator<Item = Result<Vec<u8>, FetchError>>,
        ) -> Self {
            Self {
                responses: Mutex::new(responses.into_iter().collect()),
            }
        }
    }

    #[async_trait]
    impl SnapshotFetch for MockFetch {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(FetchError::new("exhausted")))
        }
    }

    fn bus() -> (EventSender, super::super::event::EventReceiver) {
        mpsc::unbounded_channel()
    }

    #[tokio::test]
    async fn test_success_first_try() {
        let (tx, mut events) = bus();
        let loader = SnapshotLoader::start(MockFetch::scripted([Ok(vec![1, 2, 3])]), "http://x/board", tx);
        assert_eq!(loader.wait().await, Some(vec![1, 2, 3]));
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_result_is_memoized_for_every_consumer() {
        let (tx, _events) = bus();
        let loader =
            SnapshotLoader::start(MockFetch::scripted([Ok(vec![9])]), "http://x/board", tx);
        // Join-order independence: both sides of the race see the same value.
        let early = loader.wait().await;
        let late = loader.wait().await;
        assert_eq!(early, Some(vec![9]));
        assert_eq!(late, Some(vec![9]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_then_success() {
        let (tx, mut events) = bus();
        let loader = SnapshotLoader::start(
            MockFetch::scripted([
                Err(FetchError::new("503")),
                Err(FetchError::new("503")),
                Ok(vec![5]),
            ]),
            "http://x/board",
            tx,
        );
        assert_eq!(loader.wait().await, Some(vec![5]));
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::SnapshotAttemptFailed { attempt: 1 }
        );
        assert_eq!(
            events.try_recv().unwrap(),
            SyncEvent::SnapshotAttemptFailed { attempt: 2 }
        );
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_at_backoff_ceiling() {
        let (tx, mut events) = bus();
        let loader = SnapshotLoader::start(
            MockFetch::scripted(std::iter::repeat_with(|| Err(FetchError::new("down"))).take(20)),
            "http://x/board",
            tx,
        );
        assert_eq!(loader.wait().await, None);

        // Delays slept: 50, 100, ..., 3200 -- eight attempts in total, the
        // 6400 ms retry is cancelled because its successor would cross 8000.
        let mut attempts = 0;
        let mut timed_out = false;
        while let Ok(event) = events.try_recv() {
            match event {
                SyncEvent::SnapshotAttemptFailed { .. } => attempts += 1,
                SyncEvent::SnapshotFailed => timed_out = true,
                other => panic!("unexpected event {:?}", other),
            }
        }
        assert_eq!(attempts, 8);
        assert!(timed_out);
    }

    #[test]
    fn test_cache_busting_parameter() {
        let url = cache_busted("http://x/board");
        assert!(url.starts_with("http://x/board?ts="));
        let url = cache_busted("http://x/board?v=2");
        assert!(url.starts_with("http://x/board?v=2&ts="));
    }
}
