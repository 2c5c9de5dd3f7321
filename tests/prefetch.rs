//! Integration tests for the prefetch worker, driven by a scripted source.

use async_trait::async_trait;
use bytes::Bytes;
use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};

use quickpeek::{EndOfFeed, MediaRecord, MediaSource, PrefetchQueue};

/// Produces `<feed>/<n>` image records. With a gate, every production
/// waits for one permit; `started` is signalled as each production begins.
struct ScriptedSource {
    feed: String,
    produced: usize,
    limit: Option<usize>,
    gate: Option<Arc<Semaphore>>,
    started: Option<mpsc::UnboundedSender<String>>,
}

impl ScriptedSource {
    fn new(feed: &str) -> Self {
        Self {
            feed: feed.to_string(),
            produced: 0,
            limit: None,
            gate: None,
            started: None,
        }
    }
}

#[async_trait]
impl MediaSource for ScriptedSource {
    async fn next_media(&mut self) -> Result<MediaRecord, EndOfFeed> {
        if let Some(started) = &self.started {
            let _ = started.send(self.feed.clone());
        }
        if let Some(gate) = &self.gate {
            gate.acquire().await.expect("gate closed").forget();
        }
        if self.limit.is_some_and(|limit| self.produced >= limit) {
            return Err(EndOfFeed::TooManyUnresolved { unresolved: 75 });
        }
        self.produced += 1;
        Ok(MediaRecord::Image {
            url: format!("{}/{}", self.feed, self.produced),
            data: Bytes::new(),
        })
    }

    fn reset(&mut self, feed: &str) {
        self.feed = feed.to_string();
        self.produced = 0;
    }
}

fn url_of(record: Option<MediaRecord>) -> String {
    record
        .and_then(|r| r.url().map(str::to_string))
        .unwrap_or_else(|| "<none>".to_string())
}

async fn recv_timeout(handle: &mut quickpeek::PrefetchHandle) -> Option<MediaRecord> {
    tokio::time::timeout(Duration::from_secs(5), handle.recv())
        .await
        .expect("delivery timed out")
}

#[tokio::test]
async fn test_delivers_in_production_order() {
    let mut handle = PrefetchQueue::spawn(ScriptedSource::new("pics"), 3);

    let mut urls = Vec::new();
    for _ in 0..6 {
        handle.request_next();
        urls.push(url_of(recv_timeout(&mut handle).await));
    }

    assert_eq!(urls, vec!["pics/1", "pics/2", "pics/3", "pics/4", "pics/5", "pics/6"]);
    handle.stop().await;
}

#[tokio::test]
async fn test_nothing_produced_before_first_request() {
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::new("pics");
    source.started = Some(started_tx);

    let handle = PrefetchQueue::spawn(source, 3);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(started_rx.try_recv().is_err());
    handle.stop().await;
}

#[tokio::test]
async fn test_exhaustion_yields_sentinel_repeatedly() {
    let mut source = ScriptedSource::new("tiny");
    source.limit = Some(1);
    let mut handle = PrefetchQueue::spawn(source, 4);

    handle.request_next();
    assert_eq!(url_of(recv_timeout(&mut handle).await), "tiny/1");

    handle.request_next();
    assert_eq!(recv_timeout(&mut handle).await, Some(MediaRecord::Exhausted));

    handle.request_next();
    assert_eq!(recv_timeout(&mut handle).await, Some(MediaRecord::Exhausted));
    handle.stop().await;
}

#[tokio::test]
async fn test_reset_revives_exhausted_queue() {
    let mut source = ScriptedSource::new("tiny");
    source.limit = Some(2);
    let mut handle = PrefetchQueue::spawn(source, 1);

    for expected in ["tiny/1", "tiny/2"] {
        handle.request_next();
        assert_eq!(url_of(recv_timeout(&mut handle).await), expected);
    }
    handle.request_next();
    assert_eq!(recv_timeout(&mut handle).await, Some(MediaRecord::Exhausted));

    // other/1 is the discarded first production after the reset
    handle.reset("other");
    assert_eq!(url_of(recv_timeout(&mut handle).await), "other/2");
    handle.stop().await;
}

#[tokio::test]
async fn test_reset_discards_in_flight_production() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::new("old");
    source.gate = Some(gate.clone());
    source.started = Some(started_tx);

    let mut handle = PrefetchQueue::spawn(source, 2);
    handle.request_next();
    assert_eq!(started_rx.recv().await.as_deref(), Some("old"));

    // The production for "old" is blocked on the gate
    handle.reset("new");
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(1);

    // The next production must start after the reset, against the new feed
    assert_eq!(started_rx.recv().await.as_deref(), Some("new"));
    gate.add_permits(1);

    assert_eq!(url_of(recv_timeout(&mut handle).await), "new/1");
    assert!(handle.try_recv().is_none());
    handle.stop().await;
}

#[tokio::test]
async fn test_back_to_back_resets_discard_one_production() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::new("a");
    source.gate = Some(gate.clone());
    source.started = Some(started_tx);

    let mut handle = PrefetchQueue::spawn(source, 1);
    handle.request_next();
    assert_eq!(started_rx.recv().await.as_deref(), Some("a"));

    // Both resets land while a/1 is blocked
    handle.reset("b");
    handle.reset("c");
    tokio::time::sleep(Duration::from_millis(50)).await;
    gate.add_permits(1);

    assert_eq!(started_rx.recv().await.as_deref(), Some("c"));
    gate.add_permits(1);
    assert_eq!(url_of(recv_timeout(&mut handle).await), "c/1");
    handle.stop().await;
}

#[tokio::test]
async fn test_reset_clears_buffered_records() {
    let mut handle = PrefetchQueue::spawn(ScriptedSource::new("a"), 3);

    handle.request_next();
    assert_eq!(url_of(recv_timeout(&mut handle).await), "a/1");
    // Let the worker fill its cache with a/2..a/4
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The worker is idle with a full cache; b/1 is still discarded
    handle.reset("b");
    assert_eq!(url_of(recv_timeout(&mut handle).await), "b/2");
    handle.request_next();
    assert_eq!(url_of(recv_timeout(&mut handle).await), "b/3");
    handle.stop().await;
}

#[tokio::test]
async fn test_stop_interrupts_blocked_production() {
    let gate = Arc::new(Semaphore::new(0));
    let (started_tx, mut started_rx) = mpsc::unbounded_channel();
    let mut source = ScriptedSource::new("slow");
    source.gate = Some(gate);
    source.started = Some(started_tx);

    let handle = PrefetchQueue::spawn(source, 2);
    handle.request_next();
    started_rx.recv().await;

    tokio::time::timeout(Duration::from_secs(5), handle.stop())
        .await
        .expect("stop should not wait for the blocked production");
}
