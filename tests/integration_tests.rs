//! Integration tests driving the full feed lifecycle with scripted sources

use async_trait::async_trait;
use depthbook::{
    data::{BookConfig, FeedConfig, RawSnapshot, Side},
    error::{EngineError, SnapshotFetchError, StreamError},
    feed::{DeltaSource, FeedDriver},
    retry::RetryPolicy,
    snapshot::SnapshotSource,
    state::BookStatus,
    store::OrderBookStore,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

struct MockSnapshots {
    responses: Mutex<VecDeque<Result<RawSnapshot, SnapshotFetchError>>>,
}

impl MockSnapshots {
    fn new(responses: Vec<Result<RawSnapshot, SnapshotFetchError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
        }
    }
}

#[async_trait]
impl SnapshotSource for MockSnapshots {
    async fn fetch(&self) -> Result<RawSnapshot, SnapshotFetchError> {
        self.responses.lock().unwrap().pop_front().unwrap_or_else(|| {
            Err(SnapshotFetchError::Network(
                "no more scripted snapshots".to_string(),
            ))
        })
    }
}

enum Scripted {
    Message(&'static str),
    Fail(StreamError),
    Close,
    /// Hang far past any idle timeout
    Silence,
}

struct ScriptedDeltas {
    script: VecDeque<Scripted>,
}

impl ScriptedDeltas {
    fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl DeltaSource for ScriptedDeltas {
    async fn next(&mut self) -> Result<Option<String>, StreamError> {
        match self.script.pop_front() {
            Some(Scripted::Message(raw)) => Ok(Some(raw.to_string())),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Close) | None => Ok(None),
            Some(Scripted::Silence) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(None)
            }
        }
    }
}

fn snapshot(bids: Vec<(Decimal, Decimal)>, asks: Vec<(Decimal, Decimal)>) -> RawSnapshot {
    RawSnapshot { bids, asks }
}

fn feed_config(reconnect_attempts: u32) -> FeedConfig {
    FeedConfig {
        coalesce_window: Duration::ZERO,
        coalesce_max_pending: 32,
        idle_timeout: Duration::from_millis(200),
        reconnect: RetryPolicy::builder()
            .max_attempts(reconnect_attempts)
            .initial_delay(Duration::from_millis(1))
            .jitter(false)
            .build(),
    }
}

#[tokio::test(start_paused = true)]
async fn test_sync_then_live_deltas_until_stream_ends() {
    let store = Arc::new(OrderBookStore::new());
    let token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    let snapshots = MockSnapshots::new(vec![Ok(snapshot(
        vec![(dec!(100), dec!(2))],
        vec![(dec!(101), dec!(1))],
    ))]);
    let deltas = ScriptedDeltas::new(vec![
        Scripted::Message(r#"{"b":[["100","3"],["99","1"]]}"#),
        Scripted::Close,
    ]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(0)).unwrap();
    let result = driver.run(token).await;

    // No reconnect budget: the clean close becomes a fatal stream error
    assert!(matches!(result, Err(EngineError::FatalStream(_))));
    assert_eq!(store.get_status(), BookStatus::Stale);

    // The delta batch was applied before the stream ended
    let bids = store.get_levels(Side::Bid, 10);
    assert_eq!(bids.len(), 2);
    assert_eq!(bids[0].price, dec!(100));
    assert_eq!(bids[0].size, dec!(3));
    assert_eq!(bids[1].price, dec!(99));
}

#[tokio::test(start_paused = true)]
async fn test_resync_fully_replaces_stale_working_set() {
    let store = Arc::new(OrderBookStore::new());
    let token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    let snapshots = MockSnapshots::new(vec![
        Ok(snapshot(vec![(dec!(100), dec!(2))], vec![(dec!(101), dec!(1))])),
        Ok(snapshot(vec![(dec!(200), dec!(5))], vec![(dec!(201), dec!(1))])),
    ]);
    let deltas = ScriptedDeltas::new(vec![
        Scripted::Message(r#"{"b":[["100","9"]]}"#),
        Scripted::Fail(StreamError::Transport("socket reset".to_string())),
        Scripted::Message(r#"{"b":[["200","7"]]}"#),
        Scripted::Close,
    ]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(2)).unwrap();
    let result = driver.run(token).await;

    assert!(matches!(result, Err(EngineError::FatalStream(_))));

    // Nothing from the pre-failure book survives the resync; the post-resync
    // delta landed on the fresh snapshot.
    let bids = store.get_levels(Side::Bid, 10);
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].price, dec!(200));
    assert_eq!(bids[0].size, dec!(7));

    let asks = store.get_levels(Side::Ask, 10);
    assert_eq!(asks.len(), 1);
    assert_eq!(asks[0].price, dec!(201));
}

#[tokio::test(start_paused = true)]
async fn test_unsubscribe_prevents_late_snapshot_apply() {
    let store = Arc::new(OrderBookStore::new());
    let token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    // Cancelled before the driver gets to run
    store.unsubscribe();

    let snapshots = MockSnapshots::new(vec![Ok(snapshot(
        vec![(dec!(100), dec!(2))],
        vec![(dec!(101), dec!(1))],
    ))]);
    let deltas = ScriptedDeltas::new(vec![Scripted::Close]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(0)).unwrap();
    let result = driver.run(token).await;

    // The driver exits quietly; the late snapshot never touched the store
    assert!(result.is_ok());
    assert_eq!(store.get_status(), BookStatus::Uninitialized);
    assert!(store.view().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_resubscribe_supersedes_inflight_driver() {
    let store = Arc::new(OrderBookStore::new());
    let old_token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    // Instrument switch while the old feed is still in flight
    store.subscribe("ETH/USD", BookConfig::default()).unwrap();

    let snapshots = MockSnapshots::new(vec![Ok(snapshot(
        vec![(dec!(100), dec!(2))],
        vec![(dec!(101), dec!(1))],
    ))]);
    let deltas = ScriptedDeltas::new(vec![Scripted::Close]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(0)).unwrap();
    let result = driver.run(old_token).await;

    assert!(result.is_ok());
    assert_eq!(store.view().instrument, "ETH/USD");
    assert_eq!(store.get_status(), BookStatus::Syncing);
    assert!(store.view().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_threshold_marks_stale() {
    let store = Arc::new(OrderBookStore::new());
    let mut config = BookConfig::default();
    config.malformed_threshold = 2;
    let token = store.subscribe("BTC/USD", config).unwrap();

    let snapshots = MockSnapshots::new(vec![Ok(snapshot(
        vec![(dec!(100), dec!(2))],
        vec![(dec!(101), dec!(1))],
    ))]);
    let deltas = ScriptedDeltas::new(vec![
        Scripted::Message("garbage"),
        Scripted::Message("more garbage"),
        Scripted::Close,
    ]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(0)).unwrap();
    let result = driver.run(token).await;

    assert!(matches!(result, Err(EngineError::FatalStream(_))));
    assert_eq!(store.get_status(), BookStatus::Stale);

    // The garbage never touched the book
    let bids = store.get_levels(Side::Bid, 10);
    assert_eq!(bids.len(), 1);
    assert_eq!(bids[0].size, dec!(2));
}

#[tokio::test(start_paused = true)]
async fn test_idle_timeout_marks_stale() {
    let store = Arc::new(OrderBookStore::new());
    let token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    let snapshots = MockSnapshots::new(vec![Ok(snapshot(
        vec![(dec!(100), dec!(2))],
        vec![(dec!(101), dec!(1))],
    ))]);
    let deltas = ScriptedDeltas::new(vec![Scripted::Silence]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(0)).unwrap();
    let result = driver.run(token).await;

    assert!(matches!(result, Err(EngineError::FatalStream(_))));
    assert_eq!(store.get_status(), BookStatus::Stale);
}

#[tokio::test(start_paused = true)]
async fn test_initial_snapshot_failure_is_surfaced() {
    let store = Arc::new(OrderBookStore::new());
    let token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    let snapshots = MockSnapshots::new(vec![Err(SnapshotFetchError::Status(502))]);
    let deltas = ScriptedDeltas::new(vec![Scripted::Close]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(0)).unwrap();
    let result = driver.run(token).await;

    assert!(matches!(
        result,
        Err(EngineError::Snapshot(SnapshotFetchError::Status(502)))
    ));

    // The book kept its prior (empty, still-syncing) state
    assert_eq!(store.get_status(), BookStatus::Syncing);
    assert!(store.view().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_failed_resync_attempts_are_bounded() {
    let store = Arc::new(OrderBookStore::new());
    let token = store.subscribe("BTC/USD", BookConfig::default()).unwrap();

    // One good snapshot, then nothing: every resync attempt fails
    let snapshots = MockSnapshots::new(vec![Ok(snapshot(
        vec![(dec!(100), dec!(2))],
        vec![(dec!(101), dec!(1))],
    ))]);
    let deltas = ScriptedDeltas::new(vec![Scripted::Fail(StreamError::Transport(
        "socket reset".to_string(),
    ))]);

    let driver = FeedDriver::new(Arc::clone(&store), snapshots, deltas, feed_config(3)).unwrap();
    let result = driver.run(token).await;

    match result {
        Err(EngineError::FatalStream(fatal)) => assert_eq!(fatal.attempts, 3),
        other => panic!("expected fatal stream error, got {:?}", other),
    }
    assert_eq!(store.get_status(), BookStatus::Stale);
}
