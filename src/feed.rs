//! Feed driver
//!
//! Drives one subscription end to end: initial snapshot sync, live delta
//! application with coalescing, and stale/resync recovery with bounded
//! backoff. Transport wiring lives outside this crate behind the
//! [`DeltaSource`] and [`SnapshotSource`] traits; the driver only decides
//! *when* to distrust the stream and re-fetch a snapshot, never how the
//! socket comes back.

use crate::coalesce::DeltaCoalescer;
use crate::data::{FeedConfig, RawSnapshot};
use crate::error::{EngineError, FatalStreamError, SnapshotFetchError, StoreError, StreamError};
use crate::ingest::DeltaIngestor;
use crate::snapshot::SnapshotSource;
use crate::store::{OrderBookStore, SubscriptionToken};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::timeout;

/// Source of raw delta messages
///
/// `Ok(None)` means the stream closed cleanly. After returning an error the
/// source is expected to re-establish its transport on the next call — the
/// driver handles backoff and resynchronization, not reconnection
/// mechanics. `next` must be cancel-safe: the driver polls it under a
/// timeout.
#[async_trait]
pub trait DeltaSource: Send {
    async fn next(&mut self) -> Result<Option<String>, StreamError>;
}

/// Drives one subscription's sync/live/resync lifecycle
pub struct FeedDriver<S, D> {
    store: Arc<OrderBookStore>,
    snapshots: S,
    deltas: D,
    config: FeedConfig,
}

enum LiveExit {
    /// The caller unsubscribed or resubscribed; exit quietly
    Superseded,
    /// The stream failed; go stale and resync
    Stream(StreamError),
}

impl<S: SnapshotSource, D: DeltaSource> FeedDriver<S, D> {
    pub fn new(
        store: Arc<OrderBookStore>,
        snapshots: S,
        deltas: D,
        config: FeedConfig,
    ) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::Configuration)?;

        Ok(Self {
            store,
            snapshots,
            deltas,
            config,
        })
    }

    pub fn store(&self) -> &Arc<OrderBookStore> {
        &self.store
    }

    /// Run the feed until the stream fails permanently or the subscription
    /// is superseded.
    ///
    /// On initial snapshot failure the error is surfaced after the retry
    /// bound and the book keeps whatever state it had. A superseded token
    /// ends the run with `Ok(())`: the late result must not touch the
    /// newer subscription.
    pub async fn run(mut self, token: SubscriptionToken) -> Result<(), EngineError> {
        let snapshot = self.fetch_snapshot_with_retry().await?;
        match self.store.apply_snapshot(&token, snapshot) {
            Ok(()) => {}
            Err(err) if is_superseded(&err) => return Ok(()),
            Err(err) => return Err(err.into()),
        }

        let mut ingestor = DeltaIngestor::new(self.store.config().malformed_threshold);
        let mut coalescer = DeltaCoalescer::new(
            self.config.coalesce_window,
            self.config.coalesce_max_pending,
        );
        let mut reconnect_attempt: u32 = 0;

        loop {
            let stream_err = match self.live_loop(&token, &mut ingestor, &mut coalescer).await? {
                LiveExit::Superseded => return Ok(()),
                LiveExit::Stream(err) => err,
            };

            tracing::warn!("Delta stream lost: {}", stream_err);
            coalescer.discard();
            match self.store.mark_stale(&token, stream_err.to_string()) {
                Ok(()) => {}
                Err(err) if is_superseded(&err) => return Ok(()),
                Err(err) => return Err(err.into()),
            }

            // Reconnect with bounded backoff; a fresh snapshot always
            // precedes resumed delta application.
            loop {
                reconnect_attempt += 1;
                if !self.config.reconnect.should_retry(reconnect_attempt) {
                    return Err(FatalStreamError {
                        attempts: reconnect_attempt - 1,
                        last: stream_err.clone(),
                    }
                    .into());
                }

                let delay = self.config.reconnect.calculate_delay(reconnect_attempt);
                tracing::info!("Reconnect attempt {} in {:?}", reconnect_attempt, delay);
                tokio::time::sleep(delay).await;

                match self.store.begin_resync(&token, reconnect_attempt) {
                    Ok(()) => {}
                    Err(err) if is_superseded(&err) => return Ok(()),
                    Err(err) => return Err(err.into()),
                }

                match self.snapshots.fetch().await {
                    Ok(snapshot) => {
                        match self.store.apply_snapshot(&token, snapshot) {
                            Ok(()) => {}
                            Err(err) if is_superseded(&err) => return Ok(()),
                            Err(err) => return Err(err.into()),
                        }
                        ingestor.reset();
                        reconnect_attempt = 0;
                        break;
                    }
                    Err(err) => {
                        tracing::warn!("Resync snapshot fetch failed: {}", err);
                        match self.store.resync_failed(&token, err.to_string()) {
                            Ok(()) => {}
                            Err(err) if is_superseded(&err) => return Ok(()),
                            Err(err) => return Err(err.into()),
                        }
                    }
                }
            }
        }
    }

    /// Consume deltas while the book is live.
    async fn live_loop(
        &mut self,
        token: &SubscriptionToken,
        ingestor: &mut DeltaIngestor,
        coalescer: &mut DeltaCoalescer,
    ) -> Result<LiveExit, EngineError> {
        loop {
            let wait = match coalescer.time_to_flush() {
                Some(remaining) => remaining.min(self.config.idle_timeout),
                None => self.config.idle_timeout,
            };

            match timeout(wait, self.deltas.next()).await {
                Err(_elapsed) => {
                    // Timer fired: flush a due batch, or report idle silence
                    if let Some(batch) = coalescer.flush() {
                        match self.store.apply_deltas(token, batch) {
                            Ok(_) => {}
                            Err(err) if is_superseded(&err) => return Ok(LiveExit::Superseded),
                            Err(err) => return Err(err.into()),
                        }
                        continue;
                    }

                    return Ok(LiveExit::Stream(StreamError::Timeout(format!(
                        "no deltas within {:?}",
                        self.config.idle_timeout
                    ))));
                }
                Ok(Ok(Some(raw))) => {
                    let batch = match ingestor.ingest(&raw) {
                        Ok(batch) => batch,
                        Err(err) => return Ok(LiveExit::Stream(err)),
                    };
                    if batch.is_empty() {
                        continue;
                    }

                    if let Some(merged) = coalescer.push(batch) {
                        match self.store.apply_deltas(token, merged) {
                            Ok(_) => {}
                            Err(err) if is_superseded(&err) => return Ok(LiveExit::Superseded),
                            Err(err) => return Err(err.into()),
                        }
                    }
                }
                Ok(Ok(None)) => {
                    return Ok(LiveExit::Stream(StreamError::Closed(
                        "delta stream ended".to_string(),
                    )))
                }
                Ok(Err(err)) => return Ok(LiveExit::Stream(err)),
            }
        }
    }

    async fn fetch_snapshot_with_retry(&self) -> Result<RawSnapshot, SnapshotFetchError> {
        let mut attempt: u32 = 0;
        loop {
            match self.snapshots.fetch().await {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => {
                    attempt += 1;
                    if !self.config.reconnect.should_retry(attempt) {
                        return Err(err);
                    }

                    let delay = self.config.reconnect.calculate_delay(attempt);
                    tracing::warn!(
                        "Snapshot fetch failed (attempt {}): {}; retrying in {:?}",
                        attempt,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn is_superseded(err: &StoreError) -> bool {
    matches!(
        err,
        StoreError::NotSubscribed | StoreError::SubscriptionSuperseded
    )
}
