//! Order book store
//!
//! Owns the working state for one instrument subscription and orchestrates
//! the update pipeline: bucket the incoming levels, merge them into the
//! per-side working sets, recompute depth, and publish an immutable view.
//!
//! There is exactly one logical writer (all mutations serialize behind one
//! lock) while readers share the last published `Arc<BookView>`, so a
//! renderer polling at high rates never observes a partially-merged book.
//! The store is an explicit value owned by the caller; nothing here is a
//! process-wide singleton.

use crate::bucket;
use crate::data::{
    BookConfig, BookView, DeltaBatch, MidpointMode, PriceLevel, RawSnapshot, Side, Spread,
};
use crate::depth;
use crate::error::StoreError;
use crate::merge::{self, MergeOutcome};
use crate::state::{BookStatus, StateError, StatusMachine};
use crate::window;
use chrono::Utc;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Opaque generation token returned by [`OrderBookStore::subscribe`]
///
/// Every mutation is checked against the live generation, so a late
/// snapshot or delta from a superseded subscription can never touch the
/// current book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(Uuid);

/// Order book store for a single instrument subscription
pub struct OrderBookStore {
    inner: Mutex<Inner>,
    published: RwLock<Arc<BookView>>,
}

#[derive(Debug)]
struct Inner {
    instrument: String,
    config: BookConfig,
    machine: StatusMachine,
    generation: Option<Uuid>,
    /// Raw (ungrouped) level caches; regrouping always starts here
    raw_bids: BTreeMap<Decimal, Decimal>,
    raw_asks: BTreeMap<Decimal, Decimal>,
    /// Bucketed working sets, the merge target
    bid_levels: BTreeMap<Decimal, Decimal>,
    ask_levels: BTreeMap<Decimal, Decimal>,
    version: u64,
}

impl std::fmt::Debug for OrderBookStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBookStore")
            .field("view", &self.view().to_string())
            .finish()
    }
}

impl OrderBookStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                instrument: String::new(),
                config: BookConfig::default(),
                machine: StatusMachine::new(),
                generation: None,
                raw_bids: BTreeMap::new(),
                raw_asks: BTreeMap::new(),
                bid_levels: BTreeMap::new(),
                ask_levels: BTreeMap::new(),
                version: 0,
            }),
            published: RwLock::new(Arc::new(BookView::empty())),
        }
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // SUBSCRIPTION LIFECYCLE
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Subscribe to an instrument, replacing any active subscription.
    ///
    /// Previously held levels are cleared and published empty before the
    /// new instrument's first snapshot arrives — switching instruments
    /// never leaks the prior book.
    pub fn subscribe(
        &self,
        instrument: &str,
        config: BookConfig,
    ) -> Result<SubscriptionToken, StoreError> {
        config.validate().map_err(StoreError::InvalidConfig)?;

        let mut inner = self.inner.lock().unwrap();

        if inner.machine.status() != BookStatus::Uninitialized {
            tracing::info!(
                "Replacing subscription {} -> {}",
                inner.instrument,
                instrument
            );
            inner.machine.reset();
        }
        inner.clear_book();

        inner.instrument = instrument.to_string();
        inner.config = config;
        inner.machine.subscribe()?;

        let generation = Uuid::new_v4();
        inner.generation = Some(generation);

        self.publish(&mut inner);
        Ok(SubscriptionToken(generation))
    }

    /// Drop the active subscription and all held state.
    pub fn unsubscribe(&self) {
        let mut inner = self.inner.lock().unwrap();

        inner.machine.reset();
        inner.generation = None;
        inner.instrument.clear();
        inner.clear_book();

        self.publish(&mut inner);
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // WRITE PATH (feed driver)
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Seed or fully replace both sides from a snapshot.
    ///
    /// The raw caches and bucketed working sets are rebuilt from scratch;
    /// any stale working set from before a resync is discarded.
    pub fn apply_snapshot(
        &self,
        token: &SubscriptionToken,
        snapshot: RawSnapshot,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_token(token)?;
        inner.machine.snapshot_applied()?;

        inner.raw_bids = snapshot
            .bids
            .iter()
            .filter(|(_, size)| !size.is_zero())
            .copied()
            .collect();
        inner.raw_asks = snapshot
            .asks
            .iter()
            .filter(|(_, size)| !size.is_zero())
            .copied()
            .collect();

        let grouping = inner.config.grouping_size;
        inner.bid_levels = bucket::aggregate_levels(snapshot.bids, grouping);
        inner.ask_levels = bucket::aggregate_levels(snapshot.asks, grouping);

        tracing::debug!(
            "Applied snapshot for {}: {} bid / {} ask buckets",
            inner.instrument,
            inner.bid_levels.len(),
            inner.ask_levels.len()
        );

        self.publish(&mut inner);
        Ok(())
    }

    /// Merge a normalized delta batch into both sides.
    ///
    /// Deltas are bucketed first (last write wins per raw price within the
    /// batch), then applied strictly in order under the capacity-gated
    /// merge policy. Rejected unless the book is live.
    pub fn apply_deltas(
        &self,
        token: &SubscriptionToken,
        batch: DeltaBatch,
    ) -> Result<MergeOutcome, StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_token(token)?;

        if !inner.machine.is_live() {
            return Err(StoreError::State(StateError::InvalidTransition {
                from: inner.machine.status(),
                action: "apply_deltas".to_string(),
            }));
        }

        // Keep the raw caches mirroring the venue book for regrouping
        for &(price, size) in &batch.bids {
            if size.is_zero() {
                inner.raw_bids.remove(&price);
            } else {
                inner.raw_bids.insert(price, size);
            }
        }
        for &(price, size) in &batch.asks {
            if size.is_zero() {
                inner.raw_asks.remove(&price);
            } else {
                inner.raw_asks.insert(price, size);
            }
        }

        let grouping = inner.config.grouping_size;
        let max_levels = inner.config.max_levels;

        let bid_deltas = bucket::aggregate_deltas(&batch.bids, grouping);
        let ask_deltas = bucket::aggregate_deltas(&batch.asks, grouping);

        let mut outcome = merge::apply_deltas(&mut inner.bid_levels, &bid_deltas, max_levels);
        outcome.merge(merge::apply_deltas(
            &mut inner.ask_levels,
            &ask_deltas,
            max_levels,
        ));

        if outcome.dropped > 0 || outcome.ignored_removals > 0 {
            tracing::debug!(
                "Merge for {}: {} dropped at capacity, {} removals ignored within bound",
                inner.instrument,
                outcome.dropped,
                outcome.ignored_removals
            );
        }

        if outcome.changed() {
            self.publish(&mut inner);
        }
        Ok(outcome)
    }

    /// Stream failed: stop trusting deltas until a fresh snapshot.
    pub fn mark_stale(&self, token: &SubscriptionToken, reason: String) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_token(token)?;
        inner.machine.stream_lost(reason)?;

        self.publish(&mut inner);
        Ok(())
    }

    /// Reconnect attempt started.
    pub fn begin_resync(&self, token: &SubscriptionToken, attempt: u32) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_token(token)?;
        inner.machine.resync_started(attempt)?;

        self.publish(&mut inner);
        Ok(())
    }

    /// Resync snapshot fetch failed; back to stale.
    pub fn resync_failed(
        &self,
        token: &SubscriptionToken,
        reason: String,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().unwrap();
        inner.check_token(token)?;
        inner.machine.resync_failed(reason)?;

        self.publish(&mut inner);
        Ok(())
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // CALLER-FACING CONTROLS & QUERIES
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Change the price grouping without a new snapshot fetch.
    ///
    /// Both sides are regrouped from the raw level caches, never from the
    /// already-bucketed sets, so repeated regrouping cannot compound
    /// rounding error.
    pub fn set_grouping(&self, grouping_size: Decimal) -> Result<(), StoreError> {
        if grouping_size <= Decimal::ZERO {
            return Err(StoreError::InvalidConfig(
                "Grouping size must be greater than 0".to_string(),
            ));
        }

        let mut inner = self.inner.lock().unwrap();
        inner.config.grouping_size = grouping_size;

        let regrouped_bids = bucket::aggregate_levels(
            inner.raw_bids.iter().map(|(&p, &s)| (p, s)),
            grouping_size,
        );
        let regrouped_asks = bucket::aggregate_levels(
            inner.raw_asks.iter().map(|(&p, &s)| (p, s)),
            grouping_size,
        );
        inner.bid_levels = regrouped_bids;
        inner.ask_levels = regrouped_asks;

        tracing::debug!(
            "Regrouped {} to grouping {}: {} bid / {} ask buckets",
            inner.instrument,
            grouping_size,
            inner.bid_levels.len(),
            inner.ask_levels.len()
        );

        self.publish(&mut inner);
        Ok(())
    }

    /// Top `limit` levels of a side, sorted and depth-annotated.
    pub fn get_levels(&self, side: Side, limit: usize) -> Vec<PriceLevel> {
        let view = self.view();
        match side {
            Side::Bid => window::select(&view.bids, limit),
            Side::Ask => window::select(&view.asks, limit),
        }
    }

    /// Spread between best bid and best ask; `None` if either side is empty.
    pub fn get_spread(&self) -> Option<Spread> {
        let view = self.view();
        let best_bid = view.best_bid()?.price;
        let best_ask = view.best_ask()?.price;

        let value = best_ask - best_bid;
        let midpoint = (best_bid + best_ask) / Decimal::TWO;
        let percent = if midpoint.is_zero() {
            0.0
        } else {
            (value / midpoint * Decimal::ONE_HUNDRED)
                .to_f64()
                .unwrap_or(0.0)
        };

        Some(Spread { value, percent })
    }

    /// Midpoint reference price; `None` if either side is empty.
    pub fn get_midpoint(&self, mode: MidpointMode) -> Option<Decimal> {
        let view = self.view();

        match mode {
            MidpointMode::Simple => {
                let best_bid = view.best_bid()?.price;
                let best_ask = view.best_ask()?.price;
                Some((best_bid + best_ask) / Decimal::TWO)
            }
            MidpointMode::Average => {
                let mean_bid = mean_price(&view.bids)?;
                let mean_ask = mean_price(&view.asks)?;
                Some((mean_bid + mean_ask) / Decimal::TWO)
            }
        }
    }

    /// Current lifecycle status.
    pub fn get_status(&self) -> BookStatus {
        self.inner.lock().unwrap().machine.status()
    }

    /// Current published view; cheap to clone and safe to hold across
    /// concurrent merges.
    pub fn view(&self) -> Arc<BookView> {
        Arc::clone(&self.published.read().unwrap())
    }

    /// Active book configuration.
    pub fn config(&self) -> BookConfig {
        self.inner.lock().unwrap().config.clone()
    }

    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
    // PUBLICATION
    // ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

    /// Rebuild the annotated view and swap it in for readers.
    fn publish(&self, inner: &mut Inner) {
        inner.version += 1;

        let bids = depth::annotate(&inner.bid_levels, Side::Bid);
        let asks = depth::annotate(&inner.ask_levels, Side::Ask);

        // Prices unique and strictly ordered per side, by construction
        debug_assert!(bids.windows(2).all(|w| w[0].price > w[1].price));
        debug_assert!(asks.windows(2).all(|w| w[0].price < w[1].price));

        let view = BookView {
            instrument: inner.instrument.clone(),
            bids,
            asks,
            version: inner.version,
            status: inner.machine.status(),
            updated_at: Utc::now(),
        };

        *self.published.write().unwrap() = Arc::new(view);
    }
}

impl Default for OrderBookStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Inner {
    fn check_token(&self, token: &SubscriptionToken) -> Result<(), StoreError> {
        match self.generation {
            None => Err(StoreError::NotSubscribed),
            Some(generation) if generation != token.0 => Err(StoreError::SubscriptionSuperseded),
            Some(_) => Ok(()),
        }
    }

    fn clear_book(&mut self) {
        self.raw_bids.clear();
        self.raw_asks.clear();
        self.bid_levels.clear();
        self.ask_levels.clear();
    }
}

fn mean_price(levels: &[PriceLevel]) -> Option<Decimal> {
    if levels.is_empty() {
        return None;
    }

    let sum: Decimal = levels.iter().map(|level| level.price).sum();
    Some(sum / Decimal::from(levels.len() as u64))
}
