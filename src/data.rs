//! Data models for book state, messages, and configuration

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::retry::RetryPolicy;
use crate::state::BookStatus;

/// Side of the book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    pub fn opposite(self) -> Side {
        match self {
            Side::Bid => Side::Ask,
            Side::Ask => Side::Bid,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Price level with depth annotations
///
/// `cumulative_total` and `depth_percent` are populated by the depth
/// calculator on publish; a freshly parsed level carries only price and size.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceLevel {
    pub price: Decimal,
    pub size: Decimal,
    pub cumulative_total: Option<Decimal>,
    pub depth_percent: Option<f64>,
}

impl PriceLevel {
    pub fn new(price: Decimal, size: Decimal) -> Self {
        Self {
            price,
            size,
            cumulative_total: None,
            depth_percent: None,
        }
    }
}

impl fmt::Display for PriceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.size, self.price)
    }
}

/// Full two-sided book capture as delivered by a snapshot source
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawSnapshot {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl RawSnapshot {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn level_count(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

impl fmt::Display for RawSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Snapshot: {} bids, {} asks",
            self.bids.len(),
            self.asks.len()
        )
    }
}

/// Normalized batch of incremental updates
///
/// Tuples are `(price, size)` in arrival order; a size of zero is a
/// remove-intent, never a stored state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeltaBatch {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl DeltaBatch {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }

    /// Append another batch, preserving arrival order across both.
    pub fn extend(&mut self, other: DeltaBatch) {
        self.bids.extend(other.bids);
        self.asks.extend(other.asks);
    }
}

impl fmt::Display for DeltaBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DeltaBatch: {} bid deltas, {} ask deltas",
            self.bids.len(),
            self.asks.len()
        )
    }
}

/// Immutable published view of the book
///
/// Produced by the store after every merge+recompute cycle and handed to
/// readers as `Arc<BookView>`, so a renderer never observes a partially
/// merged state. Both sides are fully sorted and depth-annotated; display
/// windowing happens at query time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookView {
    pub instrument: String,
    /// Bid levels, best (highest) price first
    pub bids: Vec<PriceLevel>,
    /// Ask levels, best (lowest) price first
    pub asks: Vec<PriceLevel>,
    pub version: u64,
    pub status: BookStatus,
    pub updated_at: DateTime<Utc>,
}

impl BookView {
    pub fn empty() -> Self {
        Self {
            instrument: String::new(),
            bids: Vec::new(),
            asks: Vec::new(),
            version: 0,
            status: BookStatus::Uninitialized,
            updated_at: Utc::now(),
        }
    }

    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }
}

impl fmt::Display for BookView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Book[{}] v{}: {} bids, {} asks ({})",
            self.instrument,
            self.version,
            self.bids.len(),
            self.asks.len(),
            self.status
        )
    }
}

/// Spread between best bid and best ask
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub value: Decimal,
    /// Spread as a percentage of the simple midpoint
    pub percent: f64,
}

/// Midpoint formula selection
///
/// Both formulas are exposed because different consumers need each: an
/// order-form default price wants the best-bid/ask midpoint, a market
/// display wants the average of mean bid and mean ask prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidpointMode {
    /// `(best_bid + best_ask) / 2`
    Simple,
    /// `(mean(bid prices) + mean(ask prices)) / 2`
    Average,
}

/// Book configuration
#[derive(Debug, Clone)]
pub struct BookConfig {
    /// Price bucket increment; raw levels are grouped to multiples of this
    pub grouping_size: Decimal,
    /// Bound on delta-driven growth of each side's working set
    pub max_levels: usize,
    /// Consecutive unparsable messages tolerated before the stream is
    /// considered lost
    pub malformed_threshold: u32,
}

impl BookConfig {
    pub fn new(grouping_size: Decimal, max_levels: usize) -> Self {
        Self {
            grouping_size,
            max_levels,
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.grouping_size <= Decimal::ZERO {
            return Err("Grouping size must be greater than 0".to_string());
        }

        if self.max_levels == 0 {
            return Err("Max levels must be greater than 0".to_string());
        }

        if self.malformed_threshold == 0 {
            return Err("Malformed threshold must be greater than 0".to_string());
        }

        Ok(())
    }
}

impl Default for BookConfig {
    fn default() -> Self {
        Self {
            grouping_size: Decimal::ONE,
            max_levels: 25,
            malformed_threshold: 5,
        }
    }
}

/// Feed driver configuration
#[derive(Debug, Clone)]
pub struct FeedConfig {
    /// Deltas arriving within this window are coalesced into one
    /// merge+recompute+publish cycle
    pub coalesce_window: Duration,
    /// Pending batch count that forces a flush regardless of the window
    pub coalesce_max_pending: usize,
    /// Silence on the delta stream longer than this marks the book stale
    pub idle_timeout: Duration,
    /// Backoff policy for snapshot retries and reconnect attempts
    pub reconnect: RetryPolicy,
}

impl FeedConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.coalesce_max_pending == 0 {
            return Err("Coalesce max pending must be greater than 0".to_string());
        }

        if self.idle_timeout.as_millis() == 0 {
            return Err("Idle timeout must be greater than 0".to_string());
        }

        if self.idle_timeout <= self.coalesce_window {
            return Err("Idle timeout must exceed the coalesce window".to_string());
        }

        Ok(())
    }
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            coalesce_window: Duration::from_millis(100),
            coalesce_max_pending: 32,
            idle_timeout: Duration::from_secs(10),
            reconnect: RetryPolicy::default(),
        }
    }
}
