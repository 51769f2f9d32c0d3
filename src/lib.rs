//! # depthbook
//!
//! Order-book synchronization and depth aggregation engine. Consumes an
//! initial full snapshot plus a continuous stream of incremental price-level
//! updates for one trading instrument and maintains a locally consistent,
//! price-bucketed, depth-ranked view of both sides of the book, safe to
//! read concurrently at render rates.
//!
//! Transport is out of scope: snapshots and deltas enter through the
//! [`SnapshotSource`] and [`DeltaSource`] traits, and the engine recovers
//! from stream loss by discarding the working set and re-snapshotting —
//! never by replaying delta history.
//!
//! ## Quick Start
//! ```rust,ignore
//! use depthbook::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(OrderBookStore::new());
//! let token = store.subscribe("BTC/USD", BookConfig::new(dec!(0.5), 25))?;
//!
//! let loader = HttpSnapshotLoader::new("https://example.com/depth")?;
//! let driver = FeedDriver::new(Arc::clone(&store), loader, my_delta_source, FeedConfig::default())?;
//! tokio::spawn(driver.run(token));
//!
//! // Render thread
//! for level in store.get_levels(Side::Bid, 10) {
//!     println!("{} {:.1}%", level, level.depth_percent.unwrap_or(0.0));
//! }
//! ```

pub mod bucket;
pub mod coalesce;
pub mod data;
pub mod depth;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod merge;
pub mod retry;
pub mod snapshot;
pub mod state;
pub mod store;
pub mod window;

pub use data::*;
pub use error::*;
pub use feed::{DeltaSource, FeedDriver};
pub use ingest::DeltaIngestor;
pub use merge::MergeOutcome;
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use snapshot::{HttpSnapshotLoader, SnapshotSource};
pub use state::{BookStatus, StateError, StateTransition, StatusMachine, TransitionTrigger};
pub use store::{OrderBookStore, SubscriptionToken};

/// Prelude - minimal public API surface
///
/// Import with: `use depthbook::prelude::*;`
pub mod prelude {
    /// Store and subscription handle
    pub use crate::store::{OrderBookStore, SubscriptionToken};

    /// Configuration
    pub use crate::data::{BookConfig, FeedConfig};

    /// Core data types
    pub use crate::data::{BookView, DeltaBatch, MidpointMode, PriceLevel, RawSnapshot, Side, Spread};

    /// Lifecycle status
    pub use crate::state::BookStatus;

    /// Feed wiring
    pub use crate::feed::{DeltaSource, FeedDriver};
    pub use crate::snapshot::{HttpSnapshotLoader, SnapshotSource};

    /// Errors
    pub use crate::error::EngineError;

    /// Backoff
    pub use crate::retry::RetryPolicy;
}

use tracing_subscriber;

/// Initialize logging for the engine
pub fn init_logging() {
    tracing_subscriber::fmt::init();
}
