//! Delta batch coalescing
//!
//! Multiple delta batches arriving within a short window are merged into one
//! merge+recompute+publish cycle to bound render churn. This is a
//! latency/throughput tradeoff only: merge results are identical whether
//! deltas are applied one at a time or pre-batched.

use crate::data::DeltaBatch;
use std::time::{Duration, Instant};

/// Coalescing statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CoalesceStats {
    pub batches_in: u64,
    pub flushes: u64,
    pub discarded: u64,
}

/// Buffers delta batches until the window closes or the pending bound hits
#[derive(Debug)]
pub struct DeltaCoalescer {
    window: Duration,
    max_pending: usize,
    pending: DeltaBatch,
    pending_batches: usize,
    window_start: Option<Instant>,
    stats: CoalesceStats,
}

impl DeltaCoalescer {
    pub fn new(window: Duration, max_pending: usize) -> Self {
        Self {
            window,
            max_pending,
            pending: DeltaBatch::default(),
            pending_batches: 0,
            window_start: None,
            stats: CoalesceStats::default(),
        }
    }

    /// Add a batch; returns the merged pending batch when it is due.
    pub fn push(&mut self, batch: DeltaBatch) -> Option<DeltaBatch> {
        self.stats.batches_in += 1;

        if self.window_start.is_none() {
            self.window_start = Some(Instant::now());
        }
        self.pending.extend(batch);
        self.pending_batches += 1;

        if self.pending_batches >= self.max_pending || self.window_elapsed() {
            return self.flush();
        }

        None
    }

    /// Time remaining before the pending buffer is due; `None` when empty.
    ///
    /// Drives the feed driver's poll timeout so a lull in arrivals still
    /// flushes on schedule.
    pub fn time_to_flush(&self) -> Option<Duration> {
        let start = self.window_start?;
        Some(self.window.saturating_sub(start.elapsed()))
    }

    /// Flush whatever is pending regardless of the window.
    pub fn flush(&mut self) -> Option<DeltaBatch> {
        if self.pending_batches == 0 {
            return None;
        }

        self.stats.flushes += 1;
        self.window_start = None;
        self.pending_batches = 0;
        Some(std::mem::take(&mut self.pending))
    }

    /// Drop pending deltas without applying them.
    ///
    /// Used on stream failure: the book is about to be replaced by a fresh
    /// snapshot, so a partial tail adds nothing.
    pub fn discard(&mut self) -> usize {
        let dropped = self.pending.len();
        if dropped > 0 {
            self.stats.discarded += dropped as u64;
            tracing::debug!("Discarding {} pending coalesced deltas", dropped);
        }
        self.pending = DeltaBatch::default();
        self.pending_batches = 0;
        self.window_start = None;
        dropped
    }

    pub fn stats(&self) -> CoalesceStats {
        self.stats
    }

    fn window_elapsed(&self) -> bool {
        match self.window_start {
            Some(start) => start.elapsed() >= self.window,
            None => false,
        }
    }
}
