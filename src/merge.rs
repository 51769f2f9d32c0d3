//! Level merge reducer
//!
//! Pure function applying bucketed deltas onto one side's working set. No
//! I/O and no shared state, so merge behavior is unit-testable in isolation
//! and deterministic regardless of how deltas were batched upstream.

use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Counters describing what a merge pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
    /// New-price deltas dropped because the side was at capacity
    pub dropped: usize,
    /// Zero-size deltas ignored because the side was within its bound
    pub ignored_removals: usize,
}

impl MergeOutcome {
    /// Whether the working set changed at all
    pub fn changed(&self) -> bool {
        self.inserted + self.updated + self.removed > 0
    }

    pub fn merge(&mut self, other: MergeOutcome) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.removed += other.removed;
        self.dropped += other.dropped;
        self.ignored_removals += other.ignored_removals;
    }
}

/// Apply bucketed deltas to one side's working set, strictly in order.
///
/// Policy per delta:
/// - size zero while the side holds more than `max_levels` levels: remove
///   the level at that price;
/// - size zero otherwise: leave the existing level (if any) untouched —
///   removal is capacity-gated;
/// - price present: overwrite its size;
/// - price absent and the side is below `max_levels`: insert;
/// - price absent at capacity: drop the update. Existing levels are never
///   displaced by new ones.
pub fn apply_deltas(
    levels: &mut BTreeMap<Decimal, Decimal>,
    deltas: &[(Decimal, Decimal)],
    max_levels: usize,
) -> MergeOutcome {
    let mut outcome = MergeOutcome::default();

    for &(price, size) in deltas {
        if size.is_zero() {
            if levels.len() > max_levels && levels.remove(&price).is_some() {
                outcome.removed += 1;
            } else {
                outcome.ignored_removals += 1;
            }
        } else if let Some(existing) = levels.get_mut(&price) {
            if *existing != size {
                *existing = size;
                outcome.updated += 1;
            }
        } else if levels.len() < max_levels {
            levels.insert(price, size);
            outcome.inserted += 1;
        } else {
            outcome.dropped += 1;
        }
    }

    outcome
}
