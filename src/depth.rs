//! Cumulative depth annotation
//!
//! Sorts a side's working set into display order and annotates each level
//! with its cumulative total and normalized depth percentage. Membership
//! changes invalidate prefix sums, so the whole side is recomputed on every
//! publish cycle.

use crate::data::{PriceLevel, Side};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Sort a side and annotate cumulative totals and depth percentages.
///
/// Bids are ordered by price descending, asks ascending. The level carrying
/// the maximum cumulative total lands at exactly 100 percent; an empty side
/// yields an empty vec, and a side whose sizes sum to zero is guarded to 0
/// percent rather than dividing by zero.
pub fn annotate(levels: &BTreeMap<Decimal, Decimal>, side: Side) -> Vec<PriceLevel> {
    let mut annotated: Vec<PriceLevel> = Vec::with_capacity(levels.len());

    let mut running = Decimal::ZERO;
    match side {
        Side::Bid => {
            for (&price, &size) in levels.iter().rev() {
                running += size;
                annotated.push(cumulative_level(price, size, running));
            }
        }
        Side::Ask => {
            for (&price, &size) in levels.iter() {
                running += size;
                annotated.push(cumulative_level(price, size, running));
            }
        }
    }

    // Totals are non-decreasing, so the last running sum is the maximum.
    let max_total = running;
    for level in &mut annotated {
        level.depth_percent = Some(depth_percent(level.cumulative_total, max_total));
    }

    annotated
}

fn cumulative_level(price: Decimal, size: Decimal, running: Decimal) -> PriceLevel {
    PriceLevel {
        price,
        size,
        cumulative_total: Some(running),
        depth_percent: None,
    }
}

fn depth_percent(cumulative: Option<Decimal>, max_total: Decimal) -> f64 {
    if max_total.is_zero() {
        return 0.0;
    }

    let ratio = cumulative.unwrap_or_default() / max_total * Decimal::ONE_HUNDRED;
    ratio.to_f64().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn side_map(levels: &[(Decimal, Decimal)]) -> BTreeMap<Decimal, Decimal> {
        levels.iter().copied().collect()
    }

    #[test]
    fn test_bids_sorted_descending_asks_ascending() {
        let levels = side_map(&[(dec!(100), dec!(1)), (dec!(101), dec!(1))]);

        let bids = annotate(&levels, Side::Bid);
        assert_eq!(bids[0].price, dec!(101));
        assert_eq!(bids[1].price, dec!(100));

        let asks = annotate(&levels, Side::Ask);
        assert_eq!(asks[0].price, dec!(100));
        assert_eq!(asks[1].price, dec!(101));
    }

    #[test]
    fn test_cumulative_totals_accumulate_along_sort_order() {
        let levels = side_map(&[
            (dec!(100), dec!(2)),
            (dec!(99), dec!(3)),
            (dec!(98), dec!(1)),
        ]);

        let bids = annotate(&levels, Side::Bid);

        assert_eq!(bids[0].cumulative_total, Some(dec!(2)));
        assert_eq!(bids[1].cumulative_total, Some(dec!(5)));
        assert_eq!(bids[2].cumulative_total, Some(dec!(6)));
    }

    #[test]
    fn test_max_total_level_is_exactly_100_percent() {
        let levels = side_map(&[(dec!(100), dec!(2)), (dec!(99), dec!(3))]);

        let bids = annotate(&levels, Side::Bid);
        let last = bids.last().unwrap();

        assert_eq!(last.depth_percent, Some(100.0));
        for level in &bids {
            let percent = level.depth_percent.unwrap();
            assert!((0.0..=100.0).contains(&percent));
        }
    }

    #[test]
    fn test_zero_total_side_is_guarded() {
        let levels = side_map(&[(dec!(100), dec!(0))]);

        let bids = annotate(&levels, Side::Bid);

        assert_eq!(bids[0].depth_percent, Some(0.0));
    }

    #[test]
    fn test_empty_side_yields_empty_vec() {
        let levels = side_map(&[]);

        assert!(annotate(&levels, Side::Bid).is_empty());
        assert!(annotate(&levels, Side::Ask).is_empty());
    }
}
