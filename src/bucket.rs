//! Price-bucket aggregation
//!
//! Groups raw price levels into coarser increments. Regrouping always starts
//! from the raw level cache, never from already-bucketed output, so changing
//! the grouping size cannot compound rounding error.

use rust_decimal::Decimal;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;

/// Bucket key for a raw price: `floor(price / grouping) * grouping`.
pub fn bucket_key(price: Decimal, grouping: Decimal) -> Decimal {
    (price / grouping).floor() * grouping
}

/// Group raw levels into buckets, summing sizes within each bucket.
///
/// Levels with zero size are skipped; the output has no duplicate bucket
/// keys and no empty buckets.
pub fn aggregate_levels<I>(levels: I, grouping: Decimal) -> BTreeMap<Decimal, Decimal>
where
    I: IntoIterator<Item = (Decimal, Decimal)>,
{
    let mut buckets: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    for (price, size) in levels {
        if size.is_zero() {
            continue;
        }
        *buckets.entry(bucket_key(price, grouping)).or_insert(Decimal::ZERO) += size;
    }
    buckets
}

/// Bucket a delta batch for one side, preserving arrival order of buckets.
///
/// Within a batch the last delta for a raw price wins before sizes are
/// summed, so `[[100, 2], [100, 3]]` contributes 3 to its bucket, not 5.
/// A bucket whose surviving deltas sum to zero stays in the output as a
/// remove-intent for the merger.
pub fn aggregate_deltas(deltas: &[(Decimal, Decimal)], grouping: Decimal) -> Vec<(Decimal, Decimal)> {
    // Last write wins per raw price, first-arrival position kept
    let mut latest: Vec<(Decimal, Decimal)> = Vec::with_capacity(deltas.len());
    for &(price, size) in deltas {
        match latest.iter_mut().find(|(p, _)| *p == price) {
            Some(entry) => entry.1 = size,
            None => latest.push((price, size)),
        }
    }

    // Fold into buckets in first-appearance order
    let mut order: Vec<Decimal> = Vec::new();
    let mut sums: BTreeMap<Decimal, Decimal> = BTreeMap::new();
    for (price, size) in latest {
        let key = bucket_key(price, grouping);
        match sums.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(size);
                order.push(key);
            }
            Entry::Occupied(mut slot) => {
                *slot.get_mut() += size;
            }
        }
    }

    order.into_iter().map(|key| (key, sums[&key])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_bucket_key_floors_to_grouping() {
        assert_eq!(bucket_key(dec!(102), dec!(5)), dec!(100));
        assert_eq!(bucket_key(dec!(100), dec!(5)), dec!(100));
        assert_eq!(bucket_key(dec!(104.99), dec!(5)), dec!(100));
        assert_eq!(bucket_key(dec!(105), dec!(5)), dec!(105));
        assert_eq!(bucket_key(dec!(99.5), dec!(0.5)), dec!(99.5));
        assert_eq!(bucket_key(dec!(99.74), dec!(0.5)), dec!(99.5));
    }

    #[test]
    fn test_levels_in_same_bucket_are_summed() {
        let buckets = aggregate_levels(
            vec![(dec!(100), dec!(1)), (dec!(102), dec!(1))],
            dec!(5),
        );

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.get(&dec!(100)), Some(&dec!(2)));
    }

    #[test]
    fn test_zero_size_levels_are_skipped() {
        let buckets = aggregate_levels(
            vec![(dec!(100), dec!(0)), (dec!(107), dec!(3))],
            dec!(5),
        );

        assert_eq!(buckets.len(), 1);
        assert_eq!(buckets.get(&dec!(105)), Some(&dec!(3)));
    }

    #[test]
    fn test_delta_last_write_wins_per_raw_price() {
        let bucketed = aggregate_deltas(
            &[(dec!(100), dec!(2)), (dec!(100), dec!(3))],
            dec!(5),
        );

        assert_eq!(bucketed, vec![(dec!(100), dec!(3))]);
    }

    #[test]
    fn test_delta_buckets_preserve_arrival_order() {
        let bucketed = aggregate_deltas(
            &[
                (dec!(110), dec!(1)),
                (dec!(100), dec!(2)),
                (dec!(102), dec!(1)),
            ],
            dec!(5),
        );

        assert_eq!(
            bucketed,
            vec![(dec!(110), dec!(1)), (dec!(100), dec!(3))]
        );
    }

    #[test]
    fn test_zeroed_bucket_survives_as_remove_intent() {
        let bucketed = aggregate_deltas(&[(dec!(100), dec!(0))], dec!(5));

        assert_eq!(bucketed, vec![(dec!(100), dec!(0))]);
    }
}
