//! Display window selection
//!
//! Truncates a sorted, depth-annotated side to the top N levels for display.
//! The full annotated set stays in the published view so off-screen levels
//! keep receiving deltas.

use crate::data::PriceLevel;

/// Take the top `limit` levels of an annotated side.
pub fn select(levels: &[PriceLevel], limit: usize) -> Vec<PriceLevel> {
    levels.iter().take(limit).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn annotated(count: usize) -> Vec<PriceLevel> {
        (0..count)
            .map(|i| PriceLevel::new(dec!(100) + rust_decimal::Decimal::from(i), dec!(1)))
            .collect()
    }

    #[test]
    fn test_truncates_to_limit() {
        let levels = annotated(30);

        let window = select(&levels, 10);

        assert_eq!(window.len(), 10);
        assert_eq!(window[0].price, levels[0].price);
        assert_eq!(window[9].price, levels[9].price);
    }

    #[test]
    fn test_limit_larger_than_set_returns_everything() {
        let levels = annotated(3);

        assert_eq!(select(&levels, 50).len(), 3);
    }

    #[test]
    fn test_zero_limit_is_empty() {
        let levels = annotated(3);

        assert!(select(&levels, 0).is_empty());
    }
}
