//! Execution mode decider.
//!
//! Pure function from a row count estimate, a threshold and an optional
//! override to the read mode the streaming reader will use.

use crate::models::{ExecutionMode, ReadMode};

/// Resolves the read mode for one table.
///
/// Overrides win unconditionally. In `Auto`, tables at or below `threshold`
/// rows are fully scanned and larger tables are sampled.
///
/// # Example
/// ```rust
/// use dbcrawler_core::mode::decide;
/// use dbcrawler_core::models::{ExecutionMode, ReadMode};
///
/// assert_eq!(decide(10, 10, ExecutionMode::Auto), ReadMode::FullScan);
/// assert_eq!(decide(11, 10, ExecutionMode::Auto), ReadMode::Sample);
/// assert_eq!(decide(0, 10, ExecutionMode::ForceSample), ReadMode::Sample);
/// ```
pub fn decide(row_count_estimate: u64, threshold: u64, mode: ExecutionMode) -> ReadMode {
    match mode {
        ExecutionMode::ForceFullScan => ReadMode::FullScan,
        ExecutionMode::ForceSample => ReadMode::Sample,
        ExecutionMode::Auto if row_count_estimate <= threshold => ReadMode::FullScan,
        ExecutionMode::Auto => ReadMode::Sample,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_mode() -> impl Strategy<Value = ExecutionMode> {
        prop_oneof![
            Just(ExecutionMode::Auto),
            Just(ExecutionMode::ForceFullScan),
            Just(ExecutionMode::ForceSample),
        ]
    }

    #[test]
    fn test_threshold_boundary() {
        assert_eq!(decide(0, 0, ExecutionMode::Auto), ReadMode::FullScan);
        assert_eq!(decide(1, 0, ExecutionMode::Auto), ReadMode::Sample);
        assert_eq!(decide(u64::MAX, u64::MAX, ExecutionMode::Auto), ReadMode::FullScan);
    }

    proptest! {
        #[test]
        fn force_full_scan_always_wins(estimate in any::<u64>(), threshold in any::<u64>()) {
            prop_assert_eq!(decide(estimate, threshold, ExecutionMode::ForceFullScan), ReadMode::FullScan);
        }

        #[test]
        fn force_sample_always_wins(estimate in any::<u64>(), threshold in any::<u64>()) {
            prop_assert_eq!(decide(estimate, threshold, ExecutionMode::ForceSample), ReadMode::Sample);
        }

        #[test]
        fn auto_follows_threshold(estimate in any::<u64>(), threshold in any::<u64>()) {
            let expected = if estimate <= threshold { ReadMode::FullScan } else { ReadMode::Sample };
            prop_assert_eq!(decide(estimate, threshold, ExecutionMode::Auto), expected);
        }

        #[test]
        fn decide_is_deterministic(estimate in any::<u64>(), threshold in any::<u64>(), mode in any_mode()) {
            prop_assert_eq!(decide(estimate, threshold, mode), decide(estimate, threshold, mode));
        }

        #[test]
        fn auto_is_monotone_in_estimate(a in any::<u64>(), b in any::<u64>(), threshold in any::<u64>()) {
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            if decide(low, threshold, ExecutionMode::Auto) == ReadMode::Sample {
                prop_assert_eq!(decide(high, threshold, ExecutionMode::Auto), ReadMode::Sample);
            }
        }
    }
}
