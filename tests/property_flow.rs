//! Property tests for flow operators against their iterator counterparts.

mod common;

use common::{init_test_logging, test_proptest_config};
use coscope::{flow_of, Flow};
use futures_lite::future::block_on;
use proptest::prelude::*;

fn arb_values() -> impl Strategy<Value = Vec<i32>> {
    prop::collection::vec(-1000i32..1000, 0..64)
}

proptest! {
    #![proptest_config(test_proptest_config(128))]

    /// Collection preserves emission order and loses nothing.
    #[test]
    fn to_vec_preserves_items(values in arb_values()) {
        init_test_logging();
        let collected = block_on(flow_of(values.clone()).to_vec()).expect("collected");
        prop_assert_eq!(collected, values);
    }

    #[test]
    fn map_filter_match_iterator(values in arb_values(), modulus in 1i32..7) {
        let expected: Vec<i64> = values
            .iter()
            .filter(|v| v.rem_euclid(modulus) == 0)
            .map(|v| i64::from(*v) * 3)
            .collect();
        let source: Flow<i32> = flow_of(values);
        let collected = block_on(
            source
                .filter(move |v| v.rem_euclid(modulus) == 0)
                .map(|v| i64::from(v) * 3)
                .to_vec(),
        )
        .expect("collected");
        prop_assert_eq!(collected, expected);
    }

    #[test]
    fn take_is_prefix(values in arb_values(), n in 0usize..80) {
        let expected: Vec<i32> = values.iter().copied().take(n).collect();
        let collected = block_on(flow_of(values).take(n).to_vec()).expect("collected");
        prop_assert_eq!(collected, expected);
    }

    #[test]
    fn fold_matches_sum(values in arb_values()) {
        let expected: i64 = values.iter().map(|v| i64::from(*v)).sum();
        let total = block_on(flow_of(values).fold(0i64, |acc, v| acc + i64::from(v)))
            .expect("folded");
        prop_assert_eq!(total, expected);
    }

    /// A flow is cold: every collection sees the same sequence.
    #[test]
    fn recollection_is_repeatable(values in arb_values()) {
        let source = flow_of(values).map(|v| v.wrapping_mul(7));
        let first = block_on(source.to_vec()).expect("first");
        let second = block_on(source.to_vec()).expect("second");
        prop_assert_eq!(first, second);
    }
}
