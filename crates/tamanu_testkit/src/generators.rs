//! Property-based test generators using proptest.
//!
//! Provides strategies for generating random test data
//! that maintains required invariants.

use proptest::prelude::*;
use std::collections::BTreeMap;
use tamanu_codec::Value;

/// Strategy for generating record ids.
///
/// Mixed case and digits, so bytewise order differs from case-insensitive
/// order.
pub fn record_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9]{1,12}").expect("Invalid regex")
}

/// Strategy for generating up to `max` distinct record ids.
pub fn distinct_ids_strategy(max: usize) -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set(record_id_strategy(), 0..=max)
        .prop_map(|ids| ids.into_iter().collect())
}

/// Strategy for generating a scalar column value.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1_000i64..1_000).prop_map(Value::Integer),
        prop::string::string_regex("[a-z ]{0,16}")
            .expect("Invalid regex")
            .prop_map(Value::Text),
    ]
}

/// Strategy for generating values of the given columns.
pub fn field_map_strategy(
    columns: &'static [&'static str],
) -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::vec(field_value_strategy(), columns.len()).prop_map(move |values| {
        columns
            .iter()
            .map(|c| (*c).to_string())
            .zip(values)
            .collect()
    })
}

/// Strategy for generating upload page sizes.
pub fn page_size_strategy() -> impl Strategy<Value = usize> {
    1usize..=20
}

/// Strategy for generating sync ticks.
pub fn tick_strategy() -> impl Strategy<Value = u64> {
    1u64..1_000_000
}
