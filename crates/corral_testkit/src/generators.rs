//! Property-based test generators.

use proptest::prelude::*;

/// Strategy for object payloads: non-empty, modestly sized byte vectors.
pub fn payload_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..256)
}

/// Strategy for a sequence of distinct payload revisions.
///
/// Consecutive revisions differ, so every save in the sequence is a real
/// change rather than a no-op.
pub fn revision_strategy() -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(payload_strategy(), 1..8).prop_map(|mut revisions| {
        revisions.dedup();
        revisions
    })
}

/// Strategy for session parameter pairs.
pub fn session_strategy() -> impl Strategy<Value = Vec<(String, String)>> {
    prop::collection::vec(("[a-z]{1,8}", "[a-zA-Z0-9]{1,16}"), 0..4)
        .prop_map(|pairs| {
            pairs
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        })
}
