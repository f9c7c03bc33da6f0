// 🔢 ID Allocator - Sequential prefixed identifiers
// "S" + ["S0001", "S0002"] -> "S0003"

/// Numeric suffix of an identifier under the given prefix.
/// Unparsable suffixes and foreign prefixes count as 0.
fn parse_numeric(identifier: &str, prefix: &str) -> u32 {
    match identifier.strip_prefix(prefix) {
        Some(suffix) => suffix.parse().unwrap_or(0),
        None => 0,
    }
}

/// Next unused identifier for a prefix, zero-padded to width 4.
///
/// Deterministic for a given existing-id set. Two callers that observe the
/// same snapshot compute the same candidate, so allocation must happen under
/// the lock that produced the snapshot (see `RecordStore::allocate_id`).
pub fn next_id<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let highest = existing
        .into_iter()
        .map(|id| parse_numeric(id, prefix))
        .max()
        .unwrap_or(0);
    format!("{}{:04}", prefix, highest + 1)
}

// ============================================================================
// TESTS
// ============================================================================
