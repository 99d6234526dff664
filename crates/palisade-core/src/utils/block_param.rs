//! Block parameter parsing helpers.
//!
//! Provides consistent hex parsing for block numbers so the range guard and
//! the upstream client share one implementation.

/// Parse a hex string to u64, with or without the `0x` prefix.
///
/// # Examples
/// ```
/// use palisade_core::utils::block_param::parse_hex;
///
/// assert_eq!(parse_hex("0xff"), Some(255));
/// assert_eq!(parse_hex("ff"), Some(255));
/// assert_eq!(parse_hex("nope"), None);
/// ```
#[must_use]
pub fn parse_hex(s: &str) -> Option<u64> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(s, 16).ok()
}

/// Extract a block number from a JSON value holding a hex-encoded string,
/// the shape `eth_blockNumber` returns in its `result` field.
#[must_use]
pub fn from_json_value(value: &serde_json::Value) -> Option<u64> {
    value.as_str().and_then(parse_hex)
}
