//! Block-range derivation and bounding for log queries.

use crate::{
    chain::{LatestBlockCache, ResolveError},
    types::RpcCall,
    utils::block_param,
};
use serde::{de, Deserialize, Deserializer};
use std::fmt;

/// Inclusive span of block numbers requested by a log-query call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub start: u64,
    pub end: u64,
}

impl BlockRange {
    /// Number of blocks covered, `end - start + 1`, saturating at
    /// [`u64::MAX`] so the full span still compares as over any limit.
    #[must_use]
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Widens this range to the union of both: minimum start, maximum end.
    /// Commutative and associative.
    pub fn extend(&mut self, other: &BlockRange) {
        if other.start < self.start {
            self.start = other.start;
        }
        if other.end > self.end {
            self.end = other.end;
        }
    }
}

/// Why a call failed the range guard.
#[derive(Debug, PartialEq, Eq)]
pub enum RangeError {
    /// The filter parameter is malformed or describes an impossible range.
    Invalid(String),
    /// The chain head could not be resolved; carries the underlying error text.
    Internal(String),
}

/// A block bound inside a log filter: either a concrete number or a symbolic
/// marker for the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockId {
    Number(u64),
    /// `"latest"` or `"pending"`, resolved through the head cache.
    Head,
}

impl<'de> Deserialize<'de> for BlockId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct BlockIdVisitor;

        impl de::Visitor<'_> for BlockIdVisitor {
            type Value = BlockId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a block number or one of \"latest\", \"pending\", \"earliest\"")
            }

            fn visit_str<E: de::Error>(self, s: &str) -> Result<BlockId, E> {
                match s {
                    "latest" | "pending" => Ok(BlockId::Head),
                    "earliest" => Ok(BlockId::Number(0)),
                    _ => block_param::parse_hex(s)
                        .or_else(|| s.parse().ok())
                        .map(BlockId::Number)
                        .ok_or_else(|| E::custom(format!("invalid block number: {s:?}"))),
                }
            }

            fn visit_u64<E: de::Error>(self, n: u64) -> Result<BlockId, E> {
                Ok(BlockId::Number(n))
            }
        }

        deserializer.deserialize_any(BlockIdVisitor)
    }
}

/// The subset of an `eth_getLogs` filter the guard cares about. Addresses
/// and topics are opaque to gating and ignored.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogFilter {
    #[serde(default)]
    block_hash: Option<String>,
    #[serde(default)]
    from_block: Option<BlockId>,
    #[serde(default)]
    to_block: Option<BlockId>,
}

/// Derives the block range one call asks for, or `None` when no range check
/// applies (no parameters, or a `blockHash` filter that pins one point).
///
/// `start` defaults to 0 when `fromBlock` is absent; `end` resolves to the
/// chain head when `toBlock` is absent or symbolic. A resolved range with
/// `end` before `start` is rejected as invalid rather than underflowing.
///
/// # Errors
///
/// [`RangeError::Invalid`] for a malformed filter or inverted range,
/// [`RangeError::Internal`] when resolving a symbolic bound fails upstream.
pub async fn call_range(
    call: &RpcCall,
    head: &LatestBlockCache,
) -> Result<Option<BlockRange>, RangeError> {
    let Some(first) = call.params.first() else {
        return Ok(None);
    };

    let filter: LogFilter =
        serde_json::from_str(first.get()).map_err(|e| RangeError::Invalid(e.to_string()))?;

    if filter.block_hash.is_some() {
        return Ok(None);
    }

    let start = match filter.from_block {
        None => 0,
        Some(BlockId::Number(n)) => n,
        Some(BlockId::Head) => resolve_head(head).await?,
    };
    let end = match filter.to_block {
        None | Some(BlockId::Head) => resolve_head(head).await?,
        Some(BlockId::Number(n)) => n,
    };

    if end < start {
        return Err(RangeError::Invalid(format!(
            "invalid block range: fromBlock ({start}) is after toBlock ({end})"
        )));
    }

    Ok(Some(BlockRange { start, end }))
}

async fn resolve_head(head: &LatestBlockCache) -> Result<u64, RangeError> {
    match head.get().await {
        Ok(number) => Ok(number),
        Err(err @ (ResolveError::Upstream(_) | ResolveError::Interrupted)) => {
            Err(RangeError::Internal(err.to_string()))
        }
    }
}
