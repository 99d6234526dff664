//! Chain head tracking.

pub mod latest_block;

pub use latest_block::{BlockNumberSource, LatestBlockCache, ResolveError};
