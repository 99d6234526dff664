//! The request gatekeeping pipeline.
//!
//! [`parser`] turns a raw HTTP request into ordered logical calls, [`range`]
//! derives and bounds block ranges for log queries, and [`engine`] runs the
//! fixed per-call check sequence — rate limit, allow-list, range guard —
//! before forwarding to the upstream.

pub mod engine;
pub mod errors;
pub mod parser;
pub mod range;

pub use engine::{Gatekeeper, GateResponse, InboundRequest};
pub use errors::GateError;
pub use parser::{ParsedRequest, ParseError};
pub use range::BlockRange;
