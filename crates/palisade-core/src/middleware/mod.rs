//! Per-call admission checks: rate limiting and the method allow-list.
//!
//! These are the CPU-only checks the [`crate::proxy::Gatekeeper`] runs for
//! every logical call before anything touches the network. HTTP adapter code
//! lives in `crates/server`; this module is transport-agnostic.

pub mod method_filter;
pub mod rate_limiting;

pub use method_filter::MethodMatcher;
pub use rate_limiting::VisitorLimiter;
