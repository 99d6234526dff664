//! # Palisade Core
//!
//! Core library for Palisade, a protective reverse proxy for JSON-RPC
//! blockchain nodes. Permitted requests are forwarded to a single upstream
//! endpoint unchanged; everything else is rejected before it reaches the node.
//!
//! This crate provides the foundational components for:
//!
//! - **[`proxy`]**: The request gatekeeping pipeline — parsing logical RPC
//!   calls out of inbound bodies (including JSON-RPC batches), the block-range
//!   guard for log queries, and the [`proxy::Gatekeeper`] that orchestrates a
//!   pass/forward or reject decision per request.
//!
//! - **[`middleware`]**: Per-client token-bucket rate limiting and the
//!   regex-based method allow-list.
//!
//! - **[`chain`]**: TTL-cached, single-flight resolution of the upstream
//!   chain head block number.
//!
//! - **[`upstream`]**: The HTTP client used both for forwarding admitted
//!   requests and for fetching the latest block number.
//!
//! - **[`config`]**: Layered application configuration (defaults, TOML file,
//!   environment overrides).
//!
//! ## Request Flow
//!
//! ```text
//! Client Request
//!       │
//!       ▼
//! ┌──────────────┐
//! │ RequestParser│ ─── malformed ──► 400 (-32602)
//! └──────┬───────┘
//!        │ ordered calls
//!        ▼            per call, in order:
//! ┌──────────────┐
//! │ Gatekeeper   │ ── rate limited ──► 429 (-32000)
//! │              │ ── not allowed ───► 405 (-32601)
//! │              │ ── range too big ─► 400 (-32602)
//! │              │ ── resolver down ─► 500 (-32603)
//! └──────┬───────┘
//!        │ all calls pass
//!        ▼
//! ┌──────────────┐
//! │   Upstream   │ ──► response relayed verbatim
//! └──────────────┘
//! ```
//!
//! The first failing check rejects the *entire* batch with one JSON-RPC error
//! keyed to the failing call's id.

pub mod chain;
pub mod config;
pub mod middleware;
pub mod proxy;
pub mod types;
pub mod upstream;
pub mod utils;

pub use config::AppConfig;
pub use proxy::{Gatekeeper, GateResponse, InboundRequest};
