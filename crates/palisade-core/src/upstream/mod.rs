//! Upstream node access: request forwarding and chain head fetches.

pub mod client;

pub use client::{ForwardedResponse, UpstreamClient, UpstreamError};
