//! The gatekeeping error taxonomy and its HTTP / JSON-RPC mapping.

use crate::types::{ErrorResponse, CODE_INTERNAL, CODE_INVALID_PARAMS};
use http::StatusCode;
use serde_json::value::RawValue;

/// Everything that makes the gatekeeper reject a request instead of
/// forwarding it. No variant is fatal; each resolves to one synthesized
/// JSON-RPC error response.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Malformed or unreadable body; checked before anything else.
    #[error("{0}")]
    Parse(String),

    /// The client's token bucket is empty.
    #[error("You hit the request limit")]
    RateLimited,

    /// The method matched no allow-list pattern.
    #[error("You are not authorized to make this request: {0}")]
    NotAllowed(String),

    /// A log filter that cannot be gated: bad shape or an inverted range.
    #[error("{0}")]
    InvalidParams(String),

    /// The requested (or accumulated) block span is too large.
    #[error("Requested range of blocks ({blocks}) is larger than limit ({limit}).")]
    RangeExceeded { blocks: u64, limit: u64 },

    /// Resolving the chain head failed; carries the underlying error text.
    #[error("{0}")]
    Internal(String),
}

impl GateError {
    /// HTTP status for the synthesized response.
    #[must_use]
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Parse(_) | Self::InvalidParams(_) | Self::RangeExceeded { .. } => {
                StatusCode::BAD_REQUEST
            }
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::NotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The JSON-RPC error body, keyed to the failing call's id.
    #[must_use]
    pub fn response<'a>(&self, id: Option<&'a RawValue>) -> ErrorResponse<'a> {
        match self {
            Self::Parse(msg) | Self::InvalidParams(msg) => {
                ErrorResponse::new(id, CODE_INVALID_PARAMS, msg.clone())
            }
            Self::RateLimited => ErrorResponse::limited(id),
            Self::NotAllowed(method) => ErrorResponse::unauthorized(id, method),
            Self::RangeExceeded { blocks, limit } => ErrorResponse::block_range(id, *blocks, *limit),
            Self::Internal(msg) => ErrorResponse::new(id, CODE_INTERNAL, msg.clone()),
        }
    }
}
