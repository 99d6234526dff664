//! JSON-RPC wire types shared across the gatekeeping pipeline.
//!
//! Call ids and parameters are kept as raw JSON ([`RawValue`]) so that the
//! proxy never re-encodes client data: a string id stays a string, a number
//! stays a number, and parameter objects are only decoded by the components
//! that actually need to look inside them.

use serde::Serialize;
use serde_json::value::RawValue;

/// JSON-RPC protocol version constant to avoid repeated allocations.
pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC error code for rate-limited clients.
pub const CODE_LIMITED: i64 = -32000;
/// JSON-RPC error code for methods outside the allow-list.
pub const CODE_UNAVAILABLE: i64 = -32601;
/// JSON-RPC error code for parse errors and invalid parameters.
pub const CODE_INVALID_PARAMS: i64 = -32602;
/// JSON-RPC error code for internal proxy failures.
pub const CODE_INTERNAL: i64 = -32603;

/// One logical RPC call extracted from an inbound HTTP request.
///
/// A single-object body yields one call, a batch body yields one per array
/// element, and an empty body yields a synthesized call whose method is the
/// URL path. Produced fresh per HTTP request and never persisted.
#[derive(Debug)]
pub struct RpcCall {
    /// Opaque correlation token; absent for notifications and synthesized calls.
    pub id: Option<Box<RawValue>>,
    /// Method name, or the URL path for empty-body requests.
    pub method: String,
    /// Positional parameters, kept as raw JSON.
    pub params: Vec<Box<RawValue>>,
    /// Client IP resolved from proxy headers or the transport peer address.
    pub remote_ip: String,
}

/// The error object inside a synthesized JSON-RPC error response.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// A synthesized JSON-RPC error response.
///
/// Serializes to the exact shape
/// `{"jsonrpc":"2.0","id":<id>,"error":{"code":<int>,"message":<string>}}`,
/// with a `null` id when the failing call carried none.
#[derive(Debug, Serialize)]
pub struct ErrorResponse<'a> {
    pub jsonrpc: &'static str,
    pub id: Option<&'a RawValue>,
    pub error: JsonRpcError,
}

impl<'a> ErrorResponse<'a> {
    pub fn new(id: Option<&'a RawValue>, code: i64, message: String) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id, error: JsonRpcError { code, message } }
    }

    /// Response body for a rate-limited client.
    pub fn limited(id: Option<&'a RawValue>) -> Self {
        Self::new(id, CODE_LIMITED, "You hit the request limit".to_string())
    }

    /// Response body for a method outside the allow-list.
    pub fn unauthorized(id: Option<&'a RawValue>, method: &str) -> Self {
        Self::new(
            id,
            CODE_UNAVAILABLE,
            format!("You are not authorized to make this request: {method}"),
        )
    }

    /// Response body for a block range query exceeding the configured limit.
    pub fn block_range(id: Option<&'a RawValue>, blocks: u64, limit: u64) -> Self {
        Self::new(
            id,
            CODE_INVALID_PARAMS,
            format!("Requested range of blocks ({blocks}) is larger than limit ({limit})."),
        )
    }

    /// Serializes the response body to JSON bytes.
    ///
    /// # Panics
    ///
    /// Panics if serialization fails, which cannot happen: every field is
    /// either a static string, an integer, or already-valid raw JSON.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("error response serialization cannot fail")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(s: &str) -> Box<RawValue> {
        RawValue::from_string(s.to_string()).unwrap()
    }

    #[test]
    fn test_error_response_shape() {
        let id = raw("1");
        let body = ErrorResponse::limited(Some(&id)).to_bytes();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"You hit the request limit"}}"#
        );
    }

    #[test]
    fn test_error_response_null_id() {
        let body = ErrorResponse::new(None, CODE_INVALID_PARAMS, "bad".to_string()).to_bytes();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"jsonrpc":"2.0","id":null,"error":{"code":-32602,"message":"bad"}}"#
        );
    }

    #[test]
    fn test_error_response_string_id_preserved() {
        let id = raw(r#""abc""#);
        let body = ErrorResponse::unauthorized(Some(&id), "eth_call").to_bytes();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"jsonrpc":"2.0","id":"abc","error":{"code":-32601,"message":"You are not authorized to make this request: eth_call"}}"#
        );
    }

    #[test]
    fn test_block_range_message() {
        let resp = ErrorResponse::block_range(None, 200, 150);
        assert_eq!(
            resp.error.message,
            "Requested range of blocks (200) is larger than limit (150)."
        );
    }
}
