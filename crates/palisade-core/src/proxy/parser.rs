//! Extraction of logical RPC calls and the client IP from a raw HTTP request.

use crate::types::RpcCall;
use http::HeaderMap;
use serde::Deserialize;
use serde_json::value::RawValue;
use std::net::SocketAddr;

/// Malformed or unreadable request body; carries the decode message.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ParseError(String);

/// The ordered logical calls of one HTTP request, plus the flattened method
/// names in call order for log correlation.
#[derive(Debug)]
pub struct ParsedRequest {
    pub calls: Vec<RpcCall>,
    pub methods: Vec<String>,
}

/// One element of a JSON-RPC body. Absent fields default rather than error;
/// gating only needs the method, id and params, everything else is opaque.
#[derive(Deserialize)]
struct WireCall {
    #[serde(default)]
    id: Option<Box<RawValue>>,
    #[serde(default)]
    method: String,
    #[serde(default)]
    params: Vec<Box<RawValue>>,
}

/// Resolves the original client IP with strict precedence: the
/// `CF-Connecting-IP` header, then the first `X-Forwarded-For` entry, then
/// the transport peer address (with any port stripped).
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer_addr: &str) -> String {
    if let Some(ip) = header_str(headers, "CF-Connecting-IP") {
        return ip.to_string();
    }
    if let Some(forwarded) = header_str(headers, "X-Forwarded-For") {
        if let Some(first) = forwarded.split(',').next() {
            return first.trim().to_string();
        }
    }
    match peer_addr.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => peer_addr.to_string(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).filter(|s| !s.is_empty())
}

/// Batch detection: the body is a batch iff its first significant byte is
/// `[`, skipping leading whitespace (space, tab, LF, CR).
#[must_use]
pub fn is_batch(body: &[u8]) -> bool {
    for &b in body {
        match b {
            0x20 | 0x09 | 0x0a | 0x0d => continue,
            other => return other == b'[',
        }
    }
    false
}

/// Parses one HTTP request into ordered logical calls.
///
/// A non-empty body is decoded as a single JSON-RPC object or a batch array,
/// each call stamped with the resolved client IP. An empty body (e.g. GET)
/// synthesizes exactly one call whose method is the URL path and which
/// carries no id.
///
/// # Errors
///
/// Returns [`ParseError`] with the underlying decode message when the body
/// is not valid JSON of the expected shape.
pub fn parse_calls(
    headers: &HeaderMap,
    peer_addr: &str,
    path: &str,
    body: &[u8],
) -> Result<ParsedRequest, ParseError> {
    let ip = client_ip(headers, peer_addr);

    let mut calls = Vec::new();
    if !body.is_empty() {
        if is_batch(body) {
            let batch: Vec<WireCall> = serde_json::from_slice(body)
                .map_err(|e| ParseError(format!("failed to parse JSON batch request: {e}")))?;
            calls.extend(batch.into_iter().map(|call| RpcCall {
                id: call.id,
                method: call.method,
                params: call.params,
                remote_ip: ip.clone(),
            }));
        } else {
            let call: WireCall = serde_json::from_slice(body)
                .map_err(|e| ParseError(format!("failed to parse JSON request: {e}")))?;
            calls.push(RpcCall {
                id: call.id,
                method: call.method,
                params: call.params,
                remote_ip: ip.clone(),
            });
        }
    }
    if calls.is_empty() {
        calls.push(RpcCall {
            id: None,
            method: path.to_string(),
            params: Vec::new(),
            remote_ip: ip,
        });
    }

    let methods = calls.iter().map(|call| call.method.clone()).collect();
    Ok(ParsedRequest { calls, methods })
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                http::header::HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_client_ip_precedence() {
        let h = headers(&[("CF-Connecting-IP", "1.1.1.1"), ("X-Forwarded-For", "2.2.2.2")]);
        assert_eq!(client_ip(&h, "3.3.3.3:1234"), "1.1.1.1");

        let h = headers(&[("X-Forwarded-For", "2.2.2.2, 9.9.9.9, 8.8.8.8")]);
        assert_eq!(client_ip(&h, "3.3.3.3:1234"), "2.2.2.2");

        assert_eq!(client_ip(&HeaderMap::new(), "3.3.3.3:1234"), "3.3.3.3");
        assert_eq!(client_ip(&HeaderMap::new(), "[::1]:8545"), "::1");
        assert_eq!(client_ip(&HeaderMap::new(), "not-an-addr"), "not-an-addr");
    }

    #[test]
    fn test_is_batch() {
        assert!(is_batch(b"[]"));
        assert!(is_batch(b" \t\r\n [{\"method\":\"m\"}]"));
        assert!(!is_batch(b"{\"method\":\"m\"}"));
        assert!(!is_batch(b"  {\"method\":\"m\"}"));
        assert!(!is_batch(b""));
        assert!(!is_batch(b"   "));
    }

    #[test]
    fn test_single_object_body() {
        let body = br#"{"id":7,"method":"eth_chainId","params":[]}"#;
        let parsed = parse_calls(&HeaderMap::new(), "5.5.5.5:1", "/", body).unwrap();
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.calls[0].method, "eth_chainId");
        assert_eq!(parsed.calls[0].id.as_ref().unwrap().get(), "7");
        assert_eq!(parsed.calls[0].remote_ip, "5.5.5.5");
        assert_eq!(parsed.methods, vec!["eth_chainId"]);
    }

    #[test]
    fn test_batch_preserves_order() {
        let body = br#"[{"id":1,"method":"net_version"},{"id":"two","method":"eth_blockNumber"}]"#;
        let parsed = parse_calls(&HeaderMap::new(), "5.5.5.5:1", "/", body).unwrap();
        assert_eq!(parsed.methods, vec!["net_version", "eth_blockNumber"]);
        assert_eq!(parsed.calls[1].id.as_ref().unwrap().get(), r#""two""#);
    }

    #[test]
    fn test_malformed_json_carries_decode_message() {
        let err = parse_calls(&HeaderMap::new(), "5.5.5.5:1", "/", b"{oops").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse JSON request: "));

        let err = parse_calls(&HeaderMap::new(), "5.5.5.5:1", "/", b"[{oops").unwrap_err();
        assert!(err.to_string().starts_with("failed to parse JSON batch request: "));
    }

    #[test]
    fn test_empty_body_synthesizes_path_call() {
        let parsed = parse_calls(&HeaderMap::new(), "5.5.5.5:1", "/x/net_version", b"").unwrap();
        assert_eq!(parsed.calls.len(), 1);
        assert_eq!(parsed.calls[0].method, "/x/net_version");
        assert!(parsed.calls[0].id.is_none());
        assert!(parsed.calls[0].params.is_empty());
    }

    #[test]
    fn test_missing_fields_default() {
        let body = br#"{"method":"eth_blockNumber"}"#;
        let parsed = parse_calls(&HeaderMap::new(), "5.5.5.5:1", "/", body).unwrap();
        assert!(parsed.calls[0].id.is_none());
        assert!(parsed.calls[0].params.is_empty());
    }
}
