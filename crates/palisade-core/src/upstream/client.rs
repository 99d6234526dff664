//! HTTP client for the single upstream JSON-RPC endpoint.
//!
//! One shared [`reqwest::Client`] serves both duties the proxy has toward its
//! upstream: relaying admitted requests byte-for-byte, and the periodic
//! `eth_blockNumber` call behind [`crate::chain::LatestBlockCache`].

use crate::{
    chain::BlockNumberSource,
    types::JSONRPC_VERSION,
    utils::block_param,
};
use async_trait::async_trait;
use bytes::Bytes;
use http::{header, HeaderMap, Method, StatusCode};
use serde_json::json;
use std::time::Duration;
use url::Url;

/// Failure talking to the upstream node.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The upstream answered, but not with anything usable.
    #[error("{0}")]
    Payload(String),
}

impl UpstreamError {
    /// HTTP status attached to a transport failure, when the upstream got far
    /// enough to produce one.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Transport(e) => e.status(),
            Self::Payload(_) => None,
        }
    }
}

/// An upstream response captured for verbatim relay.
#[derive(Debug)]
pub struct ForwardedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// Client for the configured upstream target.
pub struct UpstreamClient {
    http: reqwest::Client,
    target: Url,
}

/// Hop-by-hop headers that must not be relayed in either direction.
const HOP_BY_HOP: &[header::HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

impl UpstreamClient {
    /// Builds a client for `target` with the given request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be constructed.
    pub fn new(target: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http, target })
    }

    /// Relays an admitted request to the upstream and captures its response.
    ///
    /// The body is the untouched original; `host` overrides the Host header
    /// (the caller passes the client's remote address, a workaround for
    /// hostname routing behind CloudFlare). The upstream's status is part of
    /// the captured response, never an error — only transport-level failures
    /// error here.
    ///
    /// # Errors
    ///
    /// Returns [`UpstreamError::Transport`] when the request cannot be sent
    /// or the response body cannot be read.
    pub async fn forward(
        &self,
        method: Method,
        path_and_query: &str,
        headers: &HeaderMap,
        host: &str,
        body: Bytes,
    ) -> Result<ForwardedResponse, UpstreamError> {
        // Appended, not `Url::join`ed: an absolute inbound path would
        // otherwise replace a base path on the target (e.g. `/v3/KEY`).
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path_and_query, None),
        };
        let mut url = self.target.clone();
        url.set_path(&format!("{}{path}", self.target.path().trim_end_matches('/')));
        url.set_query(query);

        let mut outbound = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            if HOP_BY_HOP.contains(name) || *name == header::HOST || *name == header::CONTENT_LENGTH
            {
                continue;
            }
            outbound.append(name, value.clone());
        }
        if let Ok(value) = host.parse() {
            outbound.insert(header::HOST, value);
        }

        let response =
            self.http.request(method, url).headers(outbound).body(body).send().await?;

        let status = response.status();
        let mut headers = response.headers().clone();
        headers.remove(header::TRANSFER_ENCODING);
        headers.remove(header::CONTENT_LENGTH);
        let body = response.bytes().await?;

        Ok(ForwardedResponse { status, headers, body })
    }
}

#[async_trait]
impl BlockNumberSource for UpstreamClient {
    /// Fetches the chain head via the upstream's own `eth_blockNumber`.
    async fn latest_block_number(&self) -> Result<u64, UpstreamError> {
        let request = json!({
            "jsonrpc": JSONRPC_VERSION,
            "id": 1,
            "method": "eth_blockNumber",
            "params": [],
        });

        let response: serde_json::Value = self
            .http
            .post(self.target.clone())
            .json(&request)
            .send()
            .await?
            .json()
            .await?;

        if let Some(error) = response.get("error") {
            return Err(UpstreamError::Payload(format!("eth_blockNumber failed: {error}")));
        }
        response
            .get("result")
            .and_then(block_param::from_json_value)
            .ok_or_else(|| {
                UpstreamError::Payload(format!("unexpected eth_blockNumber result: {response}"))
            })
    }
}
