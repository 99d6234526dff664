//! The gatekeeper: pass/forward or reject, one decision per HTTP request.

use crate::{
    chain::LatestBlockCache,
    config::AppConfig,
    middleware::{MethodMatcher, VisitorLimiter},
    proxy::{
        errors::GateError,
        parser,
        range::{self, BlockRange, RangeError},
    },
    types::{ErrorResponse, RpcCall, CODE_INTERNAL},
    upstream::UpstreamClient,
};
use bytes::Bytes;
use http::{header, HeaderMap, HeaderValue, Method, StatusCode, Uri};
use serde_json::value::RawValue;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// The only method the block-range guard applies to.
const RANGE_LIMITED_METHOD: &str = "eth_getLogs";

/// One inbound HTTP request, reduced to what gating and forwarding need.
/// The body is captured up front so it can be decoded here and still be
/// forwarded byte-for-byte.
#[derive(Debug)]
pub struct InboundRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    /// Transport peer address, e.g. `"203.0.113.9:51412"`.
    pub peer_addr: String,
    pub body: Bytes,
}

/// The response the gatekeeper hands back to the transport layer: either the
/// upstream's verbatim answer or a synthesized JSON-RPC error.
#[derive(Debug)]
pub struct GateResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl GateResponse {
    fn json(status: StatusCode, body: Vec<u8>) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self { status, headers, body: Bytes::from(body) }
    }
}

/// Failure to assemble a [`Gatekeeper`] from configuration.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("invalid allow pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("invalid upstream url: {0}")]
    Url(#[from] url::ParseError),

    #[error("failed to build upstream client: {0}")]
    Client(#[from] reqwest::Error),
}

/// Orchestrates the gatekeeping pipeline for every inbound request.
///
/// Each instance exclusively owns its matcher, limiter and head cache —
/// plain composition, no globals — so independent gatekeepers are fully
/// isolated, which also keeps tests deterministic. The only state shared
/// across requests lives in the limiter registry and the head cache.
pub struct Gatekeeper {
    matcher: MethodMatcher,
    limiter: VisitorLimiter,
    head: LatestBlockCache,
    upstream: Arc<UpstreamClient>,
    /// 0 disables the block-range guard entirely.
    block_range_limit: u64,
}

impl Gatekeeper {
    #[must_use]
    pub fn new(
        matcher: MethodMatcher,
        limiter: VisitorLimiter,
        head: LatestBlockCache,
        upstream: Arc<UpstreamClient>,
        block_range_limit: u64,
    ) -> Self {
        Self { matcher, limiter, head, upstream, block_range_limit }
    }

    /// Builds a gatekeeper from validated application configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError`] when an allow pattern does not compile, the
    /// upstream URL is invalid, or the HTTP client cannot be constructed.
    pub fn from_config(config: &AppConfig) -> Result<Self, BuildError> {
        let matcher = MethodMatcher::new(&config.gate.allow)?;
        let limiter = VisitorLimiter::new(
            config.gate.requests_per_minute,
            config.gate.exempt_ips.iter().cloned(),
        );
        let upstream = Arc::new(UpstreamClient::new(
            config.upstream.http_url.parse()?,
            config.upstream_timeout(),
        )?);
        let head = LatestBlockCache::new(Arc::clone(&upstream) as _);
        Ok(Self::new(matcher, limiter, head, upstream, config.gate.block_range_limit))
    }

    /// The limiter registry, exposed so the server can start idle-bucket
    /// pruning after construction.
    #[must_use]
    pub fn limiter(&self) -> &VisitorLimiter {
        &self.limiter
    }

    /// Runs the full gatekeeping pass for one HTTP request.
    ///
    /// Calls are evaluated in order, each through the fixed sequence: rate
    /// limit, then allow-list, then block-range guard. The first failing
    /// check rejects the entire batch with one error keyed to that call's
    /// id. When every call passes, the original body is forwarded and the
    /// upstream's response is relayed verbatim.
    pub async fn handle(&self, request: InboundRequest) -> GateResponse {
        let parsed = match parser::parse_calls(
            &request.headers,
            &request.peer_addr,
            request.uri.path(),
            &request.body,
        ) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "failed to parse request");
                return reject(None, &GateError::Parse(err.to_string()));
            }
        };
        debug!(methods = ?parsed.methods, "evaluating inbound calls");

        let mut union: Option<BlockRange> = None;
        for call in &parsed.calls {
            if let Some(rejection) = self.evaluate(call, &mut union).await {
                return rejection;
            }
        }

        self.forward(request, &parsed.calls).await
    }

    /// Checks one call; `Some` is the rejection that fails the whole batch.
    async fn evaluate(
        &self,
        call: &RpcCall,
        union: &mut Option<BlockRange>,
    ) -> Option<GateResponse> {
        let id = call.id.as_deref();

        let (allowed, added) = self.limiter.allow_visitor(&call.remote_ip);
        if !allowed {
            debug!(client = %call.remote_ip, "rate limited");
            return Some(reject(id, &GateError::RateLimited));
        }
        if added {
            info!(client = %call.remote_ip, "added new visitor");
        }

        if !self.matcher.matches_any(&call.method) {
            info!(client = %call.remote_ip, method = %call.method, "method not allowed");
            return Some(reject(id, &GateError::NotAllowed(call.method.clone())));
        }

        if self.block_range_limit == 0 || call.method != RANGE_LIMITED_METHOD {
            return None;
        }
        let range = match range::call_range(call, &self.head).await {
            Ok(None) => return None,
            Ok(Some(range)) => range,
            Err(RangeError::Invalid(msg)) => {
                return Some(reject(id, &GateError::InvalidParams(msg)));
            }
            Err(RangeError::Internal(msg)) => {
                return Some(reject(id, &GateError::Internal(msg)));
            }
        };

        if range.len() > self.block_range_limit {
            return Some(reject(
                id,
                &GateError::RangeExceeded { blocks: range.len(), limit: self.block_range_limit },
            ));
        }
        match union {
            None => *union = Some(range),
            Some(union) => {
                // The union of individually small ranges can still be too
                // wide; the call that tips it over supplies the id.
                union.extend(&range);
                if union.len() > self.block_range_limit {
                    return Some(reject(
                        id,
                        &GateError::RangeExceeded {
                            blocks: union.len(),
                            limit: self.block_range_limit,
                        },
                    ));
                }
            }
        }
        None
    }

    async fn forward(&self, request: InboundRequest, calls: &[RpcCall]) -> GateResponse {
        let path_and_query =
            request.uri.path_and_query().map_or("/", |pq| pq.as_str()).to_string();

        // Host is rewritten to the client's remote address, a workaround for
        // hostname routing behind CloudFlare.
        match self
            .upstream
            .forward(
                request.method,
                &path_and_query,
                &request.headers,
                &request.peer_addr,
                request.body,
            )
            .await
        {
            Ok(response) => GateResponse {
                status: response.status,
                headers: response.headers,
                body: response.body,
            },
            Err(err) => {
                error!(error = %err, "forwarding to upstream failed");
                let status = err.status().unwrap_or(StatusCode::BAD_GATEWAY);
                let id = calls.first().and_then(|call| call.id.as_deref());
                GateResponse::json(
                    status,
                    ErrorResponse::new(id, CODE_INTERNAL, err.to_string()).to_bytes(),
                )
            }
        }
    }
}

fn reject(id: Option<&RawValue>, err: &GateError) -> GateResponse {
    GateResponse::json(err.http_status(), err.response(id).to_bytes())
}
