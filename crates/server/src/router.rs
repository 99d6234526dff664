//! HTTP routing: service pages on fixed routes, everything else into the
//! gatekeeper.

use axum::{
    body::{to_bytes, Body},
    extract::{ConnectInfo, Request, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use palisade_core::{AppConfig, Gatekeeper, InboundRequest};
use std::{net::SocketAddr, sync::Arc};
use tower_http::cors::CorsLayer;

/// Upper bound on inbound body size; a JSON-RPC batch has no business being
/// larger than this.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Builds the application router: a plain-text homepage and health probe on
/// fixed routes, permissive CORS, and every other request — any method, any
/// path — through the gatekeeper.
pub fn build_router(gatekeeper: Arc<Gatekeeper>, config: &AppConfig) -> Router {
    let homepage = Arc::new(render_homepage(config));
    Router::new()
        .route(
            "/",
            // The method router would otherwise answer POST / with a bare
            // 405; non-GET requests on the root belong to the gatekeeper.
            get(move || {
                let homepage = Arc::clone(&homepage);
                async move { (*homepage).clone() }
            })
            .fallback(proxy),
        )
        .route("/health", get(|| async { StatusCode::OK }))
        .fallback(proxy)
        .layer(CorsLayer::permissive())
        .with_state(gatekeeper)
}

/// Runs one gatekeeping pass and relays the outcome.
async fn proxy(
    State(gatekeeper): State<Arc<Gatekeeper>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(_) => return StatusCode::PAYLOAD_TOO_LARGE.into_response(),
    };

    let outcome = gatekeeper
        .handle(InboundRequest {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            peer_addr: peer.to_string(),
            body,
        })
        .await;

    let mut response = Response::new(Body::from(outcome.body));
    *response.status_mut() = outcome.status;
    *response.headers_mut() = outcome.headers;
    response
}

fn render_homepage(config: &AppConfig) -> String {
    let mut page = String::from("Palisade JSON-RPC proxy\n\n");
    page.push_str(&format!(
        "Rate limit: {} requests per minute per IP (HTTP 429 beyond that).\n",
        config.gate.requests_per_minute
    ));
    if config.gate.block_range_limit > 0 {
        page.push_str(&format!(
            "Log queries may span at most {} blocks.\n",
            config.gate.block_range_limit
        ));
    }
    page.push_str("\nAllowed methods (regular expressions, anything else gets HTTP 405):\n");
    let mut patterns = config.gate.allow.clone();
    patterns.sort();
    for pattern in &patterns {
        page.push_str(&format!("  {pattern}\n"));
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, Method};
    use tower::ServiceExt;

    fn test_config() -> AppConfig {
        AppConfig::from_toml(
            r#"
            [upstream]
            http_url = "http://127.0.0.1:1"

            [gate]
            allow = ["net_.*", "eth_get.*"]
            requests_per_minute = 120
            block_range_limit = 1000
            "#,
        )
        .unwrap()
    }

    fn test_router() -> Router {
        let config = test_config();
        let gatekeeper = Arc::new(Gatekeeper::from_config(&config).unwrap());
        build_router(gatekeeper, &config)
    }

    fn with_peer(request: axum::http::request::Builder) -> axum::http::request::Builder {
        request.extension(ConnectInfo(SocketAddr::from(([203, 0, 113, 9], 51412))))
    }

    #[tokio::test]
    async fn test_homepage_lists_policy() {
        let response = test_router()
            .oneshot(with_peer(Request::builder().uri("/")).body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("120 requests per minute"));
        assert!(text.contains("eth_get.*"));
        assert!(text.contains("at most 1000 blocks"));
    }

    #[tokio::test]
    async fn test_health_probe() {
        let response = test_router()
            .oneshot(with_peer(Request::builder().uri("/health")).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_disallowed_method_rejected_through_router() {
        let request = with_peer(
            Request::builder()
                .method(Method::POST)
                .uri("/")
                .header(header::CONTENT_TYPE, "application/json"),
        )
        .body(Body::from(r#"{"id":1,"method":"eth_call","params":[]}"#))
        .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

        let body = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], -32601);
        assert_eq!(
            json["error"]["message"],
            "You are not authorized to make this request: eth_call"
        );
    }

    #[tokio::test]
    async fn test_post_root_reaches_gatekeeper() {
        // The root path serves the homepage on GET only; a POST there is the
        // canonical JSON-RPC request and must produce a gatekeeper verdict,
        // not the method router's empty 405.
        let request = with_peer(Request::builder().method(Method::POST).uri("/"))
            .body(Body::from(r#"{"id":1,"method":"eth_getBalance","params":[]}"#))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), MAX_BODY_BYTES).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        // eth_getBalance passes the allow-list; with no upstream listening
        // the gatekeeper synthesizes its internal error, proving the request
        // went through the full pipeline.
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(json["error"]["code"], -32603);
        assert_eq!(json["id"], 1);
    }

    #[tokio::test]
    async fn test_unparseable_body_rejected_through_router() {
        let request = with_peer(Request::builder().method(Method::POST).uri("/"))
            .body(Body::from("{nope"))
            .unwrap();

        let response = test_router().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
