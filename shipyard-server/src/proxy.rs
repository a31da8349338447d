//! Reverse proxy
//!
//! Every request on the public listener is forwarded to the address held
//! by the upstream registry. Without a live release the proxy answers
//! `404 {"message": "NotFound"}`.

use axum::{
    Router,
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

use crate::upstream::Upstream;

/// Bound on establishing the outbound connection, handshake included
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const NOT_FOUND_BODY: &str = r#"{"message": "NotFound"}"#;

/// Headers meaningful for a single connection only
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("invalid CORS origin {0:?}")]
    InvalidOrigin(String),

    #[error("cannot build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

#[derive(Clone)]
struct ProxyState {
    upstream: Arc<dyn Upstream>,
    client: reqwest::Client,
}

/// Builds the public router
///
/// # Arguments
/// * `upstream` - Registry holding the live release address
/// * `origins` - Allowed CORS origins; CORS is disabled when empty
pub fn create_router(upstream: Arc<dyn Upstream>, origins: &[String]) -> Result<Router, ProxyError> {
    let client = reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .redirect(reqwest::redirect::Policy::none())
        .no_proxy()
        .build()?;

    let router = Router::new()
        .fallback(forward)
        .with_state(ProxyState { upstream, client })
        .layer(TraceLayer::new_for_http());

    if origins.is_empty() {
        return Ok(router);
    }
    Ok(router.layer(cors_layer(origins)?))
}

fn cors_layer(origins: &[String]) -> Result<CorsLayer, ProxyError> {
    let origins = origins
        .iter()
        .map(|o| HeaderValue::from_str(o).map_err(|_| ProxyError::InvalidOrigin(o.clone())))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true))
}

async fn forward(State(state): State<ProxyState>, request: Request) -> Response {
    let Ok(addr) = state.upstream.get_default() else {
        return not_found();
    };

    let (parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let url = format!("http://{addr}{path}");

    let mut headers = parts.headers;
    let original_host = headers.remove(header::HOST);
    strip_hop_by_hop(&mut headers);
    if let Some(host) = original_host {
        headers.insert(HeaderName::from_static("x-forwarded-host"), host);
    }

    debug!("Forwarding {} {} to {}", parts.method, path, addr);
    let outbound = state
        .client
        .request(parts.method, url)
        .headers(headers)
        .body(reqwest::Body::wrap_stream(body.into_data_stream()))
        .send()
        .await;

    match outbound {
        Ok(upstream) => {
            let status = upstream.status();
            let mut headers = upstream.headers().clone();
            strip_hop_by_hop(&mut headers);

            let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
            *response.status_mut() = status;
            *response.headers_mut() = headers;
            response
        }
        Err(e) => {
            warn!("Upstream {} unreachable: {}", addr, e);
            StatusCode::BAD_GATEWAY.into_response()
        }
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        [(header::CONTENT_TYPE, "application/json")],
        NOT_FOUND_BODY,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::DefaultUpstream;
    use axum::http::Method;
    use tower::ServiceExt;

    async fn body_string(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    /// Backend answering `<method> <host> <path?query> <body>`
    async fn echo_server() -> u16 {
        async fn echo(request: Request) -> String {
            let (parts, body) = request.into_parts();
            let host = parts
                .headers
                .get(header::HOST)
                .and_then(|h| h.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let body = axum::body::to_bytes(body, usize::MAX).await.unwrap();
            format!(
                "{} {} {} {}",
                parts.method,
                host,
                parts.uri,
                String::from_utf8_lossy(&body)
            )
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, Router::new().fallback(echo))
                .await
                .unwrap();
        });
        port
    }

    #[tokio::test]
    async fn test_no_upstream_returns_not_found() {
        let upstream = Arc::new(DefaultUpstream::new());
        let app = create_router(upstream, &[]).unwrap();

        let response = app
            .oneshot(axum::http::Request::get("/anything").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_string(response).await, r#"{"message": "NotFound"}"#);
    }

    #[tokio::test]
    async fn test_forwards_with_rewritten_host() {
        let port = echo_server().await;
        let upstream = Arc::new(DefaultUpstream::new());
        upstream.set_default(format!("127.0.0.1:{port}"));
        let app = create_router(upstream, &[]).unwrap();

        let request = axum::http::Request::builder()
            .method(Method::POST)
            .uri("/api/items?page=2")
            .header(header::HOST, "shipyard.example.com")
            .body(Body::from("payload"))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            body_string(response).await,
            format!("POST 127.0.0.1:{port} /api/items?page=2 payload")
        );
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_bad_gateway() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let upstream = Arc::new(DefaultUpstream::new());
        upstream.set_default(format!("127.0.0.1:{port}"));
        let app = create_router(upstream, &[]).unwrap();

        let response = app
            .oneshot(axum::http::Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_cors_preflight() {
        let upstream = Arc::new(DefaultUpstream::new());
        let app = create_router(upstream, &["http://app.example.com".to_string()]).unwrap();

        let request = axum::http::Request::builder()
            .method(Method::OPTIONS)
            .uri("/")
            .header(header::ORIGIN, "http://app.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "PUT")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();

        let headers = response.headers();
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://app.example.com"
        );
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_METHODS], "PUT");
    }

    #[test]
    fn test_strip_hop_by_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(HeaderName::from_static("keep-alive"), HeaderValue::from_static("timeout=5"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "text/plain");
    }

    #[test]
    fn test_invalid_origin() {
        let upstream = Arc::new(DefaultUpstream::new());
        assert!(matches!(
            create_router(upstream, &["bad\norigin".to_string()]),
            Err(ProxyError::InvalidOrigin(_))
        ));
    }
}
