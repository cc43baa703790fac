//! The path-routed streaming reverse proxy: hop-by-hop header stripping,
//! `X-Forwarded-*`, and bidirectional streaming with no timeout, built on
//! `axum` + `reqwest`.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Path, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};

use super::AppState;

/// Headers with single-connection scope (RFC 7230 §6.1); never forwarded.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
];

pub async fn proxy_request(
    State(state): State<AppState>,
    Path(params): Path<std::collections::HashMap<String, String>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let app = match params.get("app") {
        Some(app) => app.clone(),
        None => return (StatusCode::NOT_FOUND).into_response(),
    };
    let rest = params.get("rest").cloned().unwrap_or_default();

    let backend = match state.proxy.resolve(&app).await {
        Ok(Some(backend)) => backend,
        Ok(None) => return (StatusCode::NOT_FOUND, "No backend for this app").into_response(),
        Err(err) => {
            tracing::error!(app = %app, error = %err, "Proxy resolution failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response();
        }
    };

    let query = uri.query().map(|q| format!("?{q}")).unwrap_or_default();
    let target = format!("http://{}:{}/{rest}{query}", backend.hostname, backend.port);

    let upstream_method = match reqwest::Method::from_bytes(method.as_str().as_bytes()) {
        Ok(method) => method,
        Err(_) => return (StatusCode::BAD_REQUEST).into_response(),
    };

    let mut upstream_request = state.http_client.request(upstream_method, &target);
    upstream_request = upstream_request.headers(forward_headers(&headers, peer));

    let stream = body.into_data_stream();
    upstream_request = upstream_request.body(reqwest::Body::wrap_stream(stream));

    let upstream_response = match upstream_request.send().await {
        Ok(response) => response,
        Err(err) => {
            tracing::warn!(app = %app, target = %target, error = %err, "Upstream request failed");
            return (StatusCode::BAD_GATEWAY, err.to_string()).into_response();
        }
    };

    let status = upstream_response.status();
    let response_headers = strip_hop_by_hop(upstream_response.headers());
    let body = Body::from_stream(upstream_response.bytes_stream());

    let mut response = Response::new(body);
    *response.status_mut() = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    *response.headers_mut() = response_headers;
    response
}

/// Copy non-hop-by-hop headers to the upstream request, then set
/// `X-Forwarded-For`/`X-Forwarded-Proto` from the incoming header if
/// present, otherwise the peer address / `http`.
fn forward_headers(incoming: &HeaderMap, peer: SocketAddr) -> reqwest::header::HeaderMap {
    let mut out = reqwest::header::HeaderMap::new();
    for (name, value) in incoming.iter() {
        if HOP_BY_HOP.contains(&name.as_str().to_ascii_lowercase().as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
            reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }

    let forwarded_for = incoming
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| peer.ip().to_string());
    let forwarded_proto = incoming
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| "http".to_string());

    if let Ok(value) = reqwest::header::HeaderValue::from_str(&forwarded_for) {
        out.insert("x-forwarded-for", value);
    }
    if let Ok(value) = reqwest::header::HeaderValue::from_str(&forwarded_proto) {
        out.insert("x-forwarded-proto", value);
    }

    out
}

fn strip_hop_by_hop(headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut out = HeaderMap::new();
    for (name, value) in headers.iter() {
        if HOP_BY_HOP.contains(&name.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            out.append(name, value);
        }
    }
    out
}
