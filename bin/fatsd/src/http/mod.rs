//! The axum HTTP surface: management endpoints and the path-routed proxy.

mod ingress;
mod proxy;

use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::routing::{MethodFilter, on, post};
use fats_core::{AppConfig, ProxyResolver, Scheduler, Store};

/// The proxy's method surface: GET, POST, PUT, DELETE, PATCH. Anything else
/// (HEAD, OPTIONS, TRACE, CONNECT, ...) is not routed.
fn proxy_methods() -> MethodFilter {
    MethodFilter::GET
        .or(MethodFilter::POST)
        .or(MethodFilter::PUT)
        .or(MethodFilter::DELETE)
        .or(MethodFilter::PATCH)
}

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub scheduler: Scheduler,
    pub proxy: Arc<ProxyResolver>,
    pub config: Arc<AppConfig>,
    pub builder_config: Arc<fats_core::BuilderConfig>,
    pub http_client: reqwest::Client,
    pub scratch_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mgmt/tar-upload", post(ingress::upload_archive))
        .route("/mgmt/secret/:name", post(ingress::upsert_secret))
        .route("/app/:app", on(proxy_methods(), proxy::proxy_request))
        .route("/app/:app/", on(proxy_methods(), proxy::proxy_request))
        .route("/app/:app/*rest", on(proxy_methods(), proxy::proxy_request))
        .with_state(state)
}
