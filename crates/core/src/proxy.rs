//! Proxy resolution: `app[:version]` → a live backend, with a short-TTL
//! cache.
//!
//! HTTP framing (headers, streaming) lives in the `fatsd` binary; this
//! module is the pure `(store, app string) -> backend` resolution, kept
//! separate so it stays testable without spinning up an HTTP server.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::{ServiceRecord, Store};

/// Everything a caller needs to construct the upstream URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Backend {
    pub hostname: String,
    pub port: i64,
}

struct CacheEntry {
    value: Option<Backend>,
    expires_at: Instant,
}

/// Resolves `{app}` path segments against the store, caching results for up
/// to `ttl`, keyed by the raw `{app}` string.
pub struct ProxyResolver {
    store: Store,
    ttl: Duration,
    // A single mutex guarding the whole map gives single-flight semantics
    // for free: the first concurrent miss holds the lock across the store
    // query, so every other caller for the same (or any) key simply waits
    // instead of issuing a redundant query.
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl ProxyResolver {
    pub fn new(store: Store, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve the raw `{app}` string (e.g. `hello` or `hello:1.0.0`) to a
    /// backend, or `None` if nothing matches.
    pub async fn resolve(&self, app: &str) -> Result<Option<Backend>> {
        let mut cache = self.cache.lock().await;

        if let Some(entry) = cache.get(app) {
            if Instant::now() < entry.expires_at {
                return Ok(entry.value.clone());
            }
        }

        let value = self.resolve_uncached(app).await?;
        cache.insert(
            app.to_string(),
            CacheEntry {
                value: value.clone(),
                expires_at: Instant::now() + self.ttl,
            },
        );
        Ok(value)
    }

    async fn resolve_uncached(&self, app: &str) -> Result<Option<Backend>> {
        let project = match app.split_once(':') {
            Some((name, version)) => self.store.get_project_by_name_version(name, version).await?,
            None => self.resolve_latest(app).await?,
        };

        let Some(project) = project else {
            return Ok(None);
        };

        let record = self.store.service_record_for_project(project.id).await?;
        Ok(record.map(backend_of))
    }

    /// `"latest"` if present, otherwise the lexicographically largest
    /// version. Lexicographic, not semver-aware (preserved intentionally).
    async fn resolve_latest(&self, name: &str) -> Result<Option<crate::store::Project>> {
        let mut versions = self.store.list_projects_by_name(name).await?;
        if versions.is_empty() {
            return Ok(None);
        }
        if let Some(pos) = versions.iter().position(|p| p.version == "latest") {
            return Ok(Some(versions.swap_remove(pos)));
        }
        // `list_projects_by_name` already orders by version DESC.
        Ok(Some(versions.remove(0)))
    }
}

fn backend_of(record: ServiceRecord) -> Backend {
    Backend {
        hostname: record.hostname,
        port: record.port,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::NewProject;

    async fn seed(store: &Store, name: &str, version: &str) -> Backend {
        let project = store
            .upsert_project(NewProject {
                name: name.to_string(),
                version: version.to_string(),
                desired_secrets: vec![],
            })
            .await
            .unwrap();
        let record = store
            .insert_service_record(1, "c1", &format!("host-{name}-{version}"), 30000, project.id)
            .await
            .unwrap();
        backend_of(record)
    }

    #[tokio::test]
    async fn resolves_explicit_version() {
        let store = Store::connect_in_memory().await.unwrap();
        let backend = seed(&store, "hello", "1.0.0").await;

        let resolver = ProxyResolver::new(store, Duration::from_secs(300));
        assert_eq!(resolver.resolve("hello:1.0.0").await.unwrap(), Some(backend));
    }

    #[tokio::test]
    async fn prefers_latest_tag_over_lexicographic_order() {
        let store = Store::connect_in_memory().await.unwrap();
        seed(&store, "hello", "1.0.0").await;
        let latest = seed(&store, "hello", "latest").await;

        let resolver = ProxyResolver::new(store, Duration::from_secs(300));
        assert_eq!(resolver.resolve("hello").await.unwrap(), Some(latest));
    }

    #[tokio::test]
    async fn falls_back_to_lexicographically_largest_version() {
        let store = Store::connect_in_memory().await.unwrap();
        seed(&store, "hello", "1.0.0").await;
        let newer = seed(&store, "hello", "2.0.0").await;

        let resolver = ProxyResolver::new(store, Duration::from_secs(300));
        assert_eq!(resolver.resolve("hello").await.unwrap(), Some(newer));
    }

    #[tokio::test]
    async fn unknown_app_resolves_to_none() {
        let store = Store::connect_in_memory().await.unwrap();
        let resolver = ProxyResolver::new(store, Duration::from_secs(300));
        assert_eq!(resolver.resolve("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn cache_expiry_picks_up_store_changes() {
        let store = Store::connect_in_memory().await.unwrap();
        seed(&store, "hello", "1.0.0").await;
        let latest = seed(&store, "hello", "latest").await;

        let resolver = ProxyResolver::new(store.clone(), Duration::from_millis(20));
        assert_eq!(resolver.resolve("hello").await.unwrap(), Some(latest));

        store
            .delete_project(
                store
                    .get_project_by_name_version("hello", "latest")
                    .await
                    .unwrap()
                    .unwrap()
                    .id,
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        let fallback = resolver.resolve("hello").await.unwrap();
        assert_eq!(fallback.map(|b| b.hostname), Some("host-hello-1.0.0".to_string()));
    }
}
