//! End-to-end exercises across store, generation, reconciler, and proxy
//! together, rather than each module in isolation. Requires no container
//! engine: the reconciler is driven against a fake [`ContainerOps`].
//!
//! A second test, marked `#[ignore]`, drives the real `ContainerManager`
//! against a running container engine and is meant for manual verification.

use std::collections::HashSet;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use anyhow::Result;
use fats_core::store::NewProject;
use fats_core::{ContainerOps, Generation, GenerationRegistry, ProxyResolver, Reconciler, Store};

/// Mirrors the fake used by the reconciler's own unit tests: containers
/// "exist" only once explicitly registered, `create` always succeeds.
struct FakeContainers {
    live: StdMutex<HashSet<String>>,
    next_port: StdMutex<u16>,
}

impl FakeContainers {
    fn new() -> Self {
        Self {
            live: StdMutex::new(HashSet::new()),
            next_port: StdMutex::new(30000),
        }
    }
}

impl ContainerOps for FakeContainers {
    async fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.live.lock().unwrap().contains(name))
    }

    async fn create(
        &self,
        project: &fats_core::store::Project,
        _generation: i64,
    ) -> Result<fats_core::container::CreatedContainer> {
        let mut port_guard = self.next_port.lock().unwrap();
        let port = *port_guard;
        *port_guard += 1;
        let hostname = format!("fats-{}-{}-0007", project.name, project.version);
        self.live.lock().unwrap().insert(hostname.clone());
        Ok(fats_core::container::CreatedContainer {
            container_id: format!("container-{hostname}"),
            hostname,
            port,
        })
    }

    async fn destroy(&self, container_id: &str) {
        self.live.lock().unwrap().retain(|h| !container_id.ends_with(h.as_str()));
    }
}

/// From an empty store through an upload, a reconciliation pass, and a
/// proxy lookup, all the way to a simulated restart that adopts the
/// existing container under a new process generation.
#[tokio::test]
async fn upload_to_proxy_resolution_round_trip() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();

    let store = Store::connect_in_memory().await.unwrap();

    store
        .upsert_project(NewProject {
            name: "hello".into(),
            version: "1.0.0".into(),
            desired_secrets: vec!["DATABASE_URL".into()],
        })
        .await
        .unwrap();

    let generation = GenerationRegistry::new(store.clone()).current().await.unwrap();
    assert_eq!(generation, Generation(1));

    let reconciler = Reconciler::new(store.clone(), FakeContainers::new());
    let report = reconciler.run_pass(generation.0).await.unwrap();
    assert_eq!(report.created, 1);
    assert!(report.creation_failures.is_empty());

    let proxy = ProxyResolver::new(store.clone(), Duration::from_secs(30));

    // No version pinned: falls back to lexicographically-latest.
    let backend = proxy.resolve("hello").await.unwrap().expect("backend for hello");
    // Pinned version resolves to the same live record.
    let pinned = proxy.resolve("hello:1.0.0").await.unwrap().expect("backend for hello:1.0.0");
    assert_eq!(backend, pinned);

    // Unknown app and unknown version both miss cleanly.
    assert!(proxy.resolve("nope").await.unwrap().is_none());
    assert!(proxy.resolve("hello:9.9.9").await.unwrap().is_none());

    // A second process starts (new generation) and reconciles against the
    // same store; the existing container is still alive, so it is adopted
    // rather than recreated, and the proxy still resolves it.
    let second_generation = GenerationRegistry::new(store.clone()).current().await.unwrap();
    assert_eq!(second_generation, Generation(2));

    let containers_with_hello_alive = FakeContainers::new();
    containers_with_hello_alive
        .live
        .lock()
        .unwrap()
        .insert(backend.hostname.clone());

    let second_reconciler = Reconciler::new(store.clone(), containers_with_hello_alive);
    let second_report = second_reconciler.run_pass(second_generation.0).await.unwrap();
    assert_eq!(second_report.created, 0);
    assert_eq!(second_report.homogenized, 1);

    let records = store.list_service_records().await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].generation, 2);
}

/// Secrets are independent of project/service state and are read back
/// verbatim after an upsert, including overwriting an existing value.
#[tokio::test]
async fn secrets_upsert_then_overwrite() {
    let store = Store::connect_in_memory().await.unwrap();

    assert!(fats_core::secrets::get(&store, "DATABASE_URL").await.unwrap().is_none());

    fats_core::secrets::upsert(&store, "DATABASE_URL", "postgres://first").await.unwrap();
    assert_eq!(
        fats_core::secrets::get(&store, "DATABASE_URL").await.unwrap().as_deref(),
        Some("postgres://first")
    );

    fats_core::secrets::upsert(&store, "DATABASE_URL", "postgres://second").await.unwrap();
    assert_eq!(
        fats_core::secrets::get(&store, "DATABASE_URL").await.unwrap().as_deref(),
        Some("postgres://second")
    );
}

/// Drives the real container engine end to end: create, confirm existence,
/// destroy, confirm gone. Needs a working `docker` (or compatible) binary
/// on PATH and is not run by default.
#[tokio::test]
#[ignore = "requires a running container engine"]
async fn real_container_manager_create_and_destroy() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init()
        .ok();

    let network = fats_core::NetworkManager::new("docker", "fats-integration-test-net");
    network.ensure_network().await.unwrap();

    let manager = fats_core::ContainerManager::new("docker", "fats-integration-test-net");
    let project = fats_core::store::Project {
        id: 1,
        name: "hello".into(),
        version: "1.0.0".into(),
        desired_secrets: vec![],
    };

    let created = manager.create(&project, 1).await.unwrap();
    assert!(manager.exists(&created.hostname).await.unwrap());

    manager.destroy(&created.container_id).await;
    assert!(!manager.exists(&created.hostname).await.unwrap());
}
