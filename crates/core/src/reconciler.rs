//! The reconciliation loop: compares desired projects against live service
//! records and converges them. This is the heart of the control plane.

use std::collections::HashMap;

use anyhow::Result;
use tokio::sync::Mutex;

use crate::container::{ContainerManager, CreatedContainer};
use crate::store::{Project, ServiceRecord, Store};

/// Abstraction over container existence/lifecycle so the reconciler's
/// decision logic can be exercised without a real container engine.
/// `ContainerManager` is the only production implementation.
pub trait ContainerOps: Send + Sync {
    async fn exists(&self, name: &str) -> Result<bool>;
    async fn create(&self, project: &Project, generation: i64) -> Result<CreatedContainer>;
    async fn destroy(&self, container_id: &str);
}

impl ContainerOps for ContainerManager {
    async fn exists(&self, name: &str) -> Result<bool> {
        ContainerManager::exists(self, name).await
    }

    async fn create(&self, project: &Project, generation: i64) -> Result<CreatedContainer> {
        ContainerManager::create(self, project, generation).await
    }

    async fn destroy(&self, container_id: &str) {
        ContainerManager::destroy(self, container_id).await
    }
}

/// Outcome of attempting to adopt or drop one orphaned service record.
enum Homogenized {
    /// The record is still valid; its project is satisfied for this pass.
    Kept { project_id: i64 },
    /// The record was deleted; its project (if any) still needs a container.
    Dropped,
}

pub struct Reconciler<C: ContainerOps> {
    store: Store,
    container: C,
    /// Held for the duration of a pass so overlapping ticks serialize rather
    /// than run concurrently.
    pass_lock: Mutex<()>,
}

/// Failures collected from one fan-out phase; reported but non-fatal.
#[derive(Debug, Default)]
pub struct PassReport {
    pub created: usize,
    pub homogenized: usize,
    pub dropped: usize,
    pub creation_failures: Vec<String>,
}

impl<C: ContainerOps> Reconciler<C> {
    pub fn new(store: Store, container: C) -> Self {
        Self {
            store,
            container,
            pass_lock: Mutex::new(()),
        }
    }

    /// Run one full reconciliation pass.
    pub async fn run_pass(&self, generation: i64) -> Result<PassReport> {
        let _guard = self.pass_lock.lock().await;

        let records = self.store.list_service_records().await?;
        let projects = self.store.list_projects().await?;
        let mut todo: HashMap<i64, Project> =
            projects.into_iter().map(|p| (p.id, p.clone())).collect();

        let (current, orphan): (Vec<ServiceRecord>, Vec<ServiceRecord>) =
            records.into_iter().partition(|r| r.generation == generation);

        let mut report = PassReport::default();

        // Phase 1: orphan adoption, fully completes before phase 2 begins.
        // Otherwise a project about to be adopted could get a duplicate
        // container created for it.
        for record in orphan {
            match self.homogenize_or_destroy(&record, generation).await? {
                Homogenized::Kept { project_id } => {
                    todo.remove(&project_id);
                    report.homogenized += 1;
                }
                Homogenized::Dropped => {
                    report.dropped += 1;
                }
            }
        }

        // An existing current-generation record already satisfies its project.
        for record in &current {
            todo.remove(&record.project_id);
        }

        tracing::info!(
            remaining = todo.len(),
            generation,
            "Applications needing new containers this pass"
        );

        // Phase 2: create containers for everything left in `todo`, fanned
        // out concurrently; individual failures are collected, not fatal.
        let creations = futures::future::join_all(
            todo.into_values()
                .map(|project| self.create_for_project(project, generation)),
        )
        .await;

        for outcome in creations {
            match outcome {
                Ok(()) => report.created += 1,
                Err((name, err)) => {
                    tracing::error!(project = %name, error = %err, "Failed to create container");
                    report.creation_failures.push(name);
                }
            }
        }

        Ok(report)
    }

    async fn create_for_project(&self, project: Project, generation: i64) -> Result<(), (String, anyhow::Error)> {
        let label = format!("{}:{}", project.name, project.version);
        let created = self
            .container
            .create(&project, generation)
            .await
            .map_err(|e| (label.clone(), e))?;

        self.store
            .insert_service_record(
                generation,
                &created.container_id,
                &created.hostname,
                created.port as i64,
                project.id,
            )
            .await
            .map_err(|e| (label, e))?;

        Ok(())
    }

    /// Reload `record` and its project from the store, then adopt or
    /// destroy it.
    async fn homogenize_or_destroy(
        &self,
        record: &ServiceRecord,
        generation: i64,
    ) -> Result<Homogenized> {
        let Some(tracked) = self.store.get_service_record(record.id).await? else {
            return Ok(Homogenized::Dropped);
        };

        let project = self.store.get_project(tracked.project_id).await?;
        let container_exists = self.container.exists(&tracked.hostname).await?;

        if project.is_none() || !container_exists {
            tracing::info!(
                service_record = tracked.id,
                project_id = tracked.project_id,
                "Destroying orphaned service record"
            );
            self.container.destroy(&tracked.container_id).await;
            self.store.delete_service_record(tracked.id).await?;
            return Ok(Homogenized::Dropped);
        }

        self.store
            .set_service_record_generation(tracked.id, generation)
            .await?;
        tracing::info!(
            service_record = tracked.id,
            project_id = tracked.project_id,
            generation,
            "Homogenized service record"
        );

        Ok(Homogenized::Kept {
            project_id: tracked.project_id,
        })
    }
}
