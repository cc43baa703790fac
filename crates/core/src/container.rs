//! Container manager: create, inspect, and destroy application containers
//! via the exact subprocess contract the container engine exposes
//! (`ps -q -f name=<name>`, `run -d --name ... --network ...`, `rm -f <id>`).

use anyhow::{Context, Result};
use rand::Rng;

use crate::name::slug;
use crate::store::Project;
use crate::subprocess::run_expect_success;

const MIN_PORT: u16 = 20000;
const MAX_PORT: u16 = 60000;

pub struct ContainerManager {
    engine: String,
    network_name: String,
}

/// The freshly minted identity of a container about to be started, returned
/// alongside its container id once `docker run` succeeds.
pub struct CreatedContainer {
    pub container_id: String,
    pub hostname: String,
    pub port: u16,
}

impl ContainerManager {
    pub fn new(engine: impl Into<String>, network_name: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            network_name: network_name.into(),
        }
    }

    /// Whether a container named `name` is currently running.
    pub async fn exists(&self, name: &str) -> Result<bool> {
        let captured = run_expect_success(
            &self.engine,
            &["ps", "-q", "-f", &format!("name={name}")],
        )
        .await
        .context("Failed to check container existence")?;

        Ok(!String::from_utf8_lossy(&captured.stdout).trim().is_empty())
    }

    /// Launch a detached container for `project` tagged with `generation`.
    pub async fn create(&self, project: &Project, generation: i64) -> Result<CreatedContainer> {
        let port = rand::rng().random_range(MIN_PORT..=MAX_PORT);
        let salt = rand::rng().random_range(1000..=9999);
        let hostname = format!("fats-{}-{salt}", slug(&format!("{}{}", project.name, project.version)));
        let image = format!("{}:{}", project.name, project.version);

        let env_service_number = format!("FATS_SERVICE_NUMBER={generation}");
        let env_project_id = format!("FATS_PROJECT_CONFIG_ID={}", project.id);
        let env_port = format!("PORT={port}");

        let captured = run_expect_success(
            &self.engine,
            &[
                "run",
                "-d",
                "--name",
                &hostname,
                "--network",
                &self.network_name,
                "-e",
                &env_service_number,
                "-e",
                &env_project_id,
                "-e",
                &env_port,
                &image,
            ],
        )
        .await
        .context("Failed to start container")?;

        let container_id = String::from_utf8_lossy(&captured.stdout).trim().to_string();

        tracing::info!(
            hostname = %hostname,
            container_id = %container_id,
            port,
            "Started container"
        );

        Ok(CreatedContainer {
            container_id,
            hostname,
            port,
        })
    }

    /// Best-effort container removal; failures are logged, not propagated.
    pub async fn destroy(&self, container_id: &str) {
        if let Err(err) = run_expect_success(&self.engine, &["rm", "-f", container_id]).await {
            tracing::warn!(container_id = %container_id, error = %err, "Failed to remove container");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostname_matches_expected_shape() {
        let project = Project {
            id: 1,
            name: "hello".to_string(),
            version: "1.0.0".to_string(),
            desired_secrets: vec![],
        };
        let slugged = slug(&format!("{}{}", project.name, project.version));
        assert_eq!(slugged, "hello100");
    }
}
