//! Transactional persistence for projects, service records, the generation
//! counter, and secrets. Three tables (`project_config`, `service_entry`,
//! `service_number`) plus a `secret` table, each operation a short,
//! committing query wrapped in `anyhow::Context`.

mod entities;

pub use entities::{NewProject, Project, Secret, ServiceRecord};
use entities::ProjectRow;

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::{
    Row, SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

/// The singleton row id used by the `service_number` table.
const GENERATION_SINGLETON_ID: i64 = 1;

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Open (creating if absent) the SQLite database at `path` and ensure the
    /// schema exists.
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .context(format!("Failed to create database directory {}", parent.display()))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .context(format!("Failed to open database at {}", path.display()))?;

        let store = Self { pool };
        store.create_tables().await?;
        tracing::info!(path = %path.display(), "Database ready");
        Ok(store)
    }

    /// In-memory database, used by tests.
    #[cfg(any(test, feature = "test-util"))]
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .context("Failed to open in-memory database")?;
        let store = Self { pool };
        store.create_tables().await?;
        Ok(store)
    }

    async fn create_tables(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS project_config (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                version TEXT NOT NULL,
                desired_secrets_json TEXT NOT NULL DEFAULT '[]',
                UNIQUE(name, version)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create project_config table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS service_entry (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                generation INTEGER NOT NULL,
                container_id TEXT NOT NULL,
                hostname TEXT NOT NULL UNIQUE,
                port INTEGER NOT NULL,
                project_config_id INTEGER NOT NULL REFERENCES project_config(id)
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create service_entry table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS service_number (
                id INTEGER PRIMARY KEY,
                number INTEGER NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create service_number table")?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS secret (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                value TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .context("Failed to create secret table")?;

        Ok(())
    }

    // -- projects --------------------------------------------------------

    /// Insert a project, overwriting the non-key columns of an existing
    /// `(name, version)` row on conflict.
    pub async fn upsert_project(&self, new: NewProject) -> Result<Project> {
        let secrets_json = serde_json::to_string(&new.desired_secrets)
            .context("Failed to encode desired_secrets")?;

        let row: ProjectRow = sqlx::query_as(
            "INSERT INTO project_config (name, version, desired_secrets_json)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(name, version) DO UPDATE SET desired_secrets_json = excluded.desired_secrets_json
             RETURNING id, name, version, desired_secrets_json",
        )
        .bind(&new.name)
        .bind(&new.version)
        .bind(&secrets_json)
        .fetch_one(&self.pool)
        .await
        .context("Failed to upsert project")?;

        Ok(row.into_project())
    }

    pub async fn get_project(&self, id: i64) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, name, version, desired_secrets_json FROM project_config WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch project")?;
        Ok(row.map(ProjectRow::into_project))
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, name, version, desired_secrets_json FROM project_config",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list projects")?;
        Ok(rows.into_iter().map(ProjectRow::into_project).collect())
    }

    /// All versions of `name`, ordered by version descending.
    pub async fn list_projects_by_name(&self, name: &str) -> Result<Vec<Project>> {
        let rows: Vec<ProjectRow> = sqlx::query_as(
            "SELECT id, name, version, desired_secrets_json FROM project_config
             WHERE name = ?1 ORDER BY version DESC",
        )
        .bind(name)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list project versions")?;
        Ok(rows.into_iter().map(ProjectRow::into_project).collect())
    }

    pub async fn get_project_by_name_version(
        &self,
        name: &str,
        version: &str,
    ) -> Result<Option<Project>> {
        let row: Option<ProjectRow> = sqlx::query_as(
            "SELECT id, name, version, desired_secrets_json FROM project_config
             WHERE name = ?1 AND version = ?2",
        )
        .bind(name)
        .bind(version)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch project by name/version")?;
        Ok(row.map(ProjectRow::into_project))
    }

    /// Delete a project outright. Never called by the reconciliation loop
    /// itself (this exists for an operator-facing maintenance path).
    pub async fn delete_project(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM project_config WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete project")?;
        Ok(())
    }

    // -- service records --------------------------------------------------

    pub async fn list_service_records(&self) -> Result<Vec<ServiceRecord>> {
        sqlx::query_as(
            "SELECT id, generation, container_id, hostname, port, project_config_id AS project_id
             FROM service_entry",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list service records")
    }

    pub async fn get_service_record(&self, id: i64) -> Result<Option<ServiceRecord>> {
        sqlx::query_as(
            "SELECT id, generation, container_id, hostname, port, project_config_id AS project_id
             FROM service_entry WHERE id = ?1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch service record")
    }

    pub async fn service_record_for_project(&self, project_id: i64) -> Result<Option<ServiceRecord>> {
        sqlx::query_as(
            "SELECT id, generation, container_id, hostname, port, project_config_id AS project_id
             FROM service_entry WHERE project_config_id = ?1 LIMIT 1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch service record for project")
    }

    pub async fn insert_service_record(
        &self,
        generation: i64,
        container_id: &str,
        hostname: &str,
        port: i64,
        project_id: i64,
    ) -> Result<ServiceRecord> {
        sqlx::query_as(
            "INSERT INTO service_entry (generation, container_id, hostname, port, project_config_id)
             VALUES (?1, ?2, ?3, ?4, ?5)
             RETURNING id, generation, container_id, hostname, port, project_config_id AS project_id",
        )
        .bind(generation)
        .bind(container_id)
        .bind(hostname)
        .bind(port)
        .bind(project_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to insert service record")
    }

    pub async fn set_service_record_generation(&self, id: i64, generation: i64) -> Result<()> {
        sqlx::query("UPDATE service_entry SET generation = ?1 WHERE id = ?2")
            .bind(generation)
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to update service record generation")?;
        Ok(())
    }

    pub async fn delete_service_record(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM service_entry WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete service record")?;
        Ok(())
    }

    // -- generation counter -------------------------------------------------

    /// Read-modify-write the singleton generation row inside one
    /// transaction: absent → insert 1 and return 1; present → increment,
    /// persist, return the new value.
    pub async fn bump_generation(&self) -> Result<i64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start generation transaction")?;

        let existing: Option<i64> = sqlx::query("SELECT number FROM service_number WHERE id = ?1")
            .bind(GENERATION_SINGLETON_ID)
            .fetch_optional(&mut *tx)
            .await
            .context("Failed to read generation counter")?
            .map(|row| row.get::<i64, _>("number"));

        let next = match existing {
            None => {
                sqlx::query("INSERT INTO service_number (id, number) VALUES (?1, 1)")
                    .bind(GENERATION_SINGLETON_ID)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to initialize generation counter")?;
                1
            }
            Some(number) => {
                let next = number + 1;
                sqlx::query("UPDATE service_number SET number = ?1 WHERE id = ?2")
                    .bind(next)
                    .bind(GENERATION_SINGLETON_ID)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to persist generation counter")?;
                next
            }
        };

        tx.commit().await.context("Failed to commit generation transaction")?;
        Ok(next)
    }

    // -- secrets -----------------------------------------------------------

    pub async fn upsert_secret(&self, name: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO secret (name, value) VALUES (?1, ?2)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
        )
        .bind(name)
        .bind(value)
        .execute(&self.pool)
        .await
        .context("Failed to upsert secret")?;
        Ok(())
    }

    pub async fn get_secret(&self, name: &str) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM secret WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch secret")?;
        Ok(row.map(|(value,)| value))
    }
}
