//! Entity shapes persisted by the [`Store`](super::Store): projects, service
//! records, the generation counter, and secrets. `Project` always carries
//! `desired_secrets` (possibly empty) rather than treating it as optional.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A desired application, identified by `(name, version)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub desired_secrets: Vec<String>,
}

/// Row shape as stored: `desired_secrets` is JSON-encoded text, since SQLite
/// has no native array column.
#[derive(Debug, FromRow)]
pub(crate) struct ProjectRow {
    pub id: i64,
    pub name: String,
    pub version: String,
    pub desired_secrets_json: String,
}

impl ProjectRow {
    pub fn into_project(self) -> Project {
        let desired_secrets = serde_json::from_str(&self.desired_secrets_json).unwrap_or_default();
        Project {
            id: self.id,
            name: self.name,
            version: self.version,
            desired_secrets,
        }
    }
}

/// A claim that a specific container realizes a [`Project`] in some process
/// generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct ServiceRecord {
    pub id: i64,
    pub generation: i64,
    pub container_id: String,
    pub hostname: String,
    pub port: i64,
    pub project_id: i64,
}

/// A `(name, value)` secret mapping, upserted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Secret {
    pub id: i64,
    pub name: String,
    pub value: String,
}

/// New-project input before a surrogate id has been assigned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub name: String,
    pub version: String,
    pub desired_secrets: Vec<String>,
}
