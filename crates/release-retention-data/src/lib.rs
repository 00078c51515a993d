//! JSON-file loader for the retention data set.
//!
//! Reads the four collection files from a directory into the core entity
//! types. No cross-referential validation happens here: phantom references
//! flow through and are excluded by the resolver.
//!
//! Field names are matched through the serde aliases on the core entities,
//! which cover the snake_case, PascalCase and camelCase spellings used by
//! the data files; other casings (e.g. `"ID"`) are not recognized. Unknown
//! fields are ignored.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use release_retention_core::{
    Deployment, DeploymentEnvironment, Project, Release, RetentionResolver,
};
use serde::de::DeserializeOwned;

pub const PROJECTS_FILE: &str = "Projects.json";
pub const RELEASES_FILE: &str = "Releases.json";
pub const ENVIRONMENTS_FILE: &str = "Environments.json";
pub const DEPLOYMENTS_FILE: &str = "Deployments.json";

#[derive(Debug, Clone, Default)]
pub struct RetentionDataset {
    pub projects: Vec<Project>,
    pub releases: Vec<Release>,
    pub deployments: Vec<Deployment>,
    pub environments: Vec<DeploymentEnvironment>,
}

impl RetentionDataset {
    /// Load all four collection files from `dir`.
    ///
    /// # Errors
    /// Fails when any file is missing, unreadable, or not a JSON array of
    /// the expected entity shape; the error names the offending path.
    pub fn load_dir(dir: &Path) -> Result<Self> {
        Ok(Self {
            projects: read_entities(&dir.join(PROJECTS_FILE))?,
            releases: read_entities(&dir.join(RELEASES_FILE))?,
            deployments: read_entities(&dir.join(DEPLOYMENTS_FILE))?,
            environments: read_entities(&dir.join(ENVIRONMENTS_FILE))?,
        })
    }

    #[must_use]
    pub fn into_resolver(self) -> RetentionResolver {
        RetentionResolver::new(self.projects, self.releases, self.deployments, self.environments)
    }
}

/// Read one JSON array file into entities.
///
/// # Errors
/// Fails when the file cannot be read or parsed; the error names the path.
pub fn read_entities<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let body = fs::read_to_string(path)
        .with_context(|| format!("failed to read data file {}", path.display()))?;
    serde_json::from_str(&body)
        .with_context(|| format!("failed to parse JSON array in {}", path.display()))
}
