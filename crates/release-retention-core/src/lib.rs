use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum RetentionError {
    #[error("invalid argument `{argument}`: {reason}")]
    InvalidArgument { argument: &'static str, reason: String },
}

impl RetentionError {
    #[must_use]
    pub fn argument(&self) -> &'static str {
        match self {
            Self::InvalidArgument { argument, .. } => argument,
        }
    }
}

/// A project that owns releases. Field-name aliases accept the PascalCase
/// and camelCase spellings used by the source data files.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Project {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
}

/// A versioned release of a project. `project_id` may reference a project
/// absent from the project collection; such phantom references are excluded
/// during resolution, never rejected up front.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Release {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Version")]
    pub version: String,
    #[serde(alias = "ProjectId", alias = "projectId")]
    pub project_id: String,
    #[serde(default, with = "time::serde::rfc3339::option", alias = "Created")]
    pub created: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct DeploymentEnvironment {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "Name")]
    pub name: String,
}

/// One deployment of a release into an environment. A (release, environment)
/// pair may carry several deployments; only the most recent `deployed_at`
/// counts toward ranking.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Deployment {
    #[serde(alias = "Id")]
    pub id: String,
    #[serde(alias = "ReleaseId", alias = "releaseId")]
    pub release_id: String,
    #[serde(alias = "EnvironmentId", alias = "environmentId")]
    pub environment_id: String,
    #[serde(with = "time::serde::rfc3339", alias = "DeployedAt", alias = "deployedAt")]
    pub deployed_at: OffsetDateTime,
}

/// The releases to keep for one (project, environment) pair, most recent
/// first. A pair with no qualifying deployments is still emitted, with an
/// empty `releases_to_keep`.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ReleaseRetentionResolution {
    pub project_id: String,
    pub environment_id: String,
    pub releases_to_keep: Vec<Release>,
}

/// Structured record emitted once per retained release per call.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RetainedRelease {
    pub release_id: String,
    pub release_version: String,
    pub project_name: String,
    pub project_id: String,
    pub rank: usize,
    pub environment_name: String,
    pub environment_id: String,
}

/// Message template for retained-release records. `RetainedRelease::message`
/// substitutes each `{placeholder}` with the matching field.
pub const RETAINED_RELEASE_TEMPLATE: &str = "release {release_id} (version {release_version}) of \
     project {project_name} ({project_id}) kept: rank {rank} most recently deployed to \
     environment {environment_name} ({environment_id})";

impl RetainedRelease {
    #[must_use]
    pub fn message(&self) -> String {
        RETAINED_RELEASE_TEMPLATE
            .replace("{release_id}", &self.release_id)
            .replace("{release_version}", &self.release_version)
            .replace("{project_name}", &self.project_name)
            .replace("{project_id}", &self.project_id)
            .replace("{rank}", &self.rank.to_string())
            .replace("{environment_name}", &self.environment_name)
            .replace("{environment_id}", &self.environment_id)
    }
}

/// Side-effect channel for retained-release records. Injected per call so the
/// core stays free of global logging state.
pub trait RetentionObserver {
    fn release_retained(&mut self, retained: &RetainedRelease);
}

/// Collects every record in emission order. Intended for tests and callers
/// that want the records alongside the resolutions.
#[derive(Debug, Default, Clone, Eq, PartialEq)]
pub struct CollectingObserver {
    pub retained: Vec<RetainedRelease>,
}

impl RetentionObserver for CollectingObserver {
    fn release_retained(&mut self, retained: &RetainedRelease) {
        self.retained.push(retained.clone());
    }
}

/// Forwards each record to `tracing` at info level with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetentionObserver for TracingObserver {
    fn release_retained(&mut self, retained: &RetainedRelease) {
        tracing::info!(
            release_id = %retained.release_id,
            release_version = %retained.release_version,
            project_id = %retained.project_id,
            project_name = %retained.project_name,
            rank = retained.rank,
            environment_id = %retained.environment_id,
            environment_name = %retained.environment_name,
            "{}",
            retained.message()
        );
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl RetentionObserver for NoopObserver {
    fn release_retained(&mut self, _retained: &RetainedRelease) {}
}

/// Optional scoping of a resolution to one project and/or one environment.
/// `None` and the empty string both mean "all".
#[derive(Debug, Clone, Default, Eq, PartialEq)]
pub struct RetentionFilter {
    pub project_id: Option<String>,
    pub environment_id: Option<String>,
}

impl RetentionFilter {
    #[must_use]
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self { project_id: Some(project_id.into()), environment_id: None }
    }

    #[must_use]
    pub fn for_environment(environment_id: impl Into<String>) -> Self {
        Self { project_id: None, environment_id: Some(environment_id.into()) }
    }

    #[must_use]
    pub fn environment(mut self, environment_id: impl Into<String>) -> Self {
        self.environment_id = Some(environment_id.into());
        self
    }
}

fn scope_of(value: Option<&str>) -> Option<&str> {
    value.filter(|value| !value.is_empty())
}

/// Resolves, per (project, environment) pair, the N most recently deployed
/// releases to retain. The four collections are taken at construction and
/// never mutated; every call recomputes from scratch.
#[derive(Debug, Clone)]
pub struct RetentionResolver {
    projects: Vec<Project>,
    releases: Vec<Release>,
    deployments: Vec<Deployment>,
    environments: Vec<DeploymentEnvironment>,
}

impl RetentionResolver {
    /// No validation happens here; phantom references and malformed entries
    /// are excluded during resolution.
    #[must_use]
    pub fn new(
        projects: Vec<Project>,
        releases: Vec<Release>,
        deployments: Vec<Deployment>,
        environments: Vec<DeploymentEnvironment>,
    ) -> Self {
        Self { projects, releases, deployments, environments }
    }

    /// Compute one resolution per (project, environment) pair in scope,
    /// ranking releases by most recent deployment and keeping at most
    /// `number_of_releases` per pair. Emits one `RetainedRelease` record to
    /// the observer per retained release, rank 1 first within each pair.
    ///
    /// Ties on the maximum deployment timestamp order ascending by release
    /// id. Pairs with no qualifying releases are emitted with an empty
    /// `releases_to_keep`.
    ///
    /// # Errors
    /// Returns [`RetentionError::InvalidArgument`] when `number_of_releases`
    /// is zero, or when a non-empty filter id does not match any project or
    /// environment. Validation fails atomically: no resolutions and no
    /// observer records are produced.
    pub fn retain_releases(
        &self,
        number_of_releases: usize,
        filter: &RetentionFilter,
        observer: &mut dyn RetentionObserver,
    ) -> Result<Vec<ReleaseRetentionResolution>, RetentionError> {
        if number_of_releases == 0 {
            return Err(RetentionError::InvalidArgument {
                argument: "number_of_releases",
                reason: "must be at least 1".to_string(),
            });
        }

        let project_by_id: BTreeMap<&str, &Project> =
            self.projects.iter().map(|project| (project.id.as_str(), project)).collect();
        let environment_by_id: BTreeMap<&str, &DeploymentEnvironment> = self
            .environments
            .iter()
            .map(|environment| (environment.id.as_str(), environment))
            .collect();
        let release_by_id: BTreeMap<&str, &Release> =
            self.releases.iter().map(|release| (release.id.as_str(), release)).collect();

        let project_scope = scope_of(filter.project_id.as_deref());
        if let Some(project_id) = project_scope {
            if !project_by_id.contains_key(project_id) {
                return Err(RetentionError::InvalidArgument {
                    argument: "project_id",
                    reason: format!("no project with id `{project_id}`"),
                });
            }
        }

        let environment_scope = scope_of(filter.environment_id.as_deref());
        if let Some(environment_id) = environment_scope {
            if !environment_by_id.contains_key(environment_id) {
                return Err(RetentionError::InvalidArgument {
                    argument: "environment_id",
                    reason: format!("no environment with id `{environment_id}`"),
                });
            }
        }

        // Recency collapse: one entry per (project, environment, release)
        // holding the most recent deployment timestamp. Deployments with a
        // dangling release, project or environment reference drop out here.
        let mut deployment_map: BTreeMap<(&str, &str, &str), OffsetDateTime> = BTreeMap::new();
        for deployment in &self.deployments {
            let Some(release) = release_by_id.get(deployment.release_id.as_str()) else {
                continue;
            };
            let Some(project) = project_by_id.get(release.project_id.as_str()) else {
                continue;
            };
            let Some(environment) = environment_by_id.get(deployment.environment_id.as_str())
            else {
                continue;
            };
            if project_scope.is_some_and(|scope| scope != project.id) {
                continue;
            }
            if environment_scope.is_some_and(|scope| scope != environment.id) {
                continue;
            }

            let most_recent = deployment_map
                .entry((project.id.as_str(), environment.id.as_str(), release.id.as_str()))
                .or_insert(deployment.deployed_at);
            if deployment.deployed_at > *most_recent {
                *most_recent = deployment.deployed_at;
            }
        }

        // Result groups: Cartesian product of the scoped projects and
        // environments, deduplicated by id, in collection order.
        let mut seen_projects = BTreeSet::new();
        let mut scoped_projects: Vec<&Project> = Vec::new();
        for project in &self.projects {
            if project_scope.is_some_and(|scope| scope != project.id) {
                continue;
            }
            if seen_projects.insert(project.id.as_str()) {
                scoped_projects.push(project);
            }
        }

        let mut seen_environments = BTreeSet::new();
        let mut scoped_environments: Vec<&DeploymentEnvironment> = Vec::new();
        for environment in &self.environments {
            if environment_scope.is_some_and(|scope| scope != environment.id) {
                continue;
            }
            if seen_environments.insert(environment.id.as_str()) {
                scoped_environments.push(environment);
            }
        }

        let mut resolutions =
            Vec::with_capacity(scoped_projects.len() * scoped_environments.len());
        for project in &scoped_projects {
            for environment in &scoped_environments {
                let mut candidates: Vec<(OffsetDateTime, &Release)> = deployment_map
                    .iter()
                    .filter(|((map_project, map_environment, _), _)| {
                        *map_project == project.id && *map_environment == environment.id
                    })
                    .filter_map(|((_, _, release_id), deployed_at)| {
                        release_by_id.get(release_id).map(|release| (*deployed_at, *release))
                    })
                    .collect();
                candidates.sort_by(|(left_at, left), (right_at, right)| {
                    right_at.cmp(left_at).then_with(|| left.id.cmp(&right.id))
                });
                candidates.truncate(number_of_releases);

                let mut releases_to_keep = Vec::with_capacity(candidates.len());
                for (index, (_, release)) in candidates.iter().enumerate() {
                    observer.release_retained(&RetainedRelease {
                        release_id: release.id.clone(),
                        release_version: release.version.clone(),
                        project_name: project.name.clone(),
                        project_id: project.id.clone(),
                        rank: index + 1,
                        environment_name: environment.name.clone(),
                        environment_id: environment.id.clone(),
                    });
                    releases_to_keep.push((*release).clone());
                }

                resolutions.push(ReleaseRetentionResolution {
                    project_id: project.id.clone(),
                    environment_id: environment.id.clone(),
                    releases_to_keep,
                });
            }
        }

        Ok(resolutions)
    }
}
