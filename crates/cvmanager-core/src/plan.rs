//! From operator input to update targets.

use tracing::{info, warn};

use crate::error::Result;
use crate::model::{ContentView, EnvironmentId, RepositoryId};
use crate::resolver;
use crate::session::Session;
use crate::version::{ambiguous_environments, resolve_environments, Resolution};

/// Where an incremental update will land.
#[derive(Debug, Clone)]
pub struct UpdatePlan {
    pub content_view: ContentView,
    pub repository: Option<RepositoryId>,
    pub environments: Vec<EnvironmentId>,
    /// In environment order; environments with nothing published are absent
    pub targets: Vec<Resolution>,
}

impl UpdatePlan {
    /// Resolve names to ids and find the version in every environment.
    pub async fn build(
        session: &Session,
        content_view: &str,
        repository: Option<&str>,
        environments: &[String],
    ) -> Result<Self> {
        let repository = match repository {
            Some(name) => Some(resolver::repository_id(session, name).await?),
            None => None,
        };
        let cv_id = resolver::content_view_id(session, content_view).await?;
        let content_view = session.content_view(cv_id).await?;
        let environments = resolver::environment_ids(session, environments).await?;

        if content_view.composite && repository.is_none() {
            warn!(
                content_view = %content_view.name,
                "composite content view without a repository, every component qualifies"
            );
        }

        let targets =
            resolve_environments(session, &content_view, repository, &environments).await?;
        for environment in ambiguous_environments(&targets) {
            warn!(
                environment = %environment,
                "more than one component version found in environment, all will be updated"
            );
        }
        info!(
            content_view = %content_view.name,
            targets = targets.len(),
            environments = environments.len(),
            "update plan ready"
        );

        Ok(UpdatePlan {
            content_view,
            repository,
            environments,
            targets,
        })
    }

    /// Environments that resolved to nothing.
    pub fn gaps(&self) -> Vec<EnvironmentId> {
        self.environments
            .iter()
            .copied()
            .filter(|env| !self.targets.iter().any(|t| t.environment_id == *env))
            .collect()
    }
}
