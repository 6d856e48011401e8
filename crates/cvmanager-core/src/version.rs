//! Content view version resolution.
//!
//! Finds, for a lifecycle environment, the content view version currently
//! published there. Composite views are resolved through their components;
//! every qualifying component contributes its own [`Resolution`].

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{CvmError, Result};
use crate::model::{
    ContentView, ContentViewId, ContentViewVersion, EnvironmentId, RepositoryId, VersionId,
};
use crate::session::Session;

/// A version found in an environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub environment_id: EnvironmentId,
    pub content_view_id: ContentViewId,
    pub content_view_name: String,
    pub version_id: VersionId,
    pub version: String,
}

/// Highest-numbered version of a simple content view published to
/// `environment`, or `None` when nothing from this view is there yet.
pub fn resolve_version(
    cv: &ContentView,
    environment: EnvironmentId,
) -> Result<Option<&ContentViewVersion>> {
    let mut best: Option<(f64, &ContentViewVersion)> = None;
    let mut tied = false;

    for version in cv.versions.iter().filter(|v| v.is_in(environment)) {
        let number = version.number().ok_or_else(|| CvmError::InvalidVersion {
            content_view: cv.id,
            version: version.version.clone(),
        })?;
        debug!(
            content_view = %cv.name,
            version = %version.version,
            id = %version.id,
            environments = ?version.environment_ids,
            "version published to environment"
        );
        match best {
            Some((top, _)) if number < top => {}
            Some((top, _)) if number == top => tied = true,
            _ => {
                best = Some((number, version));
                tied = false;
            }
        }
    }

    match best {
        Some((_, version)) if tied => Err(CvmError::AmbiguousVersion {
            content_view: cv.id,
            environment,
            version: version.version.clone(),
        }),
        Some((_, version)) => Ok(Some(version)),
        None => Ok(None),
    }
}

/// Resolve `cv` in `environment`.
///
/// For a simple view this yields at most one resolution. For a composite
/// every component is fetched; components containing `repository` (all
/// components when `repository` is `None`) are resolved in turn, and nested
/// composites are descended into. A component that appears again on its
/// own path is a [`CvmError::CompositeCycle`].
pub async fn resolve_targets(
    session: &Session,
    cv: &ContentView,
    repository: Option<RepositoryId>,
    environment: EnvironmentId,
) -> Result<Vec<Resolution>> {
    let mut out = Vec::new();
    let mut path = vec![cv.id];
    resolve_into(session, cv, repository, environment, &mut path, &mut out).await?;
    Ok(out)
}

fn resolve_into<'a>(
    session: &'a Session,
    cv: &'a ContentView,
    repository: Option<RepositoryId>,
    environment: EnvironmentId,
    path: &'a mut Vec<ContentViewId>,
    out: &'a mut Vec<Resolution>,
) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
    Box::pin(async move {
        if !cv.composite {
            if let Some(version) = resolve_version(cv, environment)? {
                debug!(
                    content_view = %cv.name,
                    version = %version.version,
                    environment = %environment,
                    "found version in environment"
                );
                out.push(Resolution {
                    environment_id: environment,
                    content_view_id: cv.id,
                    content_view_name: cv.name.clone(),
                    version_id: version.id,
                    version: version.version.clone(),
                });
            }
            return Ok(());
        }

        debug!(content_view = %cv.name, components = ?cv.component_ids, "content view is composite");
        for &component_id in &cv.component_ids {
            if path.contains(&component_id) {
                return Err(CvmError::CompositeCycle(component_id));
            }
            let component = session.content_view(component_id).await?;
            let qualifies = component.composite
                || repository.map_or(true, |repo| component.contains_repository(repo));
            if !qualifies {
                debug!(component = %component.name, "component does not contain repository");
                continue;
            }
            path.push(component_id);
            resolve_into(session, &component, repository, environment, path, out).await?;
            path.pop();
        }
        Ok(())
    })
}

/// Resolve `cv` in every environment, in order.
///
/// Environments with nothing published are logged and skipped.
pub async fn resolve_environments(
    session: &Session,
    cv: &ContentView,
    repository: Option<RepositoryId>,
    environments: &[EnvironmentId],
) -> Result<Vec<Resolution>> {
    let mut all = Vec::new();
    for &environment in environments {
        let found = resolve_targets(session, cv, repository, environment).await?;
        if found.is_empty() {
            info!(
                content_view = %cv.name,
                environment = %environment,
                "no published version in environment, skipping"
            );
        }
        all.extend(found);
    }
    Ok(all)
}

/// Environments that resolved to more than one version.
pub fn ambiguous_environments(resolutions: &[Resolution]) -> Vec<EnvironmentId> {
    let mut seen = Vec::new();
    let mut ambiguous = Vec::new();
    for r in resolutions {
        if seen.contains(&r.environment_id) {
            if !ambiguous.contains(&r.environment_id) {
                ambiguous.push(r.environment_id);
            }
        } else {
            seen.push(r.environment_id);
        }
    }
    ambiguous
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryContentApi;
    use crate::model::ResourceKind;
    use crate::session::RunOptions;
    use serde_json::json;
    use std::sync::Arc;

    fn version(id: u64, number: &str, envs: &[u64]) -> ContentViewVersion {
        ContentViewVersion {
            id: VersionId(id),
            version: number.to_string(),
            environment_ids: envs.iter().copied().map(EnvironmentId).collect(),
        }
    }

    fn simple(id: u64, versions: Vec<ContentViewVersion>) -> ContentView {
        ContentView {
            id: ContentViewId(id),
            name: format!("cv-{id}"),
            composite: false,
            repository_ids: vec![],
            component_ids: vec![],
            versions,
        }
    }

    #[test]
    fn test_highest_version_containing_environment_wins() {
        let cv = simple(
            1,
            vec![
                version(101, "1.0", &[10]),
                version(102, "2.0", &[20]),
                version(103, "3.0", &[10, 20]),
            ],
        );
        let found = resolve_version(&cv, EnvironmentId(10)).unwrap().unwrap();
        assert_eq!(found.id, VersionId(103));
    }

    #[test]
    fn test_numeric_not_lexical_ordering() {
        let cv = simple(1, vec![version(1, "10.0", &[5]), version(2, "9.0", &[5])]);
        let found = resolve_version(&cv, EnvironmentId(5)).unwrap().unwrap();
        assert_eq!(found.id, VersionId(1));
    }

    #[test]
    fn test_nothing_published_is_none() {
        let cv = simple(1, vec![version(1, "1.0", &[1])]);
        assert!(resolve_version(&cv, EnvironmentId(99)).unwrap().is_none());
    }

    #[test]
    fn test_equal_top_versions_are_ambiguous() {
        let cv = simple(1, vec![version(1, "2.0", &[7]), version(2, "2", &[7])]);
        let err = resolve_version(&cv, EnvironmentId(7)).unwrap_err();
        assert!(matches!(err, CvmError::AmbiguousVersion { .. }));
    }

    #[test]
    fn test_tie_below_the_top_is_fine() {
        let cv = simple(
            1,
            vec![
                version(1, "1.0", &[7]),
                version(2, "1.0", &[7]),
                version(3, "4.0", &[7]),
            ],
        );
        let found = resolve_version(&cv, EnvironmentId(7)).unwrap().unwrap();
        assert_eq!(found.id, VersionId(3));
    }

    #[test]
    fn test_unparseable_version_is_an_error() {
        let cv = simple(1, vec![version(1, "beta", &[7])]);
        assert!(matches!(
            resolve_version(&cv, EnvironmentId(7)),
            Err(CvmError::InvalidVersion { .. })
        ));
    }

    fn composite_catalog() -> MemoryContentApi {
        let api = MemoryContentApi::new();
        api.insert(
            ResourceKind::ContentViews,
            json!({
                "id": 1, "name": "c1", "composite": false, "repository_ids": [500],
                "versions": [
                    {"id": 11, "version": "1.0", "environment_ids": [10]},
                    {"id": 12, "version": "2.0", "environment_ids": [20]}
                ]
            }),
        );
        api.insert(
            ResourceKind::ContentViews,
            json!({
                "id": 2, "name": "c2", "composite": false, "repository_ids": [600],
                "versions": [{"id": 21, "version": "5.0", "environment_ids": [10]}]
            }),
        );
        api
    }

    fn composite(id: u64, components: &[u64]) -> ContentView {
        ContentView {
            id: ContentViewId(id),
            name: format!("ccv-{id}"),
            composite: true,
            repository_ids: vec![],
            component_ids: components.iter().copied().map(ContentViewId).collect(),
            versions: vec![],
        }
    }

    #[tokio::test]
    async fn test_composite_only_uses_components_with_repository() {
        let session = Session::new(Arc::new(composite_catalog()), RunOptions::default());
        let ccv = composite(3, &[1, 2]);

        let found = resolve_targets(&session, &ccv, Some(RepositoryId(500)), EnvironmentId(10))
            .await
            .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].content_view_id, ContentViewId(1));
        assert_eq!(found[0].version_id, VersionId(11));
        assert_eq!(found[0].environment_id, EnvironmentId(10));
    }

    #[tokio::test]
    async fn test_composite_surfaces_every_qualifying_component() {
        let session = Session::new(Arc::new(composite_catalog()), RunOptions::default());
        let ccv = composite(3, &[1, 2]);

        let found = resolve_targets(&session, &ccv, None, EnvironmentId(10))
            .await
            .unwrap();
        let versions: Vec<VersionId> = found.iter().map(|r| r.version_id).collect();
        assert_eq!(versions, vec![VersionId(11), VersionId(21)]);
        assert_eq!(ambiguous_environments(&found), vec![EnvironmentId(10)]);
    }

    #[tokio::test]
    async fn test_composite_cycle_is_detected() {
        let api = MemoryContentApi::new();
        api.insert(
            ResourceKind::ContentViews,
            json!({"id": 4, "name": "inner", "composite": true, "component_ids": [3], "versions": []}),
        );
        let session = Session::new(Arc::new(api), RunOptions::default());
        let outer = composite(3, &[4]);

        let err = resolve_targets(&session, &outer, None, EnvironmentId(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CvmError::CompositeCycle(ContentViewId(3))));
    }

    #[tokio::test]
    async fn test_environments_without_versions_are_skipped() {
        let session = Session::new(Arc::new(composite_catalog()), RunOptions::default());
        let ccv = composite(3, &[1]);

        let found = resolve_environments(
            &session,
            &ccv,
            Some(RepositoryId(500)),
            &[EnvironmentId(30), EnvironmentId(20), EnvironmentId(10)],
        )
        .await
        .unwrap();
        let pairs: Vec<(EnvironmentId, VersionId)> =
            found.iter().map(|r| (r.environment_id, r.version_id)).collect();
        assert_eq!(
            pairs,
            vec![(EnvironmentId(20), VersionId(12)), (EnvironmentId(10), VersionId(11))]
        );
    }
}
