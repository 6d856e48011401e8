//! Name → id resolution.
//!
//! Every name-based lookup goes through [`resolve_unique`], which requires
//! exactly one exact-name match inside the session's organization.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::{CvmError, Result};
use crate::lister::list_all;
use crate::model::{
    ContentViewId, EnvironmentId, LifecycleEnvironment, NamedResource, RepositoryId, ResourceKind,
};
use crate::session::Session;

/// Name of the root of every promotion chain.
pub const LIBRARY: &str = "Library";

/// Something with a name that can be matched exactly.
pub trait Named {
    fn name(&self) -> &str;
}

impl Named for NamedResource {
    fn name(&self) -> &str {
        &self.name
    }
}

impl Named for LifecycleEnvironment {
    fn name(&self) -> &str {
        &self.name
    }
}

/// List `kind` filtered by `name` plus `filters`, and return the single
/// record whose name is exactly `name`.
pub async fn resolve_unique<T>(
    session: &Session,
    kind: ResourceKind,
    name: &str,
    filters: &BTreeMap<String, String>,
) -> Result<T>
where
    T: DeserializeOwned + Named,
{
    let mut filters = filters.clone();
    filters.insert("name".to_string(), name.to_string());

    let mut matches: Vec<T> = list_all::<T>(session, kind, &filters)
        .await?
        .into_iter()
        .filter(|item| item.name() == name)
        .collect();

    match matches.len() {
        0 => Err(CvmError::NotFound {
            kind,
            name: name.to_string(),
        }),
        1 => Ok(matches.remove(0)),
        count => Err(CvmError::AmbiguousName {
            kind,
            name: name.to_string(),
            count,
        }),
    }
}

/// Resolve a resource name to its id.
pub async fn resolve_id(session: &Session, kind: ResourceKind, name: &str) -> Result<u64> {
    let resource: NamedResource = resolve_unique(session, kind, name, &BTreeMap::new()).await?;
    debug!(kind = %kind, name, id = %resource.id, "resolved name");
    Ok(resource.id.0)
}

pub async fn repository_id(session: &Session, name: &str) -> Result<RepositoryId> {
    resolve_id(session, ResourceKind::Repositories, name)
        .await
        .map(RepositoryId)
}

pub async fn content_view_id(session: &Session, name: &str) -> Result<ContentViewId> {
    resolve_id(session, ResourceKind::ContentViews, name)
        .await
        .map(ContentViewId)
}

/// Look up a lifecycle environment record by name.
///
/// `Library` is only searched among library environments, every other name
/// only among the non-library ones.
pub async fn lifecycle_environment(session: &Session, name: &str) -> Result<LifecycleEnvironment> {
    let mut filters = BTreeMap::new();
    filters.insert("library".to_string(), (name == LIBRARY).to_string());
    let env: LifecycleEnvironment = resolve_unique(
        session,
        ResourceKind::LifecycleEnvironments,
        name,
        &filters,
    )
    .await?;
    debug!(name, id = %env.id, "lifecycle environment resolved");
    Ok(env)
}

pub async fn environment_id(session: &Session, name: &str) -> Result<EnvironmentId> {
    Ok(lifecycle_environment(session, name).await?.id)
}

/// The environment promoted from before `name`, `None` for the root.
pub async fn prior_environment(
    session: &Session,
    name: &str,
) -> Result<Option<LifecycleEnvironment>> {
    let env = lifecycle_environment(session, name).await?;
    match env.prior {
        Some(prior) if !prior.name.is_empty() => {
            debug!(environment = %env.name, prior = %prior.name, "prior environment");
            lifecycle_environment(session, &prior.name).await.map(Some)
        }
        _ => Ok(None),
    }
}

/// Split a comma-separated environment list.
///
/// Whitespace around names is trimmed and empty entries are dropped.
pub fn environment_names(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Resolve every name in order, failing on the first unknown one.
pub async fn environment_ids(session: &Session, names: &[String]) -> Result<Vec<EnvironmentId>> {
    if names.is_empty() {
        return Err(CvmError::InvalidInput(
            "no lifecycle environments given".to_string(),
        ));
    }
    let mut ids = Vec::with_capacity(names.len());
    for name in names {
        ids.push(environment_id(session, name).await?);
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryContentApi;
    use crate::session::RunOptions;
    use serde_json::json;
    use std::sync::Arc;

    fn session_with(api: MemoryContentApi) -> Session {
        Session::new(Arc::new(api), RunOptions::default())
    }

    fn environments() -> MemoryContentApi {
        let api = MemoryContentApi::new().with_page_size(2);
        api.insert(
            ResourceKind::LifecycleEnvironments,
            json!({"id": 1, "name": "Library", "library": true, "prior": null}),
        );
        api.insert(
            ResourceKind::LifecycleEnvironments,
            json!({"id": 2, "name": "Test", "library": false, "prior": {"id": 1, "name": "Library"}}),
        );
        api.insert(
            ResourceKind::LifecycleEnvironments,
            json!({"id": 3, "name": "Prod", "library": false, "prior": {"id": 2, "name": "Test"}}),
        );
        api
    }

    #[tokio::test]
    async fn test_single_match_returns_id() {
        let api = MemoryContentApi::new();
        api.insert(ResourceKind::Repositories, json!({"id": 11, "name": "repo-a"}));
        api.insert(ResourceKind::Repositories, json!({"id": 12, "name": "repo-b"}));
        let session = session_with(api);

        assert_eq!(repository_id(&session, "repo-b").await.unwrap(), RepositoryId(12));
    }

    #[tokio::test]
    async fn test_zero_matches_is_not_found() {
        let session = session_with(MemoryContentApi::new());
        let err = content_view_id(&session, "cv-missing").await.unwrap_err();
        assert!(matches!(
            err,
            CvmError::NotFound { kind: ResourceKind::ContentViews, ref name } if name == "cv-missing"
        ));
    }

    #[tokio::test]
    async fn test_two_matches_is_ambiguous() {
        let api = MemoryContentApi::new();
        api.insert(ResourceKind::ContentViews, json!({"id": 1, "name": "cv-base"}));
        api.insert(ResourceKind::ContentViews, json!({"id": 2, "name": "cv-base"}));
        let session = session_with(api);

        let err = content_view_id(&session, "cv-base").await.unwrap_err();
        assert!(matches!(err, CvmError::AmbiguousName { count: 2, .. }));
    }

    #[tokio::test]
    async fn test_library_lookup_uses_library_flag() {
        let session = session_with(environments());
        let library = lifecycle_environment(&session, "Library").await.unwrap();
        assert!(library.library);
        assert_eq!(environment_id(&session, "Prod").await.unwrap(), EnvironmentId(3));
    }

    #[tokio::test]
    async fn test_prior_environment_walks_chain() {
        let session = session_with(environments());
        let prior = prior_environment(&session, "Prod").await.unwrap().unwrap();
        assert_eq!(prior.name, "Test");
        let prior = prior_environment(&session, "Test").await.unwrap().unwrap();
        assert_eq!(prior.name, "Library");
        assert!(prior_environment(&session, "Library").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_environment_ids_keep_input_order() {
        let session = session_with(environments());
        let names = environment_names("Prod, Test");
        let ids = environment_ids(&session, &names).await.unwrap();
        assert_eq!(ids, vec![EnvironmentId(3), EnvironmentId(2)]);
    }

    #[test]
    fn test_environment_names_without_comma() {
        assert_eq!(environment_names("Prod"), vec!["Prod".to_string()]);
        assert_eq!(
            environment_names("Test,,Prod ,"),
            vec!["Test".to_string(), "Prod".to_string()]
        );
        assert!(environment_names(" ").is_empty());
    }
}
