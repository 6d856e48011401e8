//! Typed records for the Content Management API.
//!
//! Every response the core consumes is decoded into one of these records at
//! the API boundary. Required fields that are missing are decode errors;
//! fields the core never reads are ignored.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                $name(id)
            }
        }
    };
}

numeric_id!(
    /// Lifecycle environment id
    EnvironmentId
);
numeric_id!(
    /// Content view id
    ContentViewId
);
numeric_id!(
    /// Content view version id
    VersionId
);
numeric_id!(
    /// Repository id
    RepositoryId
);
numeric_id!(
    /// Id of any named resource before it is known what it refers to
    ResourceId
);

/// Foreman task id (a UUID string on real servers)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn new(id: impl Into<String>) -> Self {
        TaskId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Resource collections the core knows how to list and show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Repositories,
    ContentViews,
    LifecycleEnvironments,
}

impl ResourceKind {
    /// Name used in log and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Repositories => "repositories",
            ResourceKind::ContentViews => "content_views",
            ResourceKind::LifecycleEnvironments => "lifecycle_environments",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter and paging parameters for an index call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub organization_id: u64,
    pub filters: BTreeMap<String, String>,
    /// 1-based page number
    pub page: u32,
    /// `None` lets the server pick its default page size
    pub per_page: Option<u32>,
}

impl Query {
    pub fn new(organization_id: u64) -> Self {
        Query {
            organization_id,
            filters: BTreeMap::new(),
            page: 1,
            per_page: None,
        }
    }

    pub fn with_filter(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.filters.insert(key.into(), value.to_string());
        self
    }

    pub fn page(mut self, page: u32, per_page: Option<u32>) -> Self {
        self.page = page;
        self.per_page = per_page;
        self
    }
}

/// One page of an index response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub results: Vec<T>,
    #[serde(deserialize_with = "lenient_u32")]
    pub page: u32,
    #[serde(deserialize_with = "lenient_u32")]
    pub per_page: u32,
    pub total: u64,
}

/// Minimal shape shared by every named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedResource {
    pub id: ResourceId,
    pub name: String,
}

/// Reference to another environment embedded in an environment record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentRef {
    pub id: EnvironmentId,
    pub name: String,
}

/// A stage in the promotion chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleEnvironment {
    pub id: EnvironmentId,
    pub name: String,
    pub library: bool,
    /// `None` only for the Library root
    pub prior: Option<EnvironmentRef>,
}

/// A published version of a content view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentViewVersion {
    pub id: VersionId,
    /// Kept as text; numeric ordering goes through [`ContentViewVersion::number`]
    #[serde(deserialize_with = "lenient_string")]
    pub version: String,
    pub environment_ids: Vec<EnvironmentId>,
}

impl ContentViewVersion {
    /// Version parsed as a float, `None` if it is not numeric.
    pub fn number(&self) -> Option<f64> {
        self.version
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
    }

    pub fn is_in(&self, environment: EnvironmentId) -> bool {
        self.environment_ids.contains(&environment)
    }
}

/// A content view, simple or composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentView {
    pub id: ContentViewId,
    pub name: String,
    pub composite: bool,
    /// Empty for composites on some servers
    #[serde(default)]
    pub repository_ids: Vec<RepositoryId>,
    /// Only populated for composites
    #[serde(default)]
    pub component_ids: Vec<ContentViewId>,
    pub versions: Vec<ContentViewVersion>,
}

impl ContentView {
    pub fn contains_repository(&self, repository: RepositoryId) -> bool {
        self.repository_ids.contains(&repository)
    }
}

/// Handle returned by any request that starts server-side work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRef {
    pub id: TaskId,
}

/// Polled task status; the caller already knows which task it asked for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub pending: bool,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

impl Task {
    /// A finished task whose result is reported and is not `success`.
    pub fn finished_unsuccessfully(&self) -> bool {
        !self.pending && self.result.as_deref().is_some_and(|r| r != "success")
    }
}

/// Content items an incremental update adds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentItems {
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub package_ids: Vec<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errata_ids: Vec<String>,
}

impl ContentItems {
    pub fn is_empty(&self) -> bool {
        self.package_ids.is_empty() && self.errata_ids.is_empty()
    }
}

/// Version/environment pairing inside an incremental update body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionEnvironments {
    pub content_view_version_id: VersionId,
    pub environment_ids: Vec<EnvironmentId>,
}

/// Body of an incremental update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncrementalUpdate {
    pub content_view_version_environments: Vec<VersionEnvironments>,
    pub add_content: ContentItems,
    pub description: String,
}

impl IncrementalUpdate {
    /// Update targeting one version in one environment.
    pub fn single(
        version: VersionId,
        environment: EnvironmentId,
        add_content: ContentItems,
        description: impl Into<String>,
    ) -> Self {
        IncrementalUpdate {
            content_view_version_environments: vec![VersionEnvironments {
                content_view_version_id: version,
                environment_ids: vec![environment],
            }],
            add_content,
            description: description.into(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(serde_json::Number),
    Text(String),
}

// Some endpoints report paging fields as strings.
fn lenient_u32<'de, D>(deserializer: D) -> std::result::Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;
    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n
            .as_u64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| D::Error::custom(format!("expected page number, got {n}"))),
        NumberOrString::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| D::Error::custom(format!("expected page number, got {s:?}"))),
    }
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => n.to_string(),
        NumberOrString::Text(s) => s,
    })
}
