//! Paginated resource listing.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::Result;
use crate::model::{Query, ResourceKind};
use crate::session::{decode, Session};

/// Fetch every item of `kind` matching `filters`, across all pages.
///
/// Page 1 is requested with the server's default page size. Further pages
/// are requested with the reported page size for as long as the previous
/// page came back full. The first short page (empty included) ends the
/// listing, so a total that is an exact multiple of the page size costs
/// one extra, empty request.
pub async fn list_all<T: DeserializeOwned>(
    session: &Session,
    kind: ResourceKind,
    filters: &BTreeMap<String, String>,
) -> Result<Vec<T>> {
    let mut query = Query::new(session.organization_id());
    query.filters = filters.clone();

    let mut items = Vec::new();
    loop {
        let page = session.api().index(kind, &query).await?;
        let count = page.results.len();
        debug!(
            kind = %kind,
            page = page.page,
            per_page = page.per_page,
            count,
            total = page.total,
            "fetched page"
        );

        for (i, raw) in page.results.into_iter().enumerate() {
            let what = format!("{kind} item {i} of page {}", query.page);
            items.push(decode(&what, raw)?);
        }

        if count == 0 || count != page.per_page as usize {
            break;
        }
        query = query.page(page.page + 1, Some(page.per_page));
    }

    Ok(items)
}
