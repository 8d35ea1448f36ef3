//! Following cursor-paginated reads to the end.
//!
//! A fetch starts with an empty token and keeps asking for the next page
//! until the server answers with an empty `next_token`. Results are
//! concatenated in page order. Any failed request aborts the fetch and
//! nothing accumulated so far is returned.

use std::collections::BTreeMap;
use std::future::Future;

use dirx_core::client::DirectoryClient;
use dirx_core::pagination::{
    GetObjectsRequest, GetRelationsRequest, PaginationRequest, PaginationResponse, RelationFilter,
};
use dirx_core::{Object, Relation, TransportError};

/// Issue paged requests until the last page, handing each page to `absorb`.
///
/// Returns the number of requests made.
///
/// # Errors
///
/// The first error returned by `call`.
pub async fn drain_pages<P, F, Fut, A>(
    page_size: u32,
    mut call: F,
    mut absorb: A,
) -> Result<u32, TransportError>
where
    F: FnMut(PaginationRequest) -> Fut,
    Fut: Future<Output = Result<(P, PaginationResponse), TransportError>>,
    A: FnMut(P),
{
    let mut token = String::new();
    let mut requests = 0u32;
    loop {
        let (page, cursor) = call(PaginationRequest {
            size: page_size,
            token,
        })
        .await?;
        requests += 1;
        absorb(page);

        if cursor.is_last() {
            tracing::debug!(requests, "pagination complete");
            return Ok(requests);
        }
        token = cursor.next_token;
    }
}

/// Every object of `object_type` (all types when empty).
///
/// # Errors
///
/// The first transport error; partial results are dropped.
pub async fn fetch_objects<C: DirectoryClient>(
    client: &C,
    object_type: &str,
    page_size: u32,
) -> Result<Vec<Object>, TransportError> {
    let mut objects = Vec::new();
    drain_pages(
        page_size,
        |page| {
            let request = GetObjectsRequest {
                object_type: object_type.to_string(),
                page,
            };
            async move {
                let response = client.get_objects(request).await?;
                Ok((response.results, response.page))
            }
        },
        |results: Vec<Object>| objects.extend(results),
    )
    .await?;
    Ok(objects)
}

/// Relations matching a filter, plus the objects they reference.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationSet {
    pub relations: Vec<Relation>,
    /// Referenced objects keyed by `type:id`. When two pages carry the same
    /// key, the later page wins.
    pub objects: BTreeMap<String, Object>,
}

impl RelationSet {
    /// Append one page.
    pub fn absorb(&mut self, relations: Vec<Relation>, objects: BTreeMap<String, Object>) {
        self.relations.extend(relations);
        self.objects.extend(objects);
    }
}

/// Every relation matching `filter`, with the objects on either end.
///
/// # Errors
///
/// The first transport error; partial results are dropped.
pub async fn fetch_relations<C: DirectoryClient>(
    client: &C,
    filter: &RelationFilter,
    page_size: u32,
) -> Result<RelationSet, TransportError> {
    let mut set = RelationSet::default();
    drain_pages(
        page_size,
        |page| {
            let request = GetRelationsRequest {
                filter: filter.clone(),
                with_objects: true,
                page,
            };
            async move {
                let response = client.get_relations(request).await?;
                Ok(((response.results, response.objects), response.page))
            }
        },
        |(relations, objects): (Vec<Relation>, BTreeMap<String, Object>)| {
            set.absorb(relations, objects);
        },
    )
    .await?;
    Ok(set)
}
