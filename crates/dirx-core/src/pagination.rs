//! Cursor-paginated read messages.
//!
//! An empty `next_token` marks the final page.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::records::{Object, Relation};

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PaginationRequest {
    pub size: u32,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct PaginationResponse {
    #[serde(default)]
    pub next_token: String,
}

impl PaginationResponse {
    /// Whether this was the last page.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_token.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GetObjectsRequest {
    /// Restrict to one object type. Empty means all types.
    #[serde(default)]
    pub object_type: String,
    pub page: PaginationRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GetObjectsResponse {
    pub results: Vec<Object>,
    pub page: PaginationResponse,
}

/// Filter for relation reads. Empty fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RelationFilter {
    #[serde(default)]
    pub object_type: String,
    #[serde(default)]
    pub object_id: String,
    #[serde(default)]
    pub relation: String,
    #[serde(default)]
    pub subject_type: String,
    #[serde(default)]
    pub subject_id: String,
}

impl RelationFilter {
    #[must_use]
    pub fn matches(&self, rel: &Relation) -> bool {
        fn field(want: &str, have: &str) -> bool {
            want.is_empty() || want == have
        }
        field(&self.object_type, &rel.object_type)
            && field(&self.object_id, &rel.object_id)
            && field(&self.relation, &rel.relation)
            && field(&self.subject_type, &rel.subject_type)
            && field(&self.subject_id, &rel.subject_id)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct GetRelationsRequest {
    #[serde(default)]
    pub filter: RelationFilter,
    /// Ask the server to return the objects the page's relations refer to.
    #[serde(default)]
    pub with_objects: bool,
    pub page: PaginationRequest,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct GetRelationsResponse {
    pub results: Vec<Relation>,
    /// Objects referenced by `results`, keyed by `type:id`.
    #[serde(default)]
    pub objects: BTreeMap<String, Object>,
    pub page: PaginationResponse,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_matches_everything() {
        let rel = Relation::new(("doc", "1"), "viewer", ("user", "bob"));
        assert!(RelationFilter::default().matches(&rel));
    }

    #[test]
    fn filter_fields_are_conjunctive() {
        let rel = Relation::new(("doc", "1"), "viewer", ("user", "bob"));
        let filter = RelationFilter {
            object_type: "doc".into(),
            relation: "viewer".into(),
            ..RelationFilter::default()
        };
        assert!(filter.matches(&rel));

        let other = RelationFilter {
            relation: "owner".into(),
            ..filter
        };
        assert!(!other.matches(&rel));
    }
}
