//! Directory records.
//!
//! Objects and relations are serialized in camelCase, the shape the directory
//! service uses for its JSON representation. Server-assigned fields
//! (timestamps, etag) are optional so that exported files can omit them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::category::Category;

/// A structured value that can travel through a collection file.
///
/// `FIELDS` lists every JSON key the current schema understands. Readers use
/// it to tell schema drift (a newer producer added a field) apart from a
/// malformed record.
pub trait Record: Serialize + DeserializeOwned + Send + 'static {
    /// The collection this record type belongs to.
    const CATEGORY: Category;

    /// JSON keys understood by this schema version.
    const FIELDS: &'static [&'static str];

    /// Clear fields the server assigns on write (timestamps, etag).
    fn strip_server_fields(&mut self);

    /// Human-readable identity, used in log lines.
    fn key(&self) -> String;
}

/// A directory object.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Object {
    #[serde(rename = "type")]
    pub object_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

impl Object {
    /// Create an object with just its identity.
    #[must_use]
    pub fn new(object_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            object_type: object_type.into(),
            id: id.into(),
            ..Self::default()
        }
    }

    /// `type:id`, the key used by relation side-maps.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}:{}", self.object_type, self.id)
    }
}

impl Record for Object {
    const CATEGORY: Category = Category::Objects;
    const FIELDS: &'static [&'static str] = &[
        "type",
        "id",
        "displayName",
        "properties",
        "createdAt",
        "updatedAt",
        "etag",
    ];

    fn strip_server_fields(&mut self) {
        self.created_at = None;
        self.updated_at = None;
        self.etag.clear();
    }

    fn key(&self) -> String {
        self.identity()
    }
}

/// A directory relation between an object and a subject.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Relation {
    pub object_type: String,
    pub object_id: String,
    pub relation: String,
    pub subject_type: String,
    pub subject_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub subject_relation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub etag: String,
}

impl Relation {
    /// Create a relation `object#relation@subject`.
    #[must_use]
    pub fn new(
        object: (&str, &str),
        relation: impl Into<String>,
        subject: (&str, &str),
    ) -> Self {
        Self {
            object_type: object.0.to_string(),
            object_id: object.1.to_string(),
            relation: relation.into(),
            subject_type: subject.0.to_string(),
            subject_id: subject.1.to_string(),
            ..Self::default()
        }
    }

    /// Set the subject relation (`group:eng#member`).
    #[must_use]
    pub fn with_subject_relation(mut self, subject_relation: impl Into<String>) -> Self {
        self.subject_relation = subject_relation.into();
        self
    }
}

impl Record for Relation {
    const CATEGORY: Category = Category::Relations;
    const FIELDS: &'static [&'static str] = &[
        "objectType",
        "objectId",
        "relation",
        "subjectType",
        "subjectId",
        "subjectRelation",
        "createdAt",
        "updatedAt",
        "etag",
    ];

    fn strip_server_fields(&mut self) {
        self.created_at = None;
        self.updated_at = None;
        self.etag.clear();
    }

    fn key(&self) -> String {
        let mut key = format!(
            "{}:{}#{}@{}:{}",
            self.object_type, self.object_id, self.relation, self.subject_type, self.subject_id
        );
        if !self.subject_relation.is_empty() {
            key.push('#');
            key.push_str(&self.subject_relation);
        }
        key
    }
}
