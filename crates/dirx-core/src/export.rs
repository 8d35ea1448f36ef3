//! Export stream messages.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::records::{Object, Relation};

bitflags::bitflags! {
    /// Categories requested from the export stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct ExportOptions: u32 {
        const DATA_OBJECTS = 1 << 0;
        const DATA_RELATIONS = 1 << 1;
        const STATS = 1 << 2;
        const DATA = Self::DATA_OBJECTS.bits() | Self::DATA_RELATIONS.bits();
    }
}

/// A single export request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportRequest {
    pub options: ExportOptions,
    /// Lower bound on change time. `None` exports everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_from: Option<DateTime<Utc>>,
}

impl ExportRequest {
    #[must_use]
    pub const fn new(options: ExportOptions) -> Self {
        Self {
            options,
            start_from: None,
        }
    }

    #[must_use]
    pub const fn since(mut self, start_from: DateTime<Utc>) -> Self {
        self.start_from = Some(start_from);
        self
    }
}

/// One unit of exported data.
#[derive(Debug, Clone, PartialEq)]
pub enum ExportEnvelope {
    Object(Object),
    Relation(Relation),
    Stats(Stats),
    /// A message kind this client does not understand, identified by its tag.
    Unknown { kind: String },
}

impl ExportEnvelope {
    /// Tag of the envelope, for log lines.
    #[must_use]
    pub fn kind(&self) -> &str {
        match self {
            Self::Object(_) => "object",
            Self::Relation(_) => "relation",
            Self::Stats(_) => "stats",
            Self::Unknown { kind } => kind,
        }
    }
}

/// Aggregate counts of a directory, keyed by object type.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct Stats {
    #[serde(default)]
    pub object_types: BTreeMap<String, ObjectTypeStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ObjectTypeStats {
    pub obj_count: u64,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct RelationStats {
    pub count: u64,
    #[serde(default)]
    pub subject_types: BTreeMap<String, SubjectTypeStats>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct SubjectTypeStats {
    pub count: u64,
    #[serde(default)]
    pub subject_relations: BTreeMap<String, u64>,
}

impl Stats {
    /// Count one object.
    pub fn record_object(&mut self, object: &Object) {
        self.object_types
            .entry(object.object_type.clone())
            .or_default()
            .obj_count += 1;
    }

    /// Count one relation under its object type, relation, and subject type.
    pub fn record_relation(&mut self, relation: &Relation) {
        let rel = self
            .object_types
            .entry(relation.object_type.clone())
            .or_default()
            .relations
            .entry(relation.relation.clone())
            .or_default();
        rel.count += 1;

        let subject = rel
            .subject_types
            .entry(relation.subject_type.clone())
            .or_default();
        subject.count += 1;
        if !relation.subject_relation.is_empty() {
            *subject
                .subject_relations
                .entry(relation.subject_relation.clone())
                .or_default() += 1;
        }
    }

    #[must_use]
    pub fn total_objects(&self) -> u64 {
        self.object_types.values().map(|t| t.obj_count).sum()
    }

    #[must_use]
    pub fn total_relations(&self) -> u64 {
        self.object_types
            .values()
            .flat_map(|t| t.relations.values())
            .map(|r| r.count)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn data_is_objects_and_relations() {
        assert!(ExportOptions::DATA.contains(ExportOptions::DATA_OBJECTS));
        assert!(ExportOptions::DATA.contains(ExportOptions::DATA_RELATIONS));
        assert!(!ExportOptions::DATA.contains(ExportOptions::STATS));
    }

    #[test]
    fn stats_count_by_type_relation_and_subject() {
        let mut stats = Stats::default();
        stats.record_object(&Object::new("user", "a"));
        stats.record_object(&Object::new("user", "b"));
        stats.record_object(&Object::new("group", "eng"));
        stats.record_relation(&Relation::new(("group", "eng"), "member", ("user", "a")));
        stats.record_relation(
            &Relation::new(("group", "eng"), "member", ("group", "ops"))
                .with_subject_relation("member"),
        );

        assert_eq!(stats.total_objects(), 3);
        assert_eq!(stats.total_relations(), 2);

        let member = &stats.object_types["group"].relations["member"];
        assert_eq!(member.count, 2);
        assert_eq!(member.subject_types["user"].count, 1);
        assert_eq!(member.subject_types["group"].subject_relations["member"], 1);
    }

    #[test]
    fn unknown_envelope_reports_its_tag() {
        let env = ExportEnvelope::Unknown {
            kind: "manifest".into(),
        };
        assert_eq!(env.kind(), "manifest");
    }
}
