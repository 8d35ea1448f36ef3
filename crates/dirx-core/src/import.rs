//! Import stream messages.
//!
//! The client sends a sequence of `ImportRequest`s and half-closes. The server
//! answers with statuses and counters until it closes its side. Two response
//! shapes exist: the current one carries one typed counter per message, the
//! older one delivers object and relation counters under fixed field names.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::category::Category;
use crate::records::{Object, Relation};

/// Operation applied to the record carried by an import request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Opcode {
    #[default]
    Set,
    Delete,
}

impl Opcode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Set => "set",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Record payload of an import request.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ImportMessage {
    Object(Object),
    Relation(Relation),
}

impl ImportMessage {
    #[must_use]
    pub const fn category(&self) -> Category {
        match self {
            Self::Object(_) => Category::Objects,
            Self::Relation(_) => Category::Relations,
        }
    }
}

impl From<Object> for ImportMessage {
    fn from(value: Object) -> Self {
        Self::Object(value)
    }
}

impl From<Relation> for ImportMessage {
    fn from(value: Relation) -> Self {
        Self::Relation(value)
    }
}

/// One operation on the import stream. Sent once, never retried by dirx.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ImportRequest {
    pub op_code: Opcode,
    pub msg: ImportMessage,
}

impl ImportRequest {
    pub fn new(op_code: Opcode, msg: impl Into<ImportMessage>) -> Self {
        Self {
            op_code,
            msg: msg.into(),
        }
    }

    pub fn set(msg: impl Into<ImportMessage>) -> Self {
        Self::new(Opcode::Set, msg)
    }

    pub fn delete(msg: impl Into<ImportMessage>) -> Self {
        Self::new(Opcode::Delete, msg)
    }
}

/// Running totals the server reports for one category.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ImportCounter {
    pub recv: u64,
    pub set: u64,
    pub delete: u64,
    pub error: u64,
    /// Counter type, `"object"` or `"relation"`.
    #[serde(rename = "type", default)]
    pub counter_type: String,
}

impl ImportCounter {
    /// Category this counter reports on, if the type is recognized.
    #[must_use]
    pub fn category(&self) -> Option<Category> {
        Category::from_name(&self.counter_type)
    }
}

/// Diagnostic status emitted by the server. Not fatal by itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ImportStatus {
    pub code: u32,
    pub msg: String,
    /// The request the status refers to, when the server echoes it back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req: Option<ImportRequest>,
}

/// One message on the response half of the import stream.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ImportResponse {
    Status(ImportStatus),
    Counter(ImportCounter),
    /// Older shape: counters under fixed field names.
    Legacy {
        #[serde(default)]
        object: Option<ImportCounter>,
        #[serde(default)]
        relation: Option<ImportCounter>,
    },
}

impl ImportResponse {
    /// Flatten either response shape into `(category, counter)` pairs.
    ///
    /// Counters whose type is not recognized are returned with `None` so the
    /// caller can report them.
    #[must_use]
    pub fn counters(&self) -> Vec<(Option<Category>, &ImportCounter)> {
        match self {
            Self::Status(_) => Vec::new(),
            Self::Counter(counter) => vec![(counter.category(), counter)],
            Self::Legacy { object, relation } => object
                .iter()
                .map(|c| (Some(Category::Objects), c))
                .chain(relation.iter().map(|c| (Some(Category::Relations), c)))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn legacy_and_typed_counters_flatten_alike() {
        let counter = ImportCounter {
            recv: 3,
            set: 3,
            counter_type: "object".into(),
            ..ImportCounter::default()
        };
        let typed = ImportResponse::Counter(counter.clone());
        let legacy = ImportResponse::Legacy {
            object: Some(ImportCounter {
                counter_type: String::new(),
                ..counter.clone()
            }),
            relation: None,
        };

        let typed_pairs = typed.counters();
        let legacy_pairs = legacy.counters();
        assert_eq!(typed_pairs.len(), 1);
        assert_eq!(legacy_pairs.len(), 1);
        assert_eq!(typed_pairs[0].0, Some(Category::Objects));
        assert_eq!(legacy_pairs[0].0, Some(Category::Objects));
        assert_eq!(typed_pairs[0].1.set, legacy_pairs[0].1.set);
    }

    #[test]
    fn unknown_counter_type_is_reported_as_none() {
        let response = ImportResponse::Counter(ImportCounter {
            counter_type: "manifest".into(),
            ..ImportCounter::default()
        });
        assert_eq!(response.counters()[0].0, None);
    }

    #[test]
    fn status_has_no_counters() {
        let response = ImportResponse::Status(ImportStatus {
            code: 3,
            msg: "invalid argument".into(),
            req: None,
        });
        assert!(response.counters().is_empty());
    }

    #[test]
    fn request_carries_category_of_payload() {
        let req = ImportRequest::delete(Relation::new(("doc", "1"), "owner", ("user", "a")));
        assert_eq!(req.op_code, Opcode::Delete);
        assert_eq!(req.msg.category(), Category::Relations);
    }
}
