//! Record categories.
//!
//! A category names one collection of records. The same name is used as the
//! single key of a collection file (`{"objects":[...]}`), as the archive entry
//! base name (`objects.json`), and, in singular form, as the counter type on
//! the import stream.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// The two record collections moved by dirx.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Objects,
    Relations,
}

impl Category {
    /// Every category, in archive order.
    pub const ALL: [Self; 2] = [Self::Objects, Self::Relations];

    /// Collection name, used as the JSON key of a collection file.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Objects => "objects",
            Self::Relations => "relations",
        }
    }

    /// File name of the collection inside an export directory or archive.
    #[must_use]
    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Objects => "objects.json",
            Self::Relations => "relations.json",
        }
    }

    /// Resolve a collection or counter name.
    ///
    /// Accepts the plural collection name and the singular form the import
    /// stream uses for counter types.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "objects" | "object" => Some(Self::Objects),
            "relations" | "relation" => Some(Self::Relations),
            _ => None,
        }
    }

    /// Resolve the category of a collection file from its base name.
    #[must_use]
    pub fn from_file_name(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?;
        Self::ALL.into_iter().find(|c| c.file_name() == name)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("objects", Some(Category::Objects))]
    #[case("object", Some(Category::Objects))]
    #[case("relations", Some(Category::Relations))]
    #[case("relation", Some(Category::Relations))]
    #[case("manifest", None)]
    #[case("", None)]
    fn resolves_names(#[case] name: &str, #[case] expected: Option<Category>) {
        assert_eq!(Category::from_name(name), expected);
    }

    #[test]
    fn resolves_file_names_by_base_name() {
        assert_eq!(
            Category::from_file_name(Path::new("backup/objects.json")),
            Some(Category::Objects)
        );
        assert_eq!(
            Category::from_file_name(Path::new("./relations.json")),
            Some(Category::Relations)
        );
        assert_eq!(Category::from_file_name(Path::new("objects.json.bak")), None);
        assert_eq!(Category::from_file_name(Path::new("objects")), None);
    }

    #[test]
    fn display_matches_collection_key() {
        for category in Category::ALL {
            assert_eq!(category.to_string(), category.as_str());
            assert!(category.file_name().starts_with(category.as_str()));
        }
    }
}
