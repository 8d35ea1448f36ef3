//! Streaming collection codec.
//!
//! A collection is a JSON object with exactly one key, the category name,
//! whose value is an array of records:
//!
//! ```text
//! {"objects":[{"type":"user","id":"alice"},{"type":"user","id":"bob"}]}
//! ```
//!
//! [`RecordReader`] walks the structural tokens by hand and decodes one array
//! element at a time; [`RecordWriter`] emits the opening bytes eagerly and
//! appends records as they arrive. Neither holds more than one record in
//! memory.

mod reader;
mod writer;

pub use reader::{DecodeMode, RecordReader};
pub use writer::RecordWriter;

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use dirx_core::{Category, Object, Relation};
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    fn users(n: usize) -> Vec<Object> {
        (0..n)
            .map(|i| {
                let mut obj = Object::new("user", format!("user-{i}"));
                obj.display_name = format!("User \"{i}\" [x]");
                obj.properties
                    .insert("tags".into(), serde_json::json!(["a,b", "{c}"]));
                obj
            })
            .collect()
    }

    fn write_all(records: &[Object]) -> Vec<u8> {
        let mut writer = RecordWriter::open(Vec::new(), Category::Objects).unwrap();
        for record in records {
            writer.write(record).unwrap();
        }
        writer.into_inner().unwrap()
    }

    fn read_all(bytes: &[u8]) -> Vec<Object> {
        let mut reader = RecordReader::open(Cursor::new(bytes), DecodeMode::Strict).unwrap();
        let mut out = Vec::new();
        while let Some(obj) = reader.next::<Object>().unwrap() {
            out.push(obj);
        }
        out
    }

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(57)]
    fn writer_then_reader_preserves_sequence(#[case] n: usize) {
        let records = users(n);
        let bytes = write_all(&records);
        assert_eq!(read_all(&bytes), records);
    }

    #[test]
    fn empty_collection_bytes() {
        assert_eq!(write_all(&[]), br#"{"objects":[]}"#);

        let mut reader =
            RecordReader::open(Cursor::new(br#"{"objects":[]}"#), DecodeMode::Strict).unwrap();
        assert_eq!(reader.category(), "objects");
        assert!(reader.next::<Object>().unwrap().is_none());
        assert!(reader.next::<Object>().unwrap().is_none());
    }

    #[test]
    fn relations_roundtrip_through_expected_category() {
        let rels = vec![
            Relation::new(("group", "eng"), "member", ("user", "a")),
            Relation::new(("group", "eng"), "member", ("group", "ops"))
                .with_subject_relation("member"),
        ];
        let mut writer = RecordWriter::open(Vec::new(), Category::Relations).unwrap();
        for rel in &rels {
            writer.write(rel).unwrap();
        }
        assert_eq!(writer.count(), 2);
        let bytes = writer.into_inner().unwrap();

        let mut reader = RecordReader::open_expecting(
            Cursor::new(bytes),
            Category::Relations,
            DecodeMode::Strict,
        )
        .unwrap();
        let mut out = Vec::new();
        while let Some(rel) = reader.next::<Relation>().unwrap() {
            out.push(rel);
        }
        assert_eq!(out, rels);
    }
}
