use std::io::{self, Write};

use dirx_core::{Category, Record};

use crate::error::CodecError;

/// Incremental writer of one collection.
///
/// The opening `{"<category>":[` is written by [`open`](Self::open). Records
/// are appended with [`write`](Self::write); [`finish`](Self::finish) writes
/// `]}` and flushes. Dropping an unfinished writer finishes it, so a
/// collection cut short by an error is still valid JSON.
pub struct RecordWriter<W: Write> {
    inner: Option<W>,
    category: Category,
    count: u64,
    scratch: Vec<u8>,
}

impl<W: Write> RecordWriter<W> {
    /// Start a collection named after `category`.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Io` if the opening bytes cannot be written.
    pub fn open(mut inner: W, category: Category) -> Result<Self, CodecError> {
        inner.write_all(b"{")?;
        serde_json::to_writer(&mut inner, category.as_str()).map_err(CodecError::Encode)?;
        inner.write_all(b":[")?;
        Ok(Self {
            inner: Some(inner),
            category,
            count: 0,
            scratch: Vec::new(),
        })
    }

    #[must_use]
    pub const fn category(&self) -> Category {
        self.category
    }

    /// Records written so far.
    #[must_use]
    pub const fn count(&self) -> u64 {
        self.count
    }

    /// Append one record.
    ///
    /// The record is marshalled before anything is written, so an encode
    /// failure leaves the collection intact.
    ///
    /// # Errors
    ///
    /// `CategoryMismatch` if `T` belongs to another collection, `Encode` if
    /// marshalling fails, `Io` if the writer is finished or the write fails.
    pub fn write<T: Record>(&mut self, record: &T) -> Result<(), CodecError> {
        if T::CATEGORY != self.category {
            return Err(CodecError::CategoryMismatch {
                expected: self.category,
                found: T::CATEGORY.as_str().to_string(),
            });
        }

        self.scratch.clear();
        serde_json::to_writer(&mut self.scratch, record).map_err(CodecError::Encode)?;

        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::other("collection writer is already finished"))?;
        if self.count > 0 {
            inner.write_all(b",")?;
        }
        inner.write_all(&self.scratch)?;
        self.count += 1;
        Ok(())
    }

    /// Close the array and the object, then flush. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Io` if the closing bytes cannot be written.
    pub fn finish(&mut self) -> Result<(), CodecError> {
        if let Some(mut inner) = self.inner.take() {
            inner.write_all(b"]}")?;
            inner.flush()?;
        }
        Ok(())
    }

    /// Finish the collection and hand back the underlying writer.
    ///
    /// # Errors
    ///
    /// `Io` if the closing bytes cannot be written or the writer was already
    /// finished.
    pub fn into_inner(mut self) -> Result<W, CodecError> {
        let mut inner = self
            .inner
            .take()
            .ok_or_else(|| io::Error::other("collection writer is already finished"))?;
        inner.write_all(b"]}")?;
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Drop for RecordWriter<W> {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!(category = %self.category, "failed to close collection: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dirx_core::{Object, Relation};
    use pretty_assertions::assert_eq;

    /// Shares its buffer so tests can look at the bytes after the writer is dropped.
    #[derive(Clone, Default)]
    struct Shared(std::rc::Rc<std::cell::RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn separates_records_with_commas() {
        let mut writer = RecordWriter::open(Vec::new(), Category::Objects).unwrap();
        writer.write(&Object::new("user", "a")).unwrap();
        writer.write(&Object::new("user", "b")).unwrap();
        let bytes = writer.into_inner().unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            r#"{"objects":[{"type":"user","id":"a"},{"type":"user","id":"b"}]}"#
        );
    }

    #[test]
    fn drop_closes_a_partial_collection() {
        let shared = Shared::default();
        {
            let mut writer = RecordWriter::open(shared.clone(), Category::Objects).unwrap();
            writer.write(&Object::new("user", "a")).unwrap();
        }
        let bytes = shared.0.borrow().clone();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["objects"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn finish_is_idempotent_and_blocks_further_writes() {
        let shared = Shared::default();
        let mut writer = RecordWriter::open(shared.clone(), Category::Objects).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(matches!(
            writer.write(&Object::new("user", "a")),
            Err(CodecError::Io(_))
        ));
        drop(writer);
        assert_eq!(shared.0.borrow().as_slice(), br#"{"objects":[]}"#);
    }

    #[test]
    fn rejects_records_of_another_category() {
        let mut writer = RecordWriter::open(Vec::new(), Category::Objects).unwrap();
        let err = writer
            .write(&Relation::new(("doc", "1"), "owner", ("user", "a")))
            .unwrap_err();
        assert!(matches!(err, CodecError::CategoryMismatch { .. }));
        assert_eq!(writer.count(), 0);
    }
}
