use std::io::BufRead;

use dirx_core::{Category, Record};
use serde_json::Value;

use crate::error::CodecError;

/// How to treat record fields the current schema does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DecodeMode {
    /// Report the first unknown field as `CodecError::SchemaDrift`.
    #[default]
    Strict,
    /// Drop unknown fields and decode the rest.
    DiscardUnknown,
}

impl DecodeMode {
    #[must_use]
    pub const fn from_discard_unknown(discard: bool) -> Self {
        if discard {
            Self::DiscardUnknown
        } else {
            Self::Strict
        }
    }
}

/// Pull-based reader over one collection.
///
/// Only the bytes of the element being decoded are buffered; the array is
/// never materialized.
pub struct RecordReader<R: BufRead> {
    inner: Option<R>,
    category: String,
    mode: DecodeMode,
    first: bool,
    done: bool,
    element: Vec<u8>,
}

impl<R: BufRead> RecordReader<R> {
    /// Consume the opening `{"<key>":[` of a collection.
    ///
    /// # Errors
    ///
    /// `Format` for an empty stream, a bare array, or any other opening that is
    /// not a single-key object holding an array. `Io` on read failure.
    pub fn open(mut inner: R, mode: DecodeMode) -> Result<Self, CodecError> {
        match skip_ws(&mut inner)? {
            Some(b'{') => inner.consume(1),
            Some(b'[') => {
                return Err(CodecError::Format(
                    "expected an object keyed by category, found a bare array".into(),
                ));
            }
            Some(other) => {
                return Err(CodecError::Format(format!(
                    "expected '{{' at start of collection, found '{}'",
                    char::from(other)
                )));
            }
            None => return Err(CodecError::Format("empty stream".into())),
        }

        let category = read_key(&mut inner)?;
        expect(&mut inner, b':')?;
        expect(&mut inner, b'[')?;

        tracing::debug!(category = %category, "opened collection");
        Ok(Self {
            inner: Some(inner),
            category,
            mode,
            first: true,
            done: false,
            element: Vec::new(),
        })
    }

    /// As [`open`](Self::open), and require the key to name `expected`.
    ///
    /// # Errors
    ///
    /// Everything `open` returns, plus `CategoryMismatch`.
    pub fn open_expecting(
        inner: R,
        expected: Category,
        mode: DecodeMode,
    ) -> Result<Self, CodecError> {
        let reader = Self::open(inner, mode)?;
        if reader.category != expected.as_str() {
            return Err(CodecError::CategoryMismatch {
                expected,
                found: reader.category,
            });
        }
        Ok(reader)
    }

    /// The collection key exactly as it appeared in the stream.
    #[must_use]
    pub fn category(&self) -> &str {
        &self.category
    }

    #[must_use]
    pub fn known_category(&self) -> Option<Category> {
        Category::from_name(&self.category)
    }

    /// Decode the next record.
    ///
    /// Returns `Ok(None)` once the array and the enclosing object are closed,
    /// and on every call after that. A `SchemaDrift` error has consumed the
    /// offending element, so the caller may skip it and call again.
    ///
    /// # Errors
    ///
    /// `CategoryMismatch` if `T` does not belong to this collection,
    /// `SchemaDrift` for unknown fields in strict mode, `Decode` for a record
    /// of the wrong shape, `Format` for broken structure, `Io` on read failure.
    pub fn next<T: Record>(&mut self) -> Result<Option<T>, CodecError> {
        if self.done {
            return Ok(None);
        }
        if self.known_category() != Some(T::CATEGORY) {
            return Err(CodecError::CategoryMismatch {
                expected: T::CATEGORY,
                found: self.category.clone(),
            });
        }

        match self.advance() {
            Ok(true) => {}
            Ok(false) => return Ok(None),
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        }

        decode(&self.element, self.mode)
    }

    /// Release the underlying stream. Later calls to `next` return `None`.
    pub fn close(&mut self) {
        self.inner = None;
        self.done = true;
    }

    /// Move past the next separator and buffer one element. `false` at the
    /// end of the collection.
    fn advance(&mut self) -> Result<bool, CodecError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(false);
        };

        let mut next = skip_ws(inner)?;
        if next == Some(b']') {
            inner.consume(1);
            close_document(inner, &self.category)?;
            self.close();
            return Ok(false);
        }

        if !self.first {
            if next != Some(b',') {
                return Err(unexpected(next, "',' or ']' between records"));
            }
            inner.consume(1);
            next = skip_ws(inner)?;
        }
        match next {
            None | Some(b']' | b',' | b'}') => {
                return Err(unexpected(next, "a record"));
            }
            Some(_) => {}
        }

        self.first = false;
        scan_value(inner, &mut self.element)?;
        Ok(true)
    }
}

fn decode<T: Record>(bytes: &[u8], mode: DecodeMode) -> Result<Option<T>, CodecError> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| CodecError::Format(format!("invalid record JSON: {e}")))?;
    let Value::Object(mut fields) = value else {
        return Err(CodecError::Format("record is not a JSON object".into()));
    };

    let unknown: Vec<String> = fields
        .keys()
        .filter(|key| !T::FIELDS.contains(&key.as_str()))
        .cloned()
        .collect();
    if let Some(field) = unknown.first() {
        match mode {
            DecodeMode::Strict => {
                return Err(CodecError::SchemaDrift {
                    category: T::CATEGORY,
                    field: field.clone(),
                });
            }
            DecodeMode::DiscardUnknown => {
                for key in &unknown {
                    fields.remove(key);
                }
                tracing::debug!(category = %T::CATEGORY, ?unknown, "discarded unknown fields");
            }
        }
    }

    serde_json::from_value(Value::Object(fields))
        .map(Some)
        .map_err(|source| CodecError::Decode {
            category: T::CATEGORY,
            source,
        })
}

/// Consume the `}` after the array, then peek for anything else.
fn close_document<R: BufRead>(inner: &mut R, category: &str) -> Result<(), CodecError> {
    expect(inner, b'}')?;
    if skip_ws(inner)?.is_some() {
        tracing::warn!(category, "ignoring trailing bytes after collection");
    }
    Ok(())
}

fn unexpected(found: Option<u8>, wanted: &str) -> CodecError {
    match found {
        Some(b) => CodecError::Format(format!("expected {wanted}, found '{}'", char::from(b))),
        None => CodecError::Format(format!("expected {wanted}, found end of stream")),
    }
}

fn expect<R: BufRead>(inner: &mut R, byte: u8) -> Result<(), CodecError> {
    let found = skip_ws(inner)?;
    if found != Some(byte) {
        return Err(unexpected(found, &format!("'{}'", char::from(byte))));
    }
    inner.consume(1);
    Ok(())
}

fn read_key<R: BufRead>(inner: &mut R) -> Result<String, CodecError> {
    let found = skip_ws(inner)?;
    if found != Some(b'"') {
        return Err(unexpected(found, "a collection key"));
    }
    let mut raw = Vec::new();
    scan_value(inner, &mut raw)?;
    serde_json::from_slice(&raw)
        .map_err(|e| CodecError::Format(format!("invalid collection key: {e}")))
}

/// Skip whitespace and peek at the next byte without consuming it.
fn skip_ws<R: BufRead>(inner: &mut R) -> std::io::Result<Option<u8>> {
    loop {
        let chunk = inner.fill_buf()?;
        if chunk.is_empty() {
            return Ok(None);
        }
        if let Some(i) = chunk.iter().position(|b| !b.is_ascii_whitespace()) {
            let b = chunk[i];
            inner.consume(i);
            return Ok(Some(b));
        }
        let n = chunk.len();
        inner.consume(n);
    }
}

/// Copy exactly one JSON value from `inner` into `out`.
fn scan_value<R: BufRead>(inner: &mut R, out: &mut Vec<u8>) -> Result<(), CodecError> {
    out.clear();
    let mut scanner = Scanner::default();
    loop {
        let chunk = inner.fill_buf()?;
        if chunk.is_empty() {
            return Err(CodecError::Format("stream ended inside a record".into()));
        }
        let (used, complete) = scanner.feed(chunk);
        out.extend_from_slice(&chunk[..used]);
        inner.consume(used);
        if complete {
            return Ok(());
        }
    }
}

/// Finds where a JSON value ends without parsing it.
#[derive(Default)]
struct Scanner {
    depth: usize,
    in_string: bool,
    escaped: bool,
    scalar: bool,
}

impl Scanner {
    /// Bytes of `chunk` that belong to the value, and whether it ended there.
    fn feed(&mut self, chunk: &[u8]) -> (usize, bool) {
        for (i, &b) in chunk.iter().enumerate() {
            if self.scalar {
                if matches!(b, b',' | b']' | b'}') || b.is_ascii_whitespace() {
                    return (i, true);
                }
                continue;
            }
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if b == b'\\' {
                    self.escaped = true;
                } else if b == b'"' {
                    self.in_string = false;
                    if self.depth == 0 {
                        return (i + 1, true);
                    }
                }
                continue;
            }
            match b {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth = self.depth.saturating_sub(1);
                    if self.depth == 0 {
                        return (i + 1, true);
                    }
                }
                _ if self.depth == 0 => self.scalar = true,
                _ => {}
            }
        }
        (chunk.len(), false)
    }
}
