//! Import pipeline.
//!
//! Three tasks cooperate on one import call:
//!
//! - a blocking reader walks the sources in order, decodes records and
//!   queues import requests on a bounded channel;
//! - the sender forwards queued requests on the stream and half-closes it
//!   once the reader is done;
//! - the receiver drains responses until the server closes its side,
//!   logging statuses and folding counters into an [`ImportReport`].
//!
//! Sender and receiver run under `try_join!`, so the first error ends the
//! import. Cancellation drops both without half-closing.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use dirx_config::TransferConfig;
use dirx_core::client::{DirectoryClient, ImportResponses, ImportSink};
use dirx_core::import::{ImportCounter, ImportMessage, ImportRequest, ImportResponse, Opcode};
use dirx_core::{Category, Object, Record, Relation};
use globset::{Glob, GlobMatcher};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::archive;
use crate::codec::{DecodeMode, RecordReader};
use crate::error::TransferError;
use crate::progress::ProgressCounter;

/// Where import records come from.
pub enum ImportSource {
    /// Collection files, read in the given order.
    Files(Vec<PathBuf>),
    /// Every file in a directory whose name matches the configured glob,
    /// in path order.
    Directory(PathBuf),
    /// A single collection from an open stream, such as stdin.
    Reader {
        name: String,
        reader: Box<dyn BufRead + Send>,
    },
    /// A backup archive.
    Archive(PathBuf),
}

impl ImportSource {
    pub fn reader(name: impl Into<String>, reader: impl BufRead + Send + 'static) -> Self {
        Self::Reader {
            name: name.into(),
            reader: Box::new(reader),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Applied to every record. `Delete` removes what the files describe.
    pub opcode: Opcode,
}

/// Totals reported by the server for one import.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub objects: ImportCounter,
    pub relations: ImportCounter,
    /// Status responses received.
    pub statuses: u64,
    /// Requests put on the stream.
    pub sent: u64,
}

impl ImportReport {
    /// Totals for one category.
    #[must_use]
    pub const fn counter(&self, category: Category) -> &ImportCounter {
        match category {
            Category::Objects => &self.objects,
            Category::Relations => &self.relations,
        }
    }

    /// Fold in one counter update.
    ///
    /// Servers send running totals, possibly more than once; each field keeps
    /// the largest value seen.
    fn merge(&mut self, category: Category, update: &ImportCounter) {
        let counter = match category {
            Category::Objects => &mut self.objects,
            Category::Relations => &mut self.relations,
        };
        counter.recv = counter.recv.max(update.recv);
        counter.set = counter.set.max(update.set);
        counter.delete = counter.delete.max(update.delete);
        counter.error = counter.error.max(update.error);
    }

    /// Records the server rejected, over both categories.
    #[must_use]
    pub const fn errors(&self) -> u64 {
        self.objects.error + self.relations.error
    }
}

/// Run one import call over `sources`.
///
/// # Errors
///
/// The first failure of the reader, sender, or receiver: `Filesystem` for
/// unreadable sources, `Codec` for malformed collections, `Transport` for
/// stream failures, `Cancelled` when `cancel` fires.
pub async fn import<C: DirectoryClient>(
    client: &C,
    sources: Vec<ImportSource>,
    options: ImportOptions,
    config: &TransferConfig,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<ImportReport, TransferError> {
    let glob = Glob::new(&config.import_glob)
        .map_err(|e| TransferError::InvalidSource(format!("import glob: {e}")))?
        .compile_matcher();
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let reader = SourceReader {
        tx,
        opcode: options.opcode,
        mode: DecodeMode::from_discard_unknown(config.discard_unknown),
        glob,
    };

    let run = async move {
        let (sink, responses) = client.import().await?;
        let reading = tokio::task::spawn_blocking(move || reader.run(sources));
        let (sent, mut report) = tokio::try_join!(
            send_all(sink, rx, reading, progress),
            receive_all(responses)
        )?;
        report.sent = sent;
        Ok(report)
    };

    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            tracing::debug!("import cancelled");
            Err(TransferError::Cancelled)
        }
        result = run => result,
    }
}

/// What the reader hands to the sender.
enum Produced {
    Request(ImportRequest),
    /// A record dropped for schema drift.
    Skipped(Category),
}

async fn send_all<S: ImportSink>(
    mut sink: S,
    mut queue: mpsc::Receiver<Produced>,
    reading: JoinHandle<Result<(), TransferError>>,
    progress: &ProgressCounter,
) -> Result<u64, TransferError> {
    let mut sent = 0u64;
    while let Some(item) = queue.recv().await {
        match item {
            Produced::Request(request) => {
                let category = request.msg.category();
                sink.send(request).await?;
                progress.inc(category);
                sent += 1;
            }
            Produced::Skipped(category) => progress.skip(category),
        }
    }

    reading.await??;
    sink.close_send().await?;
    tracing::debug!(sent, "import input closed");
    Ok(sent)
}

async fn receive_all<R: ImportResponses>(mut responses: R) -> Result<ImportReport, TransferError> {
    let mut report = ImportReport::default();
    while let Some(response) = responses.recv().await? {
        if let ImportResponse::Status(status) = &response {
            let record = status.req.as_ref().map(|req| match &req.msg {
                ImportMessage::Object(o) => o.key(),
                ImportMessage::Relation(r) => r.key(),
            });
            tracing::warn!(code = status.code, record = ?record, "import status: {}", status.msg);
            report.statuses += 1;
            continue;
        }
        for (category, counter) in response.counters() {
            match category {
                Some(category) => report.merge(category, counter),
                None => tracing::warn!(
                    counter_type = %counter.counter_type,
                    "ignoring counter of unknown type"
                ),
            }
        }
    }
    Ok(report)
}

/// Blocking side of an import: decodes sources into queued requests.
struct SourceReader {
    tx: mpsc::Sender<Produced>,
    opcode: Opcode,
    mode: DecodeMode,
    glob: GlobMatcher,
}

impl SourceReader {
    fn run(self, sources: Vec<ImportSource>) -> Result<(), TransferError> {
        for source in sources {
            match source {
                ImportSource::Files(paths) => {
                    for path in &paths {
                        self.file(path)?;
                    }
                }
                ImportSource::Directory(dir) => {
                    for path in self.list(&dir)? {
                        self.file(&path)?;
                    }
                }
                ImportSource::Reader { name, reader } => self.stream(&name, reader, None)?,
                ImportSource::Archive(path) => {
                    archive::read_entries(&path, |category, name, entry| {
                        self.stream(name, entry, Some(category))
                    })?;
                }
            }
        }
        Ok(())
    }

    fn list(&self, dir: &Path) -> Result<Vec<PathBuf>, TransferError> {
        let entries = std::fs::read_dir(dir).map_err(|e| TransferError::filesystem(dir, e))?;
        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| TransferError::filesystem(dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if self.glob.is_match(entry.file_name()) {
                paths.push(path);
            } else {
                tracing::warn!(file = %path.display(), "skipping file not matching import glob");
            }
        }
        paths.sort();
        tracing::debug!(dir = %dir.display(), files = paths.len(), "import directory listed");
        Ok(paths)
    }

    fn file(&self, path: &Path) -> Result<(), TransferError> {
        let file = File::open(path).map_err(|e| TransferError::filesystem(path, e))?;
        self.stream(&path.display().to_string(), BufReader::new(file), None)
    }

    /// Queue every record of one collection. With `expected` set, the
    /// collection key must name that category; otherwise a key naming no
    /// known category skips the source.
    fn stream<R: BufRead>(
        &self,
        name: &str,
        reader: R,
        expected: Option<Category>,
    ) -> Result<(), TransferError> {
        let mut records = match expected {
            Some(category) => RecordReader::open_expecting(reader, category, self.mode),
            None => RecordReader::open(reader, self.mode),
        }
        .map_err(|e| TransferError::codec(name, e))?;

        match records.known_category() {
            Some(Category::Objects) => self.drain::<Object, R>(name, &mut records),
            Some(Category::Relations) => self.drain::<Relation, R>(name, &mut records),
            None => {
                tracing::warn!(
                    source = name,
                    key = records.category(),
                    "skipping collection of unknown category"
                );
                Ok(())
            }
        }
    }

    fn drain<T, R>(&self, name: &str, records: &mut RecordReader<R>) -> Result<(), TransferError>
    where
        T: Record + Into<ImportMessage>,
        R: BufRead,
    {
        let mut skipped = 0u64;
        loop {
            match records.next::<T>() {
                Ok(Some(record)) => {
                    self.queue(Produced::Request(ImportRequest::new(self.opcode, record)))?;
                }
                Ok(None) => break,
                Err(e) if e.is_skippable() => {
                    if skipped == 0 {
                        tracing::warn!(source = name, "skipping records with unknown fields: {e}");
                    }
                    skipped += 1;
                    self.queue(Produced::Skipped(T::CATEGORY))?;
                }
                Err(e) => return Err(TransferError::codec(name, e)),
            }
        }
        records.close();
        tracing::debug!(source = name, skipped, "source read");
        Ok(())
    }

    fn queue(&self, item: Produced) -> Result<(), TransferError> {
        self.tx
            .blocking_send(item)
            .map_err(|_| TransferError::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use dirx_core::memory::{MemoryDirectory, MemoryOptions};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::error::CodecError;
    use crate::test_logs;

    fn collection(text: &str) -> ImportSource {
        ImportSource::reader("stdin", Cursor::new(text.as_bytes().to_vec()))
    }

    async fn run(
        dir: &MemoryDirectory,
        sources: Vec<ImportSource>,
    ) -> Result<ImportReport, TransferError> {
        import(
            dir,
            sources,
            ImportOptions::default(),
            &TransferConfig::default(),
            &ProgressCounter::hidden("import"),
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn empty_collection_yields_zero_counters() {
        let dir = MemoryDirectory::new();
        let report = run(&dir, vec![collection(r#"{"objects":[]}"#)]).await.unwrap();
        assert_eq!(report.objects, ImportCounter::default());
        assert_eq!(report.relations, ImportCounter::default());
        assert_eq!(report.sent, 0);
    }

    #[tokio::test]
    async fn no_sources_still_completes() {
        let dir = MemoryDirectory::new();
        let report = run(&dir, Vec::new()).await.unwrap();
        assert_eq!(report.sent, 0);
    }

    #[tokio::test]
    async fn drifted_record_is_skipped_and_counted() {
        let dir = MemoryDirectory::new();
        let progress = ProgressCounter::hidden("import");
        let report = import(
            &dir,
            vec![collection(
                r#"{"objects":[{"type":"user","id":"a"},{"type":"user","id":"b","color":"red"},{"type":"user","id":"c"}]}"#,
            )],
            ImportOptions::default(),
            &TransferConfig::default(),
            &progress,
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.objects.set, 2);
        assert_eq!(progress.count(Category::Objects), 2);
        assert_eq!(progress.skipped(Category::Objects), 1);
        assert_eq!(dir.objects().len(), 2);
    }

    #[tokio::test]
    async fn discard_unknown_keeps_drifted_records() {
        let dir = MemoryDirectory::new();
        let config = TransferConfig {
            discard_unknown: true,
            ..TransferConfig::default()
        };
        let report = import(
            &dir,
            vec![collection(r#"{"objects":[{"type":"user","id":"b","color":"red"}]}"#)],
            ImportOptions::default(),
            &config,
            &ProgressCounter::hidden("import"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.objects.set, 1);
    }

    #[tokio::test]
    async fn malformed_source_fails_the_import() {
        let dir = MemoryDirectory::new();
        let err = run(&dir, vec![collection(r#"[{"type":"user","id":"a"}]"#)])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TransferError::Codec {
                error: CodecError::Format(_),
                ..
            }
        ));
        assert_eq!(err.kind(), crate::error::ErrorKind::Format);
    }

    #[tokio::test]
    async fn unknown_category_is_skipped() {
        let dir = MemoryDirectory::new();
        let report = run(
            &dir,
            vec![
                collection(r#"{"manifest":[{"name":"x"}]}"#),
                collection(r#"{"objects":[{"type":"user","id":"a"}]}"#),
            ],
        )
        .await
        .unwrap();
        assert_eq!(report.objects.recv, 1);
    }

    #[tokio::test]
    async fn rejected_records_surface_as_statuses() {
        let dir = MemoryDirectory::new();
        let report = run(
            &dir,
            vec![collection(r#"{"objects":[{"type":"user","id":""},{"type":"user","id":"a"}]}"#)],
        )
        .await
        .unwrap();
        assert_eq!(report.statuses, 1);
        assert_eq!(report.objects.recv, 2);
        assert_eq!(report.objects.set, 1);
        assert_eq!(report.errors(), 1);
    }

    #[tokio::test]
    async fn delete_opcode_removes_records() {
        let dir = MemoryDirectory::with_options(MemoryOptions::default());
        dir.insert_object(Object::new("user", "a"));
        dir.insert_object(Object::new("user", "b"));

        let report = import(
            &dir,
            vec![collection(r#"{"objects":[{"type":"user","id":"a"}]}"#)],
            ImportOptions {
                opcode: Opcode::Delete,
            },
            &TransferConfig::default(),
            &ProgressCounter::hidden("import"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(report.objects.delete, 1);
        assert_eq!(dir.objects().len(), 1);
        assert_eq!(dir.objects()[0].id, "b");
    }

    #[test]
    fn listing_warns_about_files_outside_the_glob() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.json"), "{}").unwrap();
        std::fs::write(dir.path().join("a.json"), "{}").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("nested.json")).unwrap();

        let (tx, _rx) = mpsc::channel(1);
        let reader = SourceReader {
            tx,
            opcode: Opcode::Set,
            mode: DecodeMode::Strict,
            glob: Glob::new("*.json").unwrap().compile_matcher(),
        };
        let logs = test_logs::capture();
        let paths = reader.list(dir.path()).unwrap();

        assert_eq!(paths, vec![dir.path().join("a.json"), dir.path().join("b.json")]);
        let logged = logs.contents();
        assert!(logged.contains("skipping file not matching import glob"), "{logged}");
        assert!(logged.contains("notes.txt"), "{logged}");
        assert!(!logged.contains("nested.json"), "{logged}");
    }

    #[test]
    fn merge_keeps_largest_snapshot() {
        let mut report = ImportReport::default();
        let snapshot = |n| ImportCounter {
            recv: n,
            set: n,
            ..ImportCounter::default()
        };
        report.merge(Category::Relations, &snapshot(5));
        report.merge(Category::Relations, &snapshot(3));
        report.merge(Category::Relations, &snapshot(9));
        assert_eq!(report.counter(Category::Relations).recv, 9);
        assert_eq!(report.counter(Category::Relations).set, 9);
        assert_eq!(report.counter(Category::Objects), &ImportCounter::default());
    }
}
