//! Export pipeline.
//!
//! One export call yields a stream of envelopes. Objects and relations are
//! routed to an [`ExportSink`]; the stats envelope is kept for the caller;
//! envelope kinds this build does not know are logged and skipped. The only
//! successful ending is a clean end of stream.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use dirx_config::TransferConfig;
use dirx_core::client::{DirectoryClient, ExportStream};
use dirx_core::export::{ExportEnvelope, ExportOptions, ExportRequest, Stats};
use dirx_core::{Category, Object, Record, Relation};
use tokio_util::sync::CancellationToken;

use crate::codec::RecordWriter;
use crate::error::{CodecError, TransferError};
use crate::progress::ProgressCounter;

/// Destination for exported records.
pub trait ExportSink {
    /// Whether records of `category` have somewhere to go.
    fn accepts(&self, category: Category) -> bool;

    fn object(&mut self, object: Object) -> Result<(), TransferError>;

    fn relation(&mut self, relation: Relation) -> Result<(), TransferError>;
}

/// Routes records into per-category collection writers.
pub struct CodecSink<W: Write> {
    objects: Option<RecordWriter<W>>,
    relations: Option<RecordWriter<W>>,
    strip_server_fields: bool,
}

impl<W: Write> CodecSink<W> {
    /// A sink with no writers. Records are stripped of timestamps and etags
    /// when `strip_server_fields` is set.
    #[must_use]
    pub const fn new(strip_server_fields: bool) -> Self {
        Self {
            objects: None,
            relations: None,
            strip_server_fields,
        }
    }

    /// Attach the writer for its category, replacing any previous one.
    #[must_use]
    pub fn with_writer(mut self, writer: RecordWriter<W>) -> Self {
        match writer.category() {
            Category::Objects => self.objects = Some(writer),
            Category::Relations => self.relations = Some(writer),
        }
        self
    }

    /// Close every collection. All writers are finished even if one fails.
    ///
    /// # Errors
    ///
    /// The first writer error, tagged with its file name.
    pub fn finish(&mut self) -> Result<(), TransferError> {
        let mut first = None;
        for writer in [self.objects.as_mut(), self.relations.as_mut()]
            .into_iter()
            .flatten()
        {
            if let Err(e) = writer.finish() {
                first.get_or_insert(TransferError::codec(writer.category().file_name(), e));
            }
        }
        first.map_or(Ok(()), Err)
    }

    fn write<T: Record>(
        writer: Option<&mut RecordWriter<W>>,
        mut record: T,
        strip: bool,
    ) -> Result<(), TransferError> {
        let writer = writer.ok_or_else(|| {
            TransferError::codec(
                T::CATEGORY.file_name(),
                CodecError::Format(format!("no destination for {}", T::CATEGORY)),
            )
        })?;
        if strip {
            record.strip_server_fields();
        }
        writer
            .write(&record)
            .map_err(|e| TransferError::codec(T::CATEGORY.file_name(), e))
    }
}

impl<W: Write> ExportSink for CodecSink<W> {
    fn accepts(&self, category: Category) -> bool {
        match category {
            Category::Objects => self.objects.is_some(),
            Category::Relations => self.relations.is_some(),
        }
    }

    fn object(&mut self, object: Object) -> Result<(), TransferError> {
        Self::write(self.objects.as_mut(), object, self.strip_server_fields)
    }

    fn relation(&mut self, relation: Relation) -> Result<(), TransferError> {
        Self::write(self.relations.as_mut(), relation, self.strip_server_fields)
    }
}

/// What an export moved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    pub objects: u64,
    pub relations: u64,
    /// Envelopes of a kind this build does not recognize.
    pub unknown: u64,
    /// Records with no destination in the sink.
    pub unrouted: u64,
    pub stats: Option<Stats>,
}

/// The export option selecting one category's data.
#[must_use]
pub const fn option_for(category: Category) -> ExportOptions {
    match category {
        Category::Objects => ExportOptions::DATA_OBJECTS,
        Category::Relations => ExportOptions::DATA_RELATIONS,
    }
}

/// Run one export call into `sink`.
///
/// # Errors
///
/// `Cancelled` when `cancel` fires, `Transport` when the stream fails, or
/// whatever the sink returns. Records already handed to the sink stay there.
pub async fn export<C, S>(
    client: &C,
    request: ExportRequest,
    sink: &mut S,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<ExportSummary, TransferError>
where
    C: DirectoryClient,
    S: ExportSink,
{
    tracing::debug!(options = ?request.options, since = ?request.start_from, "starting export");
    let mut stream = tokio::select! {
        biased;
        () = cancel.cancelled() => return Err(TransferError::Cancelled),
        stream = client.export(request) => stream?,
    };

    let mut summary = ExportSummary::default();
    loop {
        let envelope = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            next = stream.recv() => next?,
        };
        let Some(envelope) = envelope else {
            break;
        };

        match envelope {
            ExportEnvelope::Object(object) => {
                if route(sink, Category::Objects, &mut summary) {
                    sink.object(object)?;
                    summary.objects += 1;
                    progress.inc(Category::Objects);
                }
            }
            ExportEnvelope::Relation(relation) => {
                if route(sink, Category::Relations, &mut summary) {
                    sink.relation(relation)?;
                    summary.relations += 1;
                    progress.inc(Category::Relations);
                }
            }
            ExportEnvelope::Stats(stats) => {
                if summary.stats.is_some() {
                    tracing::warn!("ignoring repeated stats envelope");
                } else {
                    summary.stats = Some(stats);
                }
            }
            ExportEnvelope::Unknown { kind } => {
                tracing::warn!(kind = %kind, "skipping unknown export envelope");
                summary.unknown += 1;
            }
        }
    }

    tracing::debug!(
        objects = summary.objects,
        relations = summary.relations,
        unknown = summary.unknown,
        "export complete"
    );
    Ok(summary)
}

fn route<S: ExportSink>(sink: &S, category: Category, summary: &mut ExportSummary) -> bool {
    if sink.accepts(category) {
        return true;
    }
    if summary.unrouted == 0 {
        tracing::warn!(%category, "export sent records with no destination, skipping them");
    }
    summary.unrouted += 1;
    false
}

/// Export the categories selected by `request` into `dir`, one collection
/// file per category (`objects.json`, `relations.json`).
///
/// Files are closed even when the export fails, so a partial export is still
/// readable.
///
/// Directory and file setup, and the final flush, run on the blocking pool.
/// Records are written on the runtime thread through a `BufWriter`, which
/// only touches the file once per filled buffer.
///
/// # Errors
///
/// `Filesystem` if the directory or a file cannot be created, then anything
/// [`export`] returns.
pub async fn export_to_dir<C: DirectoryClient>(
    client: &C,
    dir: &Path,
    request: ExportRequest,
    config: &TransferConfig,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<ExportSummary, TransferError> {
    let target = dir.to_path_buf();
    let options = request.options;
    let strip = config.strip_server_fields;
    let mut sink =
        tokio::task::spawn_blocking(move || open_dir_sink(&target, options, strip)).await??;

    let result = export(client, request, &mut sink, progress, cancel).await;
    let finished = tokio::task::spawn_blocking(move || sink.finish()).await;
    let summary = result?;
    finished??;
    Ok(summary)
}

fn open_dir_sink(
    dir: &Path,
    options: ExportOptions,
    strip_server_fields: bool,
) -> Result<CodecSink<BufWriter<File>>, TransferError> {
    std::fs::create_dir_all(dir).map_err(|e| TransferError::filesystem(dir, e))?;

    let mut sink = CodecSink::new(strip_server_fields);
    for category in Category::ALL {
        if !options.contains(option_for(category)) {
            continue;
        }
        let path = dir.join(category.file_name());
        let file = File::create(&path).map_err(|e| TransferError::filesystem(&path, e))?;
        let writer = RecordWriter::open(BufWriter::new(file), category)
            .map_err(|e| TransferError::codec(path.display().to_string(), e))?;
        sink = sink.with_writer(writer);
    }
    Ok(sink)
}

/// Export one category as a single collection written to `out`.
///
/// # Errors
///
/// Anything [`export`] returns, or a codec error from `out`.
pub async fn export_to_writer<C, W>(
    client: &C,
    out: W,
    category: Category,
    config: &TransferConfig,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<ExportSummary, TransferError>
where
    C: DirectoryClient,
    W: Write,
{
    let writer =
        RecordWriter::open(out, category).map_err(|e| TransferError::codec(category.as_str(), e))?;
    let mut sink = CodecSink::new(config.strip_server_fields).with_writer(writer);

    let result = export(
        client,
        ExportRequest::new(option_for(category)),
        &mut sink,
        progress,
        cancel,
    )
    .await;
    let finished = sink.finish();
    let summary = result?;
    finished?;
    Ok(summary)
}
