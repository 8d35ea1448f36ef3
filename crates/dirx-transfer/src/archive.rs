//! Backup and restore through a single gzip-compressed tar file.
//!
//! A backup archive holds one collection file per category, `objects.json`
//! and `relations.json`. Restore streams entries straight out of the archive
//! into one import call; nothing is extracted to disk.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use dirx_config::TransferConfig;
use dirx_core::Category;
use dirx_core::client::DirectoryClient;
use dirx_core::export::{ExportOptions, ExportRequest};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;
use crate::export::{ExportSummary, export_to_dir};
use crate::import::{ImportOptions, ImportReport, ImportSource, import};
use crate::progress::ProgressCounter;

/// Export both categories and pack them into `dest`.
///
/// The archive is written even when the export fails part way, so whatever
/// was exported is kept; the export error is still returned. If the archive
/// cannot be written either, that failure is logged as a warning.
///
/// # Errors
///
/// The export error if there was one, otherwise any failure writing the
/// archive.
pub async fn backup<C: DirectoryClient>(
    client: &C,
    dest: &Path,
    config: &TransferConfig,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<ExportSummary, TransferError> {
    let staging =
        tempfile::tempdir().map_err(|e| TransferError::filesystem(std::env::temp_dir(), e))?;
    let exported = export_to_dir(
        client,
        staging.path(),
        ExportRequest::new(ExportOptions::DATA),
        config,
        progress,
        cancel,
    )
    .await;
    if let Err(e) = &exported {
        tracing::warn!("export failed, archiving partial data: {e}");
    }

    let dest_path = dest.to_path_buf();
    let staging_path = staging.path().to_path_buf();
    let level = config.compression_level;
    let archived =
        tokio::task::spawn_blocking(move || write_archive(&dest_path, &staging_path, level))
            .await
            .map_err(TransferError::from)
            .and_then(std::convert::identity);

    let summary = match exported {
        Ok(summary) => summary,
        Err(e) => {
            if let Err(archive_err) = &archived {
                tracing::warn!(
                    dest = %dest.display(),
                    "partial backup not written: {archive_err}"
                );
            }
            return Err(e);
        }
    };
    archived?;
    tracing::debug!(dest = %dest.display(), "backup written");
    Ok(summary)
}

/// Pack the collection files found in `staging` into a tar.gz at `dest`.
///
/// # Errors
///
/// `Filesystem` if `dest` cannot be created, `Archive` if writing fails.
pub fn write_archive(dest: &Path, staging: &Path, level: u32) -> Result<(), TransferError> {
    let file = File::create(dest).map_err(|e| TransferError::filesystem(dest, e))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::new(level));
    let mut builder = tar::Builder::new(encoder);

    for category in Category::ALL {
        let path = staging.join(category.file_name());
        if !path.exists() {
            continue;
        }
        builder
            .append_path_with_name(&path, category.file_name())
            .map_err(|e| TransferError::archive(dest, e))?;
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| TransferError::archive(dest, e))?;
    let mut out = encoder
        .finish()
        .map_err(|e| TransferError::archive(dest, e))?;
    out.flush().map_err(|e| TransferError::archive(dest, e))
}

/// Import every collection in the archive at `path` through one stream.
///
/// # Errors
///
/// Anything [`import`] returns for an [`ImportSource::Archive`].
pub async fn restore<C: DirectoryClient>(
    client: &C,
    path: &Path,
    config: &TransferConfig,
    progress: &ProgressCounter,
    cancel: &CancellationToken,
) -> Result<ImportReport, TransferError> {
    import(
        client,
        vec![ImportSource::Archive(path.to_path_buf())],
        ImportOptions::default(),
        config,
        progress,
        cancel,
    )
    .await
}

/// Visit each collection entry of an archive, in archive order.
///
/// Entries that are not regular files, and files whose name maps to no
/// category, are skipped. `visit` gets the category, a display name, and
/// a reader over the entry.
pub(crate) fn read_entries<F>(path: &Path, mut visit: F) -> Result<(), TransferError>
where
    F: FnMut(Category, &str, &mut dyn BufRead) -> Result<(), TransferError>,
{
    let file = File::open(path).map_err(|e| TransferError::filesystem(path, e))?;
    let mut archive = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let entries = archive
        .entries()
        .map_err(|e| TransferError::archive(path, e))?;

    for entry in entries {
        let mut entry = entry.map_err(|e| TransferError::archive(path, e))?;
        let entry_path = entry
            .path()
            .map_err(|e| TransferError::archive(path, e))?
            .into_owned();

        if !entry.header().entry_type().is_file() {
            tracing::debug!(entry = %entry_path.display(), "skipping non-file archive entry");
            continue;
        }
        let Some(category) = Category::from_file_name(&entry_path) else {
            tracing::warn!(entry = %entry_path.display(), "skipping unrecognized archive entry");
            continue;
        };

        let name = format!("{}:{}", path.display(), entry_path.display());
        let mut reader = BufReader::new(&mut entry);
        visit(category, &name, &mut reader)?;
    }
    Ok(())
}
