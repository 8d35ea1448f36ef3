//! # dirx-transfer
//!
//! Streaming bulk transfer of directory records between a directory service
//! and local files.
//!
//! - [`codec`]: one-record-at-a-time reader and writer for collection files
//! - [`progress`]: per-category counters with an optional live line
//! - [`paging`]: follows cursor-paginated reads to the last page
//! - [`export`]: routes an export stream into collection writers
//! - [`import`]: feeds files, directories, streams, or archives into an
//!   import stream while draining its responses
//! - [`archive`]: backup to and restore from a tar.gz
//!
//! Every pipeline takes its configuration and counters as arguments and a
//! `CancellationToken` the caller can fire to abort it.

pub mod archive;
pub mod codec;
pub mod error;
pub mod export;
pub mod import;
pub mod paging;
pub mod progress;

pub use archive::{backup, restore};
pub use error::{CodecError, ErrorKind, TransferError};
pub use export::{CodecSink, ExportSink, ExportSummary, export, export_to_dir, export_to_writer};
pub use import::{ImportOptions, ImportReport, ImportSource, import};
pub use progress::ProgressCounter;

#[cfg(test)]
pub(crate) mod test_logs {
    use std::io::Write;
    use std::sync::{Arc, Mutex, PoisonError};

    use tracing::subscriber::DefaultGuard;
    use tracing_subscriber::fmt::MakeWriter;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Buffer {
        type Writer = Self;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Log lines emitted on the current thread while this is alive.
    pub struct LogCapture {
        buffer: Buffer,
        _guard: DefaultGuard,
    }

    impl LogCapture {
        pub fn contents(&self) -> String {
            let bytes = self.buffer.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    pub fn capture() -> LogCapture {
        let buffer = Buffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(buffer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .finish();
        LogCapture {
            buffer,
            _guard: tracing::subscriber::set_default(subscriber),
        }
    }
}
