//! Transfer tuning.

use globset::Glob;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const fn default_page_size() -> u32 {
    100
}

const fn default_channel_capacity() -> usize {
    128
}

const fn default_true() -> bool {
    true
}

const fn default_compression_level() -> u32 {
    9
}

fn default_import_glob() -> String {
    String::from("*.json")
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TransferConfig {
    /// Page size for cursor-paginated reads.
    #[serde(default = "default_page_size")]
    pub page_size: u32,

    /// Records buffered between the file reader and the import sender.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Drop unknown record fields instead of skipping the record.
    #[serde(default)]
    pub discard_unknown: bool,

    /// Remove timestamps and etags from exported records.
    #[serde(default = "default_true")]
    pub strip_server_fields: bool,

    /// Gzip level for backups (0-9).
    #[serde(default = "default_compression_level")]
    pub compression_level: u32,

    /// File pattern used when importing from a directory.
    #[serde(default = "default_import_glob")]
    pub import_glob: String,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            channel_capacity: default_channel_capacity(),
            discard_unknown: false,
            strip_server_fields: true,
            compression_level: default_compression_level(),
            import_glob: default_import_glob(),
        }
    }
}

impl TransferConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::invalid("transfer.page_size", "must be positive"));
        }
        if self.channel_capacity == 0 {
            return Err(ConfigError::invalid(
                "transfer.channel_capacity",
                "must be positive",
            ));
        }
        if self.compression_level > 9 {
            return Err(ConfigError::invalid(
                "transfer.compression_level",
                format!("{} is outside 0-9", self.compression_level),
            ));
        }
        Glob::new(&self.import_glob)
            .map_err(|e| ConfigError::invalid("transfer.import_glob", e.to_string()))?;
        Ok(())
    }
}
