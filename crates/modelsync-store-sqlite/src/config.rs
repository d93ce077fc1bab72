use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use modelsync_core::ModelSchema;

/// SQLite journal mode applied when a data source opens.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum JournalMode {
    #[default]
    Wal,
    Delete,
    Truncate,
    Memory,
}

impl JournalMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Wal => "WAL",
            Self::Delete => "DELETE",
            Self::Truncate => "TRUNCATE",
            Self::Memory => "MEMORY",
        }
    }
}

/// Local store configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding one database file per model database name
    pub data_dir: PathBuf,
    /// SQLite busy timeout in milliseconds (default: 5000)
    pub busy_timeout_ms: u64,
    /// Journal mode (default: WAL)
    pub journal_mode: JournalMode,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
            busy_timeout_ms: 5000,
            journal_mode: JournalMode::Wal,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self { data_dir: data_dir.as_ref().to_path_buf(), ..Self::default() }
    }

    #[must_use]
    pub fn database_path(&self, schema: &ModelSchema) -> PathBuf {
        self.data_dir.join(schema.database_name())
    }

    pub(crate) fn pragmas(&self) -> String {
        format!(
            "PRAGMA journal_mode = {};
             PRAGMA busy_timeout = {};",
            self.journal_mode.as_str(),
            self.busy_timeout_ms
        )
    }
}
