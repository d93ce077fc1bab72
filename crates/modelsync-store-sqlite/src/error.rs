use modelsync_core::{SchemaError, TranscribeError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Storage(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),
    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Data source is closed")]
    Closed,
    #[error("Migration failed: {0}")]
    Migration(String),
}

pub type StoreResult<T> = Result<T, StoreError>;
