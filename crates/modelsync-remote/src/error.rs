use modelsync_core::TranscribeError;
use modelsync_store_sqlite::StoreError;

/// Failure reported by a [`crate::Server`].
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Request error: {0}")]
    Transport(String),
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Parse error: {0}")]
    Payload(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Not configured: {0}")]
    Configuration(String),
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Transcription error: {0}")]
    Transcribe(#[from] TranscribeError),
    #[error("Main context is no longer running")]
    MainContextClosed,
}
