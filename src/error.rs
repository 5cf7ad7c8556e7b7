use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum IngestError {
    #[error("missing config file ratings-ingest.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("feed transport failed: {0}")]
    Transport(String),

    #[error("feed request failed after {attempts} attempts: {cause}")]
    FetchFailed { attempts: u32, cause: String },

    #[error("feed rejected the request with status {status}: {message}")]
    #[diagnostic(help("the server answered, so the request was not retried"))]
    ServerRejection { status: u16, message: String },

    #[error("malformed feed payload: {0}")]
    MalformedPayload(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(
        "persistence failed: {failed_batches} of {total_batches} batches failed, \
         {committed} records committed before failure: {message}"
    )]
    #[diagnostic(help("committed batches are not rolled back; re-running may insert them again"))]
    PersistenceFailure {
        committed: usize,
        failed_batches: usize,
        total_batches: usize,
        message: String,
    },

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl IngestError {
    /// Records durably written before this error ended the run.
    pub fn committed(&self) -> usize {
        match self {
            IngestError::PersistenceFailure { committed, .. } => *committed,
            _ => 0,
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::Transport(_))
    }
}
