use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopytraceError {
    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Feed restarts exhausted after {0} reconnects")]
    RestartsExhausted(u32),

    #[error("Could not load revision {rev} of [[{title}]]: {message}")]
    RevisionLoad {
        title: String,
        rev: u64,
        message: String,
    },

    #[error("Submission rejected: {0}")]
    Submission(String),

    #[error("Service query failed: {0}")]
    ServiceQuery(String),

    #[error("Report page changed since read")]
    ReportConflict,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
