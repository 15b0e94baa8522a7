use thiserror::Error;

pub type Result<T> = std::result::Result<T, SimilarityError>;

#[derive(Debug, Error)]
pub enum SimilarityError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Session error: {0}")]
    Session(String),
}

impl From<reqwest::Error> for SimilarityError {
    fn from(err: reqwest::Error) -> Self {
        SimilarityError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for SimilarityError {
    fn from(err: serde_json::Error) -> Self {
        SimilarityError::Parse(err.to_string())
    }
}
