use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle of one submitted document on the service side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionState {
    Pending,
    Ready,
    Failed,
}

/// One candidate source the service matched against a submission.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub url: String,
    pub percent: u32,
    pub word_count: u32,
    pub collection: String,
}

/// Sources for a finished submission, with the service-side report id
/// needed to link back to the full similarity report.
#[derive(Debug, Clone)]
pub struct SubmissionReport {
    pub report_id: String,
    pub sources: Vec<SourceRecord>,
}

/// Seam between the pipeline and whatever similarity backend is configured.
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait SimilarityService: Send + Sync {
    /// Submit `text` for analysis under a human-readable `label`.
    /// Returns the service-assigned job id.
    async fn submit(&self, text: &str, label: &str) -> Result<String>;

    /// Current processing state of a submitted job.
    async fn status(&self, job_id: &str) -> Result<SubmissionState>;

    /// Matched sources for a job that reported `Ready`.
    async fn sources(&self, job_id: &str) -> Result<SubmissionReport>;

    /// Drop the current session; the next call re-authenticates.
    async fn reset_session(&self);
}
