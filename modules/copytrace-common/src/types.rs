use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// --- Change feed ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Edit,
    New,
    Log,
    Categorize,
}

impl std::fmt::Display for ChangeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeType::Edit => write!(f, "edit"),
            ChangeType::New => write!(f, "new"),
            ChangeType::Log => write!(f, "log"),
            ChangeType::Categorize => write!(f, "categorize"),
        }
    }
}

/// One raw notification from the recent-changes feed. Immutable once parsed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub title: String,
    pub namespace: i64,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    #[serde(default)]
    pub is_bot: bool,
    pub editor: String,
    #[serde(default)]
    pub comment: String,
    /// 0 for page creations.
    #[serde(default)]
    pub old_rev: u64,
    pub new_rev: u64,
    #[serde(default)]
    pub byte_delta: i64,
    pub timestamp: DateTime<Utc>,
}

// --- Pipeline ---

/// A change that passed filtering, enriched with both revision texts.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub title: String,
    pub namespace: i64,
    pub editor: String,
    pub comment: String,
    pub old_rev: u64,
    pub new_rev: u64,
    pub old_text: String,
    pub new_text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Ready,
    Failed,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Pending => write!(f, "pending"),
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One external-service submission. Exactly one per dispatched candidate.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    pub job_id: String,
    pub candidate: Candidate,
    /// The normalized addition that was submitted.
    pub addition: String,
    pub status: JobStatus,
}

// --- Results ---

/// One candidate source returned by the similarity service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceMatch {
    pub collection: String,
    pub percent: u32,
    pub word_count: u32,
    pub url: String,
}

/// Verdict from probing a source URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceVerdict {
    /// The source URL already appears in the added text.
    Cited,
    /// The source page references the wiki article it supposedly copies.
    LikelyMirror,
    /// The source publishes under a Creative Commons license.
    CcLicensed(Option<String>),
    /// Could not reach the source; kept with a caveat.
    Unreachable,
    /// Nothing notable about the source.
    Unverified,
}

#[derive(Debug, Clone)]
pub struct ClassifiedSource {
    pub source: SourceMatch,
    pub verdict: SourceVerdict,
}

/// Final rendered record for one resolved candidate.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub title: String,
    pub namespace: i64,
    pub editor: String,
    pub new_rev: u64,
    pub old_rev: u64,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
    /// Service-side report part id, used for the similarity-report link.
    pub report_id: String,
    pub sources: Vec<ClassifiedSource>,
}

// --- Revision history (wiki read interface) ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevisionInfo {
    pub rev_id: u64,
    pub editor: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn change_event_parses_feed_json() {
        let raw = r#"{
            "title": "Sample Article",
            "namespace": 0,
            "type": "edit",
            "is_bot": false,
            "editor": "Example",
            "comment": "added history section",
            "old_rev": 100,
            "new_rev": 101,
            "byte_delta": 640,
            "timestamp": "2026-03-01T12:00:00Z"
        }"#;
        let event: ChangeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.change_type, ChangeType::Edit);
        assert_eq!(event.old_rev, 100);
        assert_eq!(event.byte_delta, 640);
    }

    #[test]
    fn creation_defaults_old_rev_to_zero() {
        let raw = r#"{
            "title": "New Page",
            "namespace": 0,
            "type": "new",
            "editor": "Example",
            "new_rev": 55,
            "timestamp": "2026-03-01T12:00:00Z"
        }"#;
        let event: ChangeEvent = serde_json::from_str(raw).unwrap();
        assert_eq!(event.old_rev, 0);
        assert!(!event.is_bot);
    }
}
