use chrono::{DateTime, Utc};
use serde::Deserialize;

// --- Public domain types ---

#[derive(Debug, Clone)]
pub struct RevisionMeta {
    pub rev_id: u64,
    pub parent_id: u64,
    pub user: String,
    pub comment: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RecentChange {
    pub title: String,
    pub namespace: i64,
    pub change_type: String,
    pub bot: bool,
    pub user: String,
    pub comment: String,
    pub old_rev: u64,
    pub new_rev: u64,
    pub old_len: i64,
    pub new_len: i64,
    pub timestamp: DateTime<Utc>,
}

/// Version token for optimistic-concurrency page writes. Captured on read,
/// handed back on write so the platform can detect intervening edits.
#[derive(Debug, Clone)]
pub struct PageVersion {
    pub base_rev: u64,
    pub base_timestamp: String,
    pub start_timestamp: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Saved,
    /// The page changed between read and write; re-read and merge again.
    Conflict,
}

// --- Wire types (Action API, formatversion=2) ---

#[derive(Debug, Deserialize)]
pub(crate) struct QueryResponse {
    #[serde(default)]
    pub query: Option<QueryBody>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct QueryBody {
    #[serde(default)]
    pub pages: Vec<PageBody>,
    #[serde(default)]
    pub recentchanges: Vec<RecentChangeBody>,
    #[serde(default)]
    pub embeddedin: Vec<TitleBody>,
    #[serde(default)]
    pub tokens: Option<TokensBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct PageBody {
    pub title: String,
    #[serde(default)]
    pub missing: bool,
    #[serde(default)]
    pub revisions: Vec<RevisionBody>,
    #[serde(default)]
    pub links: Vec<TitleBody>,
    #[serde(default)]
    pub templates: Vec<TitleBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RevisionBody {
    #[serde(rename = "revid")]
    pub rev_id: u64,
    #[serde(rename = "parentid", default)]
    pub parent_id: u64,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub comment: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub slots: Option<SlotsBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotsBody {
    pub main: SlotBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SlotBody {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TitleBody {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TokensBody {
    #[serde(rename = "csrftoken")]
    pub csrf_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RecentChangeBody {
    pub title: String,
    pub ns: i64,
    #[serde(rename = "type")]
    pub change_type: String,
    #[serde(default)]
    pub bot: bool,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub comment: String,
    #[serde(rename = "old_revid", default)]
    pub old_revid: u64,
    #[serde(rename = "revid")]
    pub revid: u64,
    #[serde(rename = "oldlen", default)]
    pub oldlen: i64,
    #[serde(rename = "newlen", default)]
    pub newlen: i64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
    pub code: String,
    #[serde(default)]
    pub info: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditResponse {
    #[serde(default)]
    pub edit: Option<EditBody>,
    #[serde(default)]
    pub error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct EditBody {
    pub result: String,
}
