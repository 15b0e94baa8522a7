use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Wiki platform
    pub wiki_api_url: String,
    pub stream_url: String,
    /// OAuth bearer token for report writes. Reads work anonymously.
    pub wiki_oauth_token: Option<String>,

    // Similarity service
    pub similarity_api_url: String,
    pub similarity_username: String,
    pub similarity_password: String,
    /// Service-side folder the submissions are filed under.
    pub similarity_folder: String,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            wiki_api_url: env::var("WIKI_API_URL")
                .unwrap_or_else(|_| "https://en.wikipedia.org/w/api.php".to_string()),
            stream_url: env::var("WIKI_STREAM_URL").unwrap_or_else(|_| {
                "https://stream.wikimedia.org/v2/stream/recentchange".to_string()
            }),
            wiki_oauth_token: env::var("WIKI_OAUTH_TOKEN").ok(),
            similarity_api_url: env::var("SIMILARITY_API_URL")
                .unwrap_or_else(|_| "https://api.ithenticate.com/rpc".to_string()),
            similarity_username: required_env("SIMILARITY_USERNAME"),
            similarity_password: required_env("SIMILARITY_PASSWORD"),
            similarity_folder: env::var("SIMILARITY_FOLDER")
                .unwrap_or_else(|_| "Wikipedia".to_string()),
        }
    }

    /// Debug-mode config: no similarity credentials needed because nothing
    /// is ever submitted.
    pub fn debug_from_env() -> Self {
        Self {
            wiki_api_url: env::var("WIKI_API_URL")
                .unwrap_or_else(|_| "https://en.wikipedia.org/w/api.php".to_string()),
            stream_url: env::var("WIKI_STREAM_URL").unwrap_or_else(|_| {
                "https://stream.wikimedia.org/v2/stream/recentchange".to_string()
            }),
            wiki_oauth_token: env::var("WIKI_OAUTH_TOKEN").ok(),
            similarity_api_url: env::var("SIMILARITY_API_URL")
                .unwrap_or_else(|_| "https://api.ithenticate.com/rpc".to_string()),
            similarity_username: String::new(),
            similarity_password: String::new(),
            similarity_folder: env::var("SIMILARITY_FOLDER")
                .unwrap_or_else(|_| "Wikipedia".to_string()),
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

/// Empirically tuned thresholds. Values carry over from years of production
/// use; override individual fields rather than guessing new ones.
#[derive(Debug, Clone)]
pub struct Tuning {
    /// Minimum added-text length (chars) worth analyzing.
    pub min_addition_chars: usize,
    /// Minimum added-text length in words after all suppression.
    pub min_addition_words: usize,
    /// Similarity percentage below which a source is discarded.
    pub min_source_percent: u32,
    /// Quotations shorter than this many words are stripped as noise.
    pub quote_words: usize,
    /// Candidates buffered before a batch is dispatched (live mode).
    pub batch_threshold: usize,
    /// Seconds between job-status polls.
    pub poll_interval_secs: u64,
    /// Seconds of feed silence before a reconnect.
    pub stale_after_secs: u64,
    /// Reconnects tolerated before giving up on the feed.
    pub max_restarts: u32,
    /// Longest-common-substring coverage above which an addition is
    /// considered already reverted.
    pub revert_overlap_ratio: f64,
    /// How many revisions before the edit to scan for moved content.
    pub prior_revisions_checked: usize,
    /// Revisions loaded from pages named in the edit comment.
    pub comment_page_revisions_checked: usize,
    /// Sources kept per report entry.
    pub max_report_sources: usize,
    /// Upper bound on innermost-template removal passes.
    pub max_template_passes: usize,
    /// Write-conflict retries when merging the report page.
    pub report_merge_retries: usize,
    /// Reported batches between similarity-service session resets.
    pub relogin_every: u32,
    /// Overall live-run deadline in seconds.
    pub run_timeout_secs: u64,
    /// Capacity of the stream-to-pipeline event buffer.
    pub event_buffer: usize,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            min_addition_chars: 500,
            min_addition_words: 20,
            min_source_percent: 50,
            quote_words: 50,
            batch_threshold: 10,
            poll_interval_secs: 45,
            stale_after_secs: 60,
            max_restarts: 5,
            revert_overlap_ratio: 0.8,
            prior_revisions_checked: 3,
            comment_page_revisions_checked: 2,
            max_report_sources: 3,
            max_template_passes: 10,
            report_merge_retries: 3,
            relogin_every: 100,
            run_timeout_secs: 4 * 3600,
            event_buffer: 256,
        }
    }
}
