//! Source-match triage: ignore-list filtering and URL probing.
//!
//! The similarity service reports where the text also occurs; most hits are
//! mirrors of the wiki itself, compatibly licensed reuse, or junk domains.
//! Probing the URL and pattern-matching the body sorts the survivors.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};
use tracing::{debug, warn};

use copytrace_common::{SourceMatch, SourceVerdict};

static CC_LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)under (the terms of the Creative Commons Attribution License)|<a href="https?://creativecommons\.org/licenses/"#).unwrap()
});
static CC_KIND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<a href="https?://creativecommons\.org/licenses/(.+?)/"#).unwrap()
});
static DEAD_DOMAIN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)domain is for sale|buy this domain|get your domain name").unwrap()
});
static ANCHOR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<a [^>]*>").unwrap());
static HTML_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)<html").unwrap());

/// Domains never worth reporting even when the service matches them.
/// A configured ignore-list page replaces this default.
pub fn default_ignore_list() -> Vec<Regex> {
    [r"\.wikipedia\.org", r"\.wikisource\.org", r"lrd\.yahooapis\.com"]
        .iter()
        .map(|p| Regex::new(p).unwrap())
        .collect()
}

/// Parse an ignore-list page: first line is a header, `#` and `==` start
/// comments, every remaining line is one regex. Broken patterns are logged
/// and skipped, never fatal.
pub fn parse_ignore_list(content: &str) -> Vec<Regex> {
    static COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(#|==).*$").unwrap());
    content
        .lines()
        .skip(1)
        .filter_map(|line| {
            let line = COMMENT_RE.replace(line, "").trim().to_string();
            if line.is_empty() {
                return None;
            }
            match Regex::new(&line) {
                Ok(re) => Some(re),
                Err(e) => {
                    warn!(pattern = %line, error = %e, "skipping broken ignore-list pattern");
                    None
                }
            }
        })
        .collect()
}

pub struct SourceClassifier {
    http: reqwest::Client,
    ignore_list: Vec<Regex>,
}

impl SourceClassifier {
    pub fn new(ignore_list: Vec<Regex>) -> Self {
        Self {
            http: reqwest::Client::new(),
            ignore_list,
        }
    }

    pub fn is_ignored(&self, url: &str) -> bool {
        self.ignore_list.iter().any(|re| re.is_match(url))
    }

    /// Probe one source and classify it. `None` means the source should not
    /// appear in the report at all.
    pub async fn classify(
        &self,
        source: &SourceMatch,
        article_title: &str,
        addition: &str,
    ) -> Option<SourceVerdict> {
        // The editor already cited this URL in the text they added.
        if addition
            .to_lowercase()
            .contains(&source.url.to_lowercase())
        {
            return Some(SourceVerdict::Cited);
        }

        let response = match self.http.get(&source.url).send().await {
            Ok(response) => response,
            Err(e) if e.is_connect() => {
                debug!(url = %source.url, "source unreachable, dropping");
                return None;
            }
            Err(e) => {
                // Half-working sites still get reported; humans can judge.
                debug!(url = %source.url, error = %e, "source probe failed, keeping");
                return Some(SourceVerdict::Unreachable);
            }
        };

        let status = response.status().as_u16();
        if matches!(status, 403 | 404 | 500) {
            return None;
        }
        if status != 200 {
            return Some(SourceVerdict::Unverified);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(_) => return Some(SourceVerdict::Unreachable),
        };

        if mirror_regex(article_title).is_match(&body) {
            return Some(SourceVerdict::LikelyMirror);
        }
        if CC_LINK_RE.is_match(&body) {
            let kind = CC_KIND_RE
                .captures(&body)
                .map(|c| c[1].to_uppercase());
            return Some(SourceVerdict::CcLicensed(kind));
        }
        if body.len() < 5
            || DEAD_DOMAIN_RE.is_match(&body)
            || (HTML_OPEN_RE.is_match(&body) && ANCHOR_RE.find_iter(&body).count() < 10)
        {
            debug!(url = %source.url, "low quality site, dropping");
            return None;
        }
        Some(SourceVerdict::Unverified)
    }
}

/// Matches the boilerplate wiki mirrors carry: a link back to the article
/// (spaces and underscores interchangeable) or standard attribution wording.
fn mirror_regex(article_title: &str) -> Regex {
    let title = regex::escape(article_title)
        .replace("\\ ", "[ _]")
        .replace('_', "[ _]");
    RegexBuilder::new(&format!(
        r"wikipedia\.org/w(iki/|/index\.php\?title=)({title})|material from the Wikipedia article|From Wikipedia|source: wikipedia"
    ))
    .case_insensitive(true)
    .build()
    // regex::escape keeps the title inert, so only pathological sizes fail
    .unwrap_or_else(|_| Regex::new(r"material from the Wikipedia article").unwrap())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ignore_list_parses_patterns_and_skips_comments() {
        let page = "Mirror blacklist, one regex per line\n\
                    \\.wikipedia\\.org  # the wiki itself\n\
                    == old section ==\n\
                    example-mirror\\.com\n\
                    [broken\n";
        let list = parse_ignore_list(page);
        assert_eq!(list.len(), 2);
        assert!(list[0].is_match("https://en.wikipedia.org/wiki/X"));
        assert!(list[1].is_match("http://example-mirror.com/page"));
    }

    #[test]
    fn default_list_ignores_the_wiki_itself() {
        let classifier = SourceClassifier::new(default_ignore_list());
        assert!(classifier.is_ignored("https://en.wikipedia.org/wiki/Sample"));
        assert!(!classifier.is_ignored("https://example.com/article"));
    }

    #[test]
    fn mirror_regex_tolerates_spaces_and_underscores() {
        let re = mirror_regex("Sample Article");
        assert!(re.is_match("see wikipedia.org/wiki/Sample_Article for more"));
        assert!(re.is_match("see wikipedia.org/wiki/Sample Article for more"));
        assert!(re.is_match("This uses material from the Wikipedia article"));
        assert!(!re.is_match("an unrelated page about samples"));
    }

    #[tokio::test]
    async fn cited_urls_never_probe() {
        let classifier = SourceClassifier::new(Vec::new());
        let source = SourceMatch {
            collection: "Internet".to_string(),
            percent: 80,
            word_count: 400,
            // port 9 is discard; a probe would hang or fail
            url: "http://127.0.0.1:9/cited".to_string(),
        };
        let addition = "As described at http://127.0.0.1:9/cited the process is long.";
        let verdict = classifier
            .classify(&source, "Sample", addition)
            .await
            .unwrap();
        assert_eq!(verdict, SourceVerdict::Cited);
    }
}
