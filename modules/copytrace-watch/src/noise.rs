//! Suppression of additions that are not genuinely new prose: relocated
//! text, reverted contributions, short quotations, and bare non-prose lines.
//!
//! The wiki-backed checks are best effort. Any error while checking is
//! swallowed and treated as "not noise": a false positive report costs a
//! human a glance, a crashed batch costs every pending candidate.

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use copytrace_common::{Candidate, Locale, Tuning};

use crate::diff::longest_common_run;
use crate::normalize::{normalize, word_count};
use crate::traits::WikiStore;

static BARE_FACTS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\S+(\s|$)){1,4}$").unwrap());
static SHORT_QUOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""[^"\n]*"[ ,.;:<{]"#).unwrap());
static COMMENT_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[(.+?)\]\]").unwrap());

/// What became of an addition after suppression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refined {
    Accepted(String),
    /// Too little text left to be worth analyzing.
    TooSmall,
    /// The contribution was undone again; analyzing it would only produce
    /// stale matches.
    Reverted,
}

pub struct NoiseSuppressor<'a> {
    store: &'a dyn WikiStore,
    locale: &'static Locale,
    tuning: &'a Tuning,
}

impl<'a> NoiseSuppressor<'a> {
    pub fn new(store: &'a dyn WikiStore, locale: &'static Locale, tuning: &'a Tuning) -> Self {
        Self {
            store,
            locale,
            tuning,
        }
    }

    /// Run every check against `addition` (already normalized and diffed
    /// out of the candidate's revisions). `old_normalized` is the
    /// normalized text of the pre-edit revision.
    pub async fn refine(
        &self,
        candidate: &Candidate,
        addition: String,
        old_normalized: &str,
    ) -> Refined {
        let mut text = drop_non_prose_lines(&addition);

        if text.chars().count() >= self.tuning.min_addition_chars {
            text = self.drop_moved_content(candidate, text).await;
        }

        text = drop_old_sentences(&text, old_normalized);
        text = strip_short_quotes(&text, self.tuning.quote_words);

        // Re-normalize: suppression can splice lines back together and
        // expose markup the first pass left alone.
        let text = normalize(
            &text,
            self.tuning.quote_words,
            self.tuning.max_template_passes,
        );

        if text.chars().count() < self.tuning.min_addition_chars
            || word_count(&text) <= self.tuning.min_addition_words
        {
            return Refined::TooSmall;
        }

        // Creations have nothing to be reverted back to.
        if candidate.old_rev != 0 && self.was_reverted(candidate, &text).await {
            return Refined::Reverted;
        }

        Refined::Accepted(text)
    }

    /// Remove lines that already exist in the revisions just before the
    /// edit, or in any page the edit comment names: text that moved, not
    /// text that was written.
    async fn drop_moved_content(&self, candidate: &Candidate, addition: String) -> String {
        let mut text = addition;

        if candidate.old_rev != 0 {
            match self
                .store
                .history(
                    &candidate.title,
                    self.tuning.prior_revisions_checked + 1,
                    Some(candidate.old_rev),
                    true,
                )
                .await
            {
                Ok(revisions) => {
                    for (info, content) in revisions {
                        if info.rev_id >= candidate.old_rev {
                            continue;
                        }
                        if let Some(content) = content {
                            let prior = normalize(
                                &content,
                                self.tuning.quote_words,
                                self.tuning.max_template_passes,
                            );
                            text = drop_lines_contained_in(&text, &prior);
                        }
                    }
                }
                Err(e) => debug!(
                    title = %candidate.title,
                    error = %e,
                    "could not load prior revisions, keeping addition as-is"
                ),
            }
        }

        if text.chars().count() < self.tuning.min_addition_chars {
            return text;
        }

        let mentioned: Vec<String> = COMMENT_LINK_RE
            .captures_iter(&candidate.comment)
            .map(|c| c[1].to_string())
            .collect();
        for title in mentioned {
            match self
                .store
                .history(
                    &title,
                    self.tuning.comment_page_revisions_checked,
                    None,
                    true,
                )
                .await
            {
                Ok(revisions) => {
                    for (_, content) in revisions {
                        if let Some(content) = content {
                            let other = normalize(
                                &content,
                                self.tuning.quote_words,
                                self.tuning.max_template_passes,
                            );
                            text = drop_lines_contained_in(&text, &other);
                        }
                    }
                }
                Err(e) => debug!(page = %title, error = %e, "could not load mentioned page"),
            }
        }
        text
    }

    /// Two independent revert signals, both fail-open.
    async fn was_reverted(&self, candidate: &Candidate, addition: &str) -> bool {
        // (a) how much of the addition survives in the live text
        match self.store.current_text(&candidate.title).await {
            Ok(current) => {
                let current = normalize(
                    &current,
                    self.tuning.quote_words,
                    self.tuning.max_template_passes,
                );
                let run = longest_common_run(addition, &current);
                let total = addition.chars().count();
                if total > 0 && run as f64 / total as f64 > self.tuning.revert_overlap_ratio {
                    debug!(title = %candidate.title, run, total, "revert overlap hit");
                    return true;
                }
            }
            Err(e) => warn!(title = %candidate.title, error = %e, "revert text check failed"),
        }

        // (b) a later edit summary that explicitly undoes this revision
        let rollback_re = match self
            .locale
            .rollback_regex(&candidate.editor, candidate.new_rev)
        {
            Ok(re) => re,
            Err(e) => {
                warn!(error = %e, "broken rollback pattern, skipping summary scan");
                return false;
            }
        };
        match self.store.history(&candidate.title, 30, None, false).await {
            Ok(revisions) => revisions.iter().any(|(info, _)| {
                info.comment.contains(&candidate.editor) && rollback_re.is_match(&info.comment)
            }),
            Err(e) => {
                warn!(title = %candidate.title, error = %e, "revert summary scan failed");
                false
            }
        }
    }
}

/// Drop lines with fewer than two words or matching the bare-facts shape
/// (a handful of short tokens, typical of list rows and infobox spill).
fn drop_non_prose_lines(text: &str) -> String {
    text.lines()
        .filter(|line| {
            let stripped = line.trim_matches(|c| c == '*' || c == ' ' || c == '|');
            word_count(stripped) >= 2 && !BARE_FACTS_RE.is_match(stripped)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn drop_lines_contained_in(text: &str, haystack: &str) -> String {
    text.lines()
        .filter(|line| !haystack.contains(*line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove sentences that already existed before the edit.
fn drop_old_sentences(text: &str, old_normalized: &str) -> String {
    if old_normalized.is_empty() {
        return text.to_string();
    }
    text.split(". ")
        .filter(|sentence| !old_normalized.contains(*sentence))
        .collect::<Vec<_>>()
        .join(". ")
}

/// Quotations below the word threshold are noise; longer ones are left for
/// the quote-aware classification downstream.
fn strip_short_quotes(text: &str, quote_words: usize) -> String {
    let mut out = text.to_string();
    let spans: Vec<(usize, usize)> = SHORT_QUOTE_RE
        .find_iter(&out)
        .filter(|m| word_count(m.as_str()) < quote_words)
        .map(|m| (m.start(), m.end()))
        .collect();
    for (start, end) in spans.into_iter().rev() {
        out.replace_range(start..end, "");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_prose_lines_are_dropped() {
        let text = "A real sentence with several words in it\nword\n* item two\n|cell|";
        let kept = drop_non_prose_lines(text);
        assert_eq!(kept, "A real sentence with several words in it");
    }

    #[test]
    fn bare_fact_rows_are_dropped() {
        let text = "1901 population 4512\nThis line is long enough to count as actual prose text";
        let kept = drop_non_prose_lines(text);
        assert!(!kept.contains("1901"));
        assert!(kept.contains("actual prose"));
    }

    #[test]
    fn short_quotes_are_stripped() {
        let text = "He said \"a short quote\" and moved on.";
        let out = strip_short_quotes(text, 50);
        assert!(!out.contains("short quote"));
        assert!(out.contains("moved on"));
    }

    #[test]
    fn long_quotes_survive() {
        let quote = format!("\"{}\" ", "word ".repeat(60).trim_end());
        let text = format!("Intro {quote}outro");
        let out = strip_short_quotes(&text, 50);
        assert!(out.contains("word word"));
    }

    #[test]
    fn sentences_present_in_old_text_are_dropped() {
        let old = "The dog ran. The cat slept.";
        let added = "The dog ran. A brand new observation.";
        assert_eq!(drop_old_sentences(added, old), "A brand new observation.");
    }

    #[test]
    fn moved_lines_are_filtered_against_haystack() {
        let text = "kept line that is new\nmoved line from before";
        let haystack = "some prose with the moved line from before inside it";
        assert_eq!(drop_lines_contained_in(text, haystack), "kept line that is new");
    }
}
