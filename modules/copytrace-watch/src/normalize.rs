//! Wikitext-to-prose normalization.
//!
//! Applied to both revisions before diffing and re-applied to the extracted
//! addition after noise suppression, so the whole rule set must be
//! idempotent. Rules run in a fixed order; each is total and never fails.

use std::sync::LazyLock;

use regex::Regex;

static REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)<ref(?:\s[^>]*)?>(.*?)</ref>").unwrap());
static HTML_COMMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static HTML_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"</?[A-Za-z][^<>\n]*>").unwrap());
static CATEGORY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\[\[Category:.+?\]\]").unwrap());
static PIPED_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[\[[^\[\]|]+\|([^\[\]]+)\]\]").unwrap());
static BARE_LINK_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[\[(.+?)\]\]").unwrap());
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n==+[ \t]*([^=\n]+?)[ \t]*==+").unwrap());
static BOLD_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"'''([^']+)'''").unwrap());
static ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"''([^']+)''").unwrap());
static CELL_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(align|class|style)\s*=\s*("[^"]*"|[^"\s]\S* )"#).unwrap());
static TABLE_ROW_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\|-.{0,20}").unwrap());
static TABLE_EDGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n\|\}|\n\{\|[^\n]*").unwrap());
static TABLE_HEADER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n![^|\n]+\|").unwrap());
static PARAM_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\s*\| *\w+ *= *("?\#?[A-Za-z0-9]+"?|\n)"#).unwrap());
static PIPE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:\| *)+").unwrap());
static PIPE_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\n\| *").unwrap());
static FILE_REF_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(File|Image):[^.\n]+?\.(jpg|jpeg|png|pdf|svg|gif)").unwrap());
static TEMPLATE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{\{[^{}]*\}\}").unwrap());
static EXTERNAL_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[https?:[^\]\n]*\]").unwrap());

/// Strip structural wiki markup and markup-embedded noise, keeping prose.
///
/// `quote_words`: citation bodies shorter than this many words are dropped
/// outright (they are quoted source material, not the editor's own text).
/// `max_template_passes` bounds the innermost-template removal loop; markup
/// still left when the bound is hit stays in place.
pub fn normalize(text: &str, quote_words: usize, max_template_passes: usize) -> String {
    if text.is_empty() {
        return String::new();
    }

    // Short citation bodies go first, while the <ref> tags still delimit them.
    let mut out = String::from(text);
    let short_refs: Vec<(usize, usize)> = REF_RE
        .captures_iter(&out)
        .filter(|c| word_count(c.get(1).map_or("", |m| m.as_str())) < quote_words)
        .map(|c| {
            let m = c.get(0).unwrap();
            (m.start(), m.end())
        })
        .collect();
    for (start, end) in short_refs.into_iter().rev() {
        out.replace_range(start..end, "");
    }

    let out = HTML_COMMENT_RE.replace_all(&out, "");
    let out = HTML_TAG_RE.replace_all(&out, "");
    let out = CATEGORY_RE.replace_all(&out, "");
    let out = PIPED_LINK_RE.replace_all(&out, "$1");
    let out = BARE_LINK_RE.replace_all(&out, "$1");
    let out = HEADING_RE.replace_all(&out, "\n$1");
    let out = BOLD_RE.replace_all(&out, "$1");
    let out = ITALIC_RE.replace_all(&out, "$1");
    let out = CELL_ATTR_RE.replace_all(&out, "");
    let out = TABLE_ROW_RE.replace_all(&out, "");
    let out = TABLE_EDGE_RE.replace_all(&out, "");
    let out = TABLE_HEADER_RE.replace_all(&out, "\n");
    let out = PARAM_LINE_RE.replace_all(&out, "");
    let out = PIPE_RUN_RE.replace_all(&out, "|");
    let out = PIPE_PREFIX_RE.replace_all(&out, "\n");
    let mut out = FILE_REF_RE.replace_all(&out, "").into_owned();

    // Innermost templates first; nested templates need repeated passes.
    for _ in 0..max_template_passes {
        let next = TEMPLATE_RE.replace_all(&out, "");
        if next == out {
            break;
        }
        out = next.into_owned();
    }

    EXTERNAL_LINK_RE.replace_all(&out, "").into_owned()
}

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE_WORDS: usize = 50;
    const TEMPLATE_PASSES: usize = 10;

    fn norm(text: &str) -> String {
        normalize(text, QUOTE_WORDS, TEMPLATE_PASSES)
    }

    #[test]
    fn strips_short_ref_bodies() {
        let text = "Prose here.<ref>Short quoted source</ref> More prose.";
        assert_eq!(norm(text), "Prose here. More prose.");
    }

    #[test]
    fn keeps_long_ref_bodies_without_tags() {
        let body = "word ".repeat(60);
        let text = format!("Prose.<ref name=\"a\">{body}</ref>");
        let result = norm(&text);
        assert!(result.contains("word word"));
        assert!(!result.contains("<ref"));
    }

    #[test]
    fn collapses_links() {
        assert_eq!(norm("See [[target|label]] and [[Plain]]."), "See label and Plain.");
    }

    #[test]
    fn strips_categories_headings_emphasis() {
        let text = "\n== History ==\n'''Bold''' and ''italic''.[[Category:Towns]]";
        assert_eq!(norm(text), "\nHistory\nBold and italic.");
    }

    #[test]
    fn removes_nested_templates_to_fixed_point() {
        let text = "Before {{outer|{{inner|x}}|y}} after";
        assert_eq!(norm(text), "Before  after");
    }

    #[test]
    fn unbalanced_templates_do_not_loop() {
        let text = "Broken {{template with no close";
        // Bound hit or fixed point reached; the marker simply stays.
        assert!(norm(text).contains("{{"));
    }

    #[test]
    fn strips_table_markup() {
        let text = "\n{| class=\"wikitable\"\n|- style=x\n! Header |\n| cell = 5\n|}\nProse";
        let result = norm(text);
        assert!(!result.contains("{|"));
        assert!(!result.contains("|}"));
        assert!(!result.contains("wikitable"));
        assert!(result.contains("Prose"));
    }

    #[test]
    fn strips_external_links_and_files() {
        let text = "Cited [http://example.com source] with File:Photo of town.jpg inline.";
        let result = norm(text);
        assert!(!result.contains("http://example.com"));
        assert!(!result.contains(".jpg"));
    }

    #[test]
    fn normalize_is_idempotent() {
        let samples = [
            "Plain prose with no markup at all.",
            "See [[target|label]] and [[Plain]] and {{cite|inner={{x}}}}.",
            "\n== Heading ==\n'''Bold''' text<ref>short</ref> and [http://e.co link].\n",
            "\n{| class=\"wikitable\"\n|-\n! H |\n| v = 3\n|}\ntext [[Category:X]]",
            "Nested {{a|{{b|{{c}}}}}} deep",
            "Broken {{unclosed and | stray pipes ||",
        ];
        for sample in samples {
            let once = norm(sample);
            let twice = norm(&once);
            assert_eq!(once, twice, "not idempotent for: {sample}");
        }
    }
}
