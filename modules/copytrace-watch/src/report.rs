//! Report rendering and conflict-safe merging into the persisted report
//! page. The page is shared with human reviewers (and potentially other
//! writers), so every write goes read → splice → write-with-version and
//! retries on conflict.

use anyhow::Result;
use tracing::{info, warn};

use copytrace_common::{ClassifiedSource, Locale, ReportEntry, SourceVerdict, Tuning};
use mediawiki_client::WriteOutcome;

use crate::stats::WatchStats;
use crate::traits::WikiStore;

/// Marks the start of the entry list on the report page; new rows are
/// spliced in right before it.
pub const ROW_SEPARATOR: &str = "\n{{copytrace row";

/// Redirector that resolves a service report id to its view URL.
const REPORT_VIEW_URL: &str = "//tools.wmflabs.org/copytrace/report?rid=";

fn hint(verdict: &SourceVerdict) -> String {
    match verdict {
        SourceVerdict::Cited => r#"<span class="success">citation</span>"#.to_string(),
        SourceVerdict::LikelyMirror => r#"<span class="success">Mirror?</span>"#.to_string(),
        SourceVerdict::CcLicensed(Some(kind)) => {
            format!(r#"<span class="success">(CC-{kind})</span>"#)
        }
        SourceVerdict::CcLicensed(None) => {
            r#"<span class="success">(CC) (is it NC?)</span>"#.to_string()
        }
        SourceVerdict::Unreachable | SourceVerdict::Unverified => String::new(),
    }
}

fn render_source(source: &ClassifiedSource, new_rev: u64) -> String {
    let url = &source.source.url;
    let display: String = url.chars().take(80).collect();
    let compare = format!(
        "//tools.wmflabs.org/copyvios?lang={{{{subst:CONTENTLANG}}}}&project={{{{lc:{{{{ns:Project}}}}}}}}&title=&oldid={new_rev}&action=compare&url={url}"
    );
    format!(
        "* {} {:>3}% {} words at [{} {}] {}<div class=\"mw-ui-button\">[{} Compare]</div>",
        source.source.collection.chars().next().unwrap_or('?'),
        source.source.percent,
        source.source.word_count,
        url,
        display,
        hint(&source.verdict),
        compare,
    )
}

/// The `details` cell: report link plus one line per surviving source.
pub fn render_sources(entry: &ReportEntry) -> String {
    let lines: Vec<String> = entry
        .sources
        .iter()
        .map(|s| render_source(s, entry.new_rev))
        .collect();
    format!(
        "<div class=\"mw-ui-button\">[{}{} report]</div>\n{}",
        REPORT_VIEW_URL,
        entry.report_id,
        lines.join("\n")
    )
}

pub fn render_row(entry: &ReportEntry) -> String {
    format!(
        "\n{{{{copytrace row | article = {title} | tags = {tags} | timestamp = {timestamp} | diff = {new_rev} | oldid = {old_rev} | user = {editor} | details =\n{details}\n| status =\n}}}}\n== ==\n",
        title = entry.title,
        tags = entry.tags.join(";"),
        timestamp = entry.timestamp.format("%Y-%m-%dT%H:%M:%SZ"),
        new_rev = entry.new_rev,
        old_rev = entry.old_rev,
        editor = entry.editor,
        details = render_sources(entry),
    )
}

/// Splice `rows` into the current page content at the row separator, or
/// start a fresh table when the page has none yet.
pub fn merge_rows(current: &str, rows: &str, locale: &Locale) -> String {
    match current.split_once(ROW_SEPARATOR) {
        Some((head, tail)) => format!("{head}{rows}{ROW_SEPARATOR}{tail}"),
        None => {
            let table = format!(
                "\n{{| class=\"mw-datatable sortable\" style=\"width: 90%;margin:auto;\"\n\
                 ! style=\"width:15%\" | {} !! style=\"width:10%\" | {} !! style=\"width:50px\" | {} !! {} !! style=\"width:150px;\" |{}\n\
                 |- valign=\"top\"\n{}\n|}}\n",
                locale.table_title,
                locale.table_diff,
                locale.table_editor,
                locale.table_source,
                locale.table_status,
                rows,
            );
            format!("{current}{table}")
        }
    }
}

pub struct ReportAggregator<'a> {
    store: &'a dyn WikiStore,
    locale: &'static Locale,
    tuning: &'a Tuning,
    report_page: Option<String>,
}

impl<'a> ReportAggregator<'a> {
    pub fn new(
        store: &'a dyn WikiStore,
        locale: &'static Locale,
        tuning: &'a Tuning,
        report_page: Option<String>,
    ) -> Self {
        Self {
            store,
            locale,
            tuning,
            report_page,
        }
    }

    /// Merge entries into the report page. Entries with no surviving source
    /// are dropped here. Returns how many rows were actually written;
    /// exhausted conflict retries warn and write nothing.
    pub async fn publish(&self, entries: &[ReportEntry], stats: &mut WatchStats) -> Result<usize> {
        let reportable: Vec<&ReportEntry> =
            entries.iter().filter(|e| !e.sources.is_empty()).collect();
        if reportable.is_empty() {
            info!("no violations found");
            return Ok(0);
        }
        let rows: String = reportable.iter().map(|e| render_row(e)).collect();
        info!(count = reportable.len(), "violations found");

        let Some(page) = &self.report_page else {
            // console-only runs still show the rendered rows
            info!("{rows}");
            return Ok(reportable.len());
        };

        for attempt in 0..=self.tuning.report_merge_retries {
            let (content, version) = self.store.read_page(page).await?;
            let merged = merge_rows(&content, &rows, self.locale);
            match self
                .store
                .write_page(page, &merged, self.locale.update_summary, &version)
                .await?
            {
                WriteOutcome::Saved => {
                    stats.entries_written += reportable.len() as u64;
                    return Ok(reportable.len());
                }
                WriteOutcome::Conflict => {
                    stats.report_conflicts += 1;
                    warn!(page = %page, attempt, "report page changed underneath us, re-merging");
                }
            }
        }
        warn!(page = %page, "giving up on report merge after repeated conflicts");
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use copytrace_common::SourceMatch;

    fn entry() -> ReportEntry {
        ReportEntry {
            title: "Sample Article".to_string(),
            namespace: 0,
            editor: "Example".to_string(),
            new_rev: 101,
            old_rev: 100,
            timestamp: Utc::now(),
            tags: vec!["WikiProject Medicine".to_string()],
            report_id: "700".to_string(),
            sources: vec![ClassifiedSource {
                source: SourceMatch {
                    collection: "Internet".to_string(),
                    percent: 91,
                    word_count: 320,
                    url: "https://example.com/copied".to_string(),
                },
                verdict: SourceVerdict::Unverified,
            }],
        }
    }

    #[test]
    fn row_carries_revisions_editor_and_source() {
        let row = render_row(&entry());
        assert!(row.starts_with(ROW_SEPARATOR));
        assert!(row.contains("diff = 101"));
        assert!(row.contains("oldid = 100"));
        assert!(row.contains("user = Example"));
        assert!(row.contains("https://example.com/copied"));
        assert!(row.contains("rid=700"));
        assert!(row.contains("WikiProject Medicine"));
    }

    #[test]
    fn merge_splices_before_existing_rows() {
        let locale = Locale::for_code("en");
        let existing = merge_rows("intro text", &render_row(&entry()), locale);
        assert!(existing.contains("mw-datatable"));

        let mut newer = entry();
        newer.new_rev = 202;
        newer.old_rev = 201;
        let merged = merge_rows(&existing, &render_row(&newer), locale);

        assert!(merged.contains("diff = 202"));
        assert!(merged.contains("diff = 101"));
        // newest rows come first
        let pos_new = merged.find("diff = 202").unwrap();
        let pos_old = merged.find("diff = 101").unwrap();
        assert!(pos_new < pos_old);
        // still exactly one table skeleton
        assert_eq!(merged.matches("mw-datatable").count(), 1);
    }

    #[test]
    fn fresh_page_gets_table_with_locale_headers() {
        let locale = Locale::for_code("fr");
        let merged = merge_rows("", &render_row(&entry()), locale);
        assert!(merged.contains("Titre"));
        assert!(merged.contains(ROW_SEPARATOR));
    }
}
