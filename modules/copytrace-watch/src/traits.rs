//! Seam between the pipeline and the wiki platform. The HTTP client
//! implements this; tests substitute in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use copytrace_common::RevisionInfo;
use mediawiki_client::{MediaWikiClient, PageVersion, RecentChange, WriteOutcome};

#[async_trait]
pub trait WikiStore: Send + Sync {
    /// Full text + metadata for specific revision ids. Revisions the
    /// platform withholds are simply absent from the result.
    async fn revisions_by_id(&self, rev_ids: &[u64]) -> Result<Vec<(RevisionInfo, String)>>;

    /// Current live text of a page; missing pages read as empty.
    async fn current_text(&self, title: &str) -> Result<String>;

    /// Revision history, newest first, optionally bounded at `start_rev`
    /// and optionally carrying full text.
    async fn history(
        &self,
        title: &str,
        limit: usize,
        start_rev: Option<u64>,
        with_content: bool,
    ) -> Result<Vec<(RevisionInfo, Option<String>)>>;

    /// Page content plus the version token for a later conflict-safe write.
    async fn read_page(&self, title: &str) -> Result<(String, PageVersion)>;

    async fn write_page(
        &self,
        title: &str,
        content: &str,
        summary: &str,
        version: &PageVersion,
    ) -> Result<WriteOutcome>;

    async fn page_links(&self, title: &str) -> Result<Vec<String>>;

    /// Transcluded template names, without the namespace prefix.
    async fn templates(&self, title: &str) -> Result<Vec<String>>;

    async fn pages_with_talk_template(&self, template: &str) -> Result<Vec<String>>;

    async fn recent_changes(
        &self,
        since: DateTime<Utc>,
        namespaces: &[i64],
        limit: usize,
    ) -> Result<Vec<RecentChange>>;
}

#[async_trait]
impl WikiStore for MediaWikiClient {
    async fn revisions_by_id(&self, rev_ids: &[u64]) -> Result<Vec<(RevisionInfo, String)>> {
        Ok(MediaWikiClient::revisions_by_id(self, rev_ids)
            .await?
            .into_iter()
            .map(|(meta, content)| (to_revision_info(meta), content))
            .collect())
    }

    async fn current_text(&self, title: &str) -> Result<String> {
        Ok(MediaWikiClient::current_text(self, title).await?)
    }

    async fn history(
        &self,
        title: &str,
        limit: usize,
        start_rev: Option<u64>,
        with_content: bool,
    ) -> Result<Vec<(RevisionInfo, Option<String>)>> {
        Ok(
            MediaWikiClient::history(self, title, limit, start_rev, with_content)
                .await?
                .into_iter()
                .map(|(meta, content)| (to_revision_info(meta), content))
                .collect(),
        )
    }

    async fn read_page(&self, title: &str) -> Result<(String, PageVersion)> {
        Ok(MediaWikiClient::read_page(self, title).await?)
    }

    async fn write_page(
        &self,
        title: &str,
        content: &str,
        summary: &str,
        version: &PageVersion,
    ) -> Result<WriteOutcome> {
        Ok(MediaWikiClient::write_page(self, title, content, summary, version).await?)
    }

    async fn page_links(&self, title: &str) -> Result<Vec<String>> {
        Ok(MediaWikiClient::page_links(self, title).await?)
    }

    async fn templates(&self, title: &str) -> Result<Vec<String>> {
        Ok(MediaWikiClient::templates(self, title).await?)
    }

    async fn pages_with_talk_template(&self, template: &str) -> Result<Vec<String>> {
        Ok(MediaWikiClient::pages_with_talk_template(self, template).await?)
    }

    async fn recent_changes(
        &self,
        since: DateTime<Utc>,
        namespaces: &[i64],
        limit: usize,
    ) -> Result<Vec<RecentChange>> {
        Ok(MediaWikiClient::recent_changes(self, since, namespaces, limit).await?)
    }
}

fn to_revision_info(meta: mediawiki_client::RevisionMeta) -> RevisionInfo {
    RevisionInfo {
        rev_id: meta.rev_id,
        editor: meta.user,
        comment: meta.comment,
        timestamp: meta.timestamp,
    }
}
