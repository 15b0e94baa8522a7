pub mod error;
pub mod types;

pub use error::{MediaWikiError, Result};
pub use types::{PageVersion, RecentChange, RevisionMeta, WriteOutcome};

use chrono::{DateTime, Utc};
use tracing::debug;

use types::{EditResponse, PageBody, QueryResponse};

/// Client for the MediaWiki Action API. Reads are anonymous; writes use an
/// OAuth bearer token when one is configured.
pub struct MediaWikiClient {
    http: reqwest::Client,
    api_url: String,
    oauth_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(api_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url: api_url.to_string(),
            oauth_token: None,
        }
    }

    pub fn with_oauth_token(mut self, token: &str) -> Self {
        self.oauth_token = Some(token.to_string());
        self
    }

    async fn query(&self, params: &[(&str, String)]) -> Result<QueryResponse> {
        let mut request = self.http.get(&self.api_url).query(&[
            ("format", "json"),
            ("formatversion", "2"),
            ("action", "query"),
        ]);
        request = request.query(params);
        if let Some(token) = &self.oauth_token {
            request = request.bearer_auth(token);
        }
        let response: QueryResponse = request.send().await?.json().await?;
        if let Some(error) = response.error {
            return Err(MediaWikiError::Api {
                code: error.code,
                info: error.info,
            });
        }
        Ok(response)
    }

    fn first_page(response: QueryResponse, context: &str) -> Result<PageBody> {
        response
            .query
            .and_then(|q| q.pages.into_iter().next())
            .ok_or_else(|| MediaWikiError::Parse(format!("no page in response for {context}")))
    }

    /// Full text of specific revisions, with editor/comment/timestamp.
    /// Revisions the platform cannot return (deleted, suppressed) are absent.
    pub async fn revisions_by_id(&self, rev_ids: &[u64]) -> Result<Vec<(RevisionMeta, String)>> {
        let revids = rev_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let response = self
            .query(&[
                ("prop", "revisions".to_string()),
                ("revids", revids),
                ("rvprop", "ids|user|comment|timestamp|content".to_string()),
                ("rvslots", "main".to_string()),
            ])
            .await?;

        let mut out = Vec::new();
        for page in response.query.map(|q| q.pages).unwrap_or_default() {
            for rev in page.revisions {
                let content = rev.slots.map(|s| s.main.content).unwrap_or_default();
                out.push((
                    RevisionMeta {
                        rev_id: rev.rev_id,
                        parent_id: rev.parent_id,
                        user: rev.user,
                        comment: rev.comment,
                        timestamp: rev.timestamp,
                    },
                    content,
                ));
            }
        }
        Ok(out)
    }

    /// Current live text of a page. Missing pages read as empty.
    pub async fn current_text(&self, title: &str) -> Result<String> {
        let response = self
            .query(&[
                ("prop", "revisions".to_string()),
                ("titles", title.to_string()),
                ("rvprop", "content".to_string()),
                ("rvslots", "main".to_string()),
                ("rvlimit", "1".to_string()),
            ])
            .await?;
        let page = Self::first_page(response, title)?;
        if page.missing {
            return Ok(String::new());
        }
        Ok(page
            .revisions
            .into_iter()
            .next()
            .and_then(|r| r.slots.map(|s| s.main.content))
            .unwrap_or_default())
    }

    /// Revision history of a page, newest first. `start_rev` bounds the walk
    /// to revisions at or before that id; `with_content` loads full text.
    pub async fn history(
        &self,
        title: &str,
        limit: usize,
        start_rev: Option<u64>,
        with_content: bool,
    ) -> Result<Vec<(RevisionMeta, Option<String>)>> {
        let rvprop = if with_content {
            "ids|user|comment|timestamp|content"
        } else {
            "ids|user|comment|timestamp"
        };
        let mut params = vec![
            ("prop", "revisions".to_string()),
            ("titles", title.to_string()),
            ("rvprop", rvprop.to_string()),
            ("rvslots", "main".to_string()),
            ("rvlimit", limit.to_string()),
            ("rvdir", "older".to_string()),
        ];
        if let Some(start) = start_rev {
            params.push(("rvstartid", start.to_string()));
        }
        let response = self.query(&params).await?;
        let page = Self::first_page(response, title)?;
        if page.missing {
            return Err(MediaWikiError::Missing(title.to_string()));
        }
        Ok(page
            .revisions
            .into_iter()
            .map(|rev| {
                let content = rev.slots.map(|s| s.main.content);
                (
                    RevisionMeta {
                        rev_id: rev.rev_id,
                        parent_id: rev.parent_id,
                        user: rev.user,
                        comment: rev.comment,
                        timestamp: rev.timestamp,
                    },
                    content,
                )
            })
            .collect())
    }

    /// Read a page plus the version token needed for a conflict-safe write.
    /// A missing page reads as empty with a zero base revision.
    pub async fn read_page(&self, title: &str) -> Result<(String, PageVersion)> {
        let start_timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let response = self
            .query(&[
                ("prop", "revisions".to_string()),
                ("titles", title.to_string()),
                ("rvprop", "ids|timestamp|content".to_string()),
                ("rvslots", "main".to_string()),
                ("rvlimit", "1".to_string()),
            ])
            .await?;
        let page = Self::first_page(response, title)?;
        if page.missing {
            return Ok((
                String::new(),
                PageVersion {
                    base_rev: 0,
                    base_timestamp: String::new(),
                    start_timestamp,
                },
            ));
        }
        let rev = page
            .revisions
            .into_iter()
            .next()
            .ok_or_else(|| MediaWikiError::Parse(format!("no revision for {title}")))?;
        let base_timestamp = rev.timestamp.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        Ok((
            rev.slots.map(|s| s.main.content).unwrap_or_default(),
            PageVersion {
                base_rev: rev.rev_id,
                base_timestamp,
                start_timestamp,
            },
        ))
    }

    async fn csrf_token(&self) -> Result<String> {
        let response = self
            .query(&[
                ("meta", "tokens".to_string()),
                ("type", "csrf".to_string()),
            ])
            .await?;
        response
            .query
            .and_then(|q| q.tokens)
            .map(|t| t.csrf_token)
            .ok_or_else(|| MediaWikiError::Parse("no csrf token in response".to_string()))
    }

    /// Write a page against the version captured at read time. An edit that
    /// raced another writer comes back as `Conflict`, not an error.
    pub async fn write_page(
        &self,
        title: &str,
        content: &str,
        summary: &str,
        version: &PageVersion,
    ) -> Result<WriteOutcome> {
        let token = self.csrf_token().await?;
        let mut form = vec![
            ("format", "json".to_string()),
            ("formatversion", "2".to_string()),
            ("action", "edit".to_string()),
            ("title", title.to_string()),
            ("text", content.to_string()),
            ("summary", summary.to_string()),
            ("starttimestamp", version.start_timestamp.clone()),
            ("token", token),
        ];
        if !version.base_timestamp.is_empty() {
            form.push(("basetimestamp", version.base_timestamp.clone()));
        }

        let mut request = self.http.post(&self.api_url).form(&form);
        if let Some(token) = &self.oauth_token {
            request = request.bearer_auth(token);
        }
        let response: EditResponse = request.send().await?.json().await?;

        if let Some(error) = response.error {
            if error.code == "editconflict" {
                debug!(title, "edit conflict on write");
                return Ok(WriteOutcome::Conflict);
            }
            return Err(MediaWikiError::Api {
                code: error.code,
                info: error.info,
            });
        }
        match response.edit {
            Some(edit) if edit.result == "Success" => Ok(WriteOutcome::Saved),
            other => Err(MediaWikiError::Parse(format!(
                "unexpected edit result: {other:?}"
            ))),
        }
    }

    /// Titles linked from a page (used for tracked-page sets and the
    /// linked-from batch filter).
    pub async fn page_links(&self, title: &str) -> Result<Vec<String>> {
        let response = self
            .query(&[
                ("prop", "links".to_string()),
                ("titles", title.to_string()),
                ("pllimit", "max".to_string()),
            ])
            .await?;
        let page = Self::first_page(response, title)?;
        Ok(page.links.into_iter().map(|l| l.title).collect())
    }

    /// Templates transcluded on a page, without the `Template:` prefix.
    pub async fn templates(&self, title: &str) -> Result<Vec<String>> {
        let response = self
            .query(&[
                ("prop", "templates".to_string()),
                ("titles", title.to_string()),
                ("tlnamespace", "10".to_string()),
                ("tllimit", "max".to_string()),
            ])
            .await?;
        let page = Self::first_page(response, title)?;
        Ok(page
            .templates
            .into_iter()
            .map(|t| {
                t.title
                    .strip_prefix("Template:")
                    .map(str::to_string)
                    .unwrap_or(t.title)
            })
            .collect())
    }

    /// Articles whose talk page transcludes the given template.
    pub async fn pages_with_talk_template(&self, template: &str) -> Result<Vec<String>> {
        let response = self
            .query(&[
                ("list", "embeddedin".to_string()),
                ("eititle", format!("Template:{template}")),
                ("einamespace", "1".to_string()),
                ("eilimit", "max".to_string()),
            ])
            .await?;
        Ok(response
            .query
            .map(|q| q.embeddedin)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|t| t.title.strip_prefix("Talk:").map(str::to_string))
            .collect())
    }

    /// Recent human edits and creations since `since`, newest first.
    pub async fn recent_changes(
        &self,
        since: DateTime<Utc>,
        namespaces: &[i64],
        limit: usize,
    ) -> Result<Vec<RecentChange>> {
        let ns = namespaces
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join("|");
        let response = self
            .query(&[
                ("list", "recentchanges".to_string()),
                (
                    "rcprop",
                    "title|ids|sizes|flags|user|comment|timestamp".to_string(),
                ),
                ("rctype", "edit|new".to_string()),
                ("rcshow", "!bot".to_string()),
                ("rcnamespace", ns),
                ("rcend", since.format("%Y-%m-%dT%H:%M:%SZ").to_string()),
                ("rclimit", limit.to_string()),
            ])
            .await?;
        Ok(response
            .query
            .map(|q| q.recentchanges)
            .unwrap_or_default()
            .into_iter()
            .map(|rc| RecentChange {
                title: rc.title,
                namespace: rc.ns,
                change_type: rc.change_type,
                bot: rc.bot,
                user: rc.user,
                comment: rc.comment,
                old_rev: rc.old_revid,
                new_rev: rc.revid,
                old_len: rc.oldlen,
                new_len: rc.newlen,
                timestamp: rc.timestamp,
            })
            .collect())
    }
}
