use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::types::*;
use crate::error::{Result, SimilarityError};
use crate::traits::{SimilarityService, SourceRecord, SubmissionReport, SubmissionState};

const DEFAULT_API_URL: &str = "https://api.ithenticate.com/rpc";

/// Submit straight to report generation, without archiving in the
/// service-side repository.
const SUBMIT_TO_GENERATE_REPORT: u32 = 1;

#[derive(Debug, Clone)]
struct Session {
    sid: String,
    folder_id: u64,
}

pub struct IthenticateClient {
    http: reqwest::Client,
    base_url: String,
    username: String,
    password: String,
    folder_name: String,
    session: Mutex<Option<Session>>,
}

impl IthenticateClient {
    pub fn new(username: &str, password: &str, folder_name: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: DEFAULT_API_URL.to_string(),
            username: username.to_string(),
            password: password.to_string(),
            folder_name: folder_name.to_string(),
            session: Mutex::new(None),
        }
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.to_string();
        self
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        debug!(method, "similarity service call");
        let response = self
            .http
            .post(&self.base_url)
            .json(&json!({ "method": method, "params": params }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SimilarityError::Api {
                status: response.status().as_u16(),
                message: format!("{method} failed"),
            });
        }
        Ok(response.json().await?)
    }

    /// Log in and locate the upload folder. Reused until reset.
    async fn session(&self) -> Result<Session> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.clone());
        }

        info!("Logging in to similarity service...");
        let login: LoginResponse = self
            .call(
                "login",
                json!({ "username": self.username, "password": self.password }),
            )
            .await?;
        if login.status != 200 {
            return Err(SimilarityError::Session(format!(
                "login rejected with status {}",
                login.status
            )));
        }
        let sid = login
            .sid
            .ok_or_else(|| SimilarityError::Session("login returned no session id".into()))?;

        let folders: FolderListResponse = self.call("folder.list", json!({ "sid": sid })).await?;
        if folders.status != 200 {
            return Err(SimilarityError::Api {
                status: folders.status,
                message: "folder.list failed".into(),
            });
        }
        let folder_id = folders
            .folders
            .iter()
            .find(|f| f.name == self.folder_name)
            .map(|f| f.id)
            .ok_or_else(|| {
                SimilarityError::Session(format!("no '{}' folder found", self.folder_name))
            })?;

        let session = Session { sid, folder_id };
        *guard = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl SimilarityService for IthenticateClient {
    async fn submit(&self, text: &str, label: &str) -> Result<String> {
        let session = self.session().await?;
        let response: DocumentAddResponse = self
            .call(
                "document.add",
                json!({
                    "sid": session.sid,
                    "submit_to": SUBMIT_TO_GENERATE_REPORT,
                    "folder": session.folder_id,
                    "uploads": [{
                        "title": label,
                        "author_first": "Wiki",
                        "author_last": "Editor",
                        "filename": label,
                        "upload": text,
                    }],
                }),
            )
            .await?;
        if response.status != 200 {
            return Err(SimilarityError::Api {
                status: response.status,
                message: "document.add failed".into(),
            });
        }
        let uploaded = response
            .uploaded
            .first()
            .ok_or_else(|| SimilarityError::Parse("document.add returned no upload".into()))?;
        Ok(uploaded.id.to_string())
    }

    async fn status(&self, job_id: &str) -> Result<SubmissionState> {
        let session = self.session().await?;
        let response: DocumentGetResponse = self
            .call("document.get", json!({ "id": job_id, "sid": session.sid }))
            .await?;
        if response.status != 200 {
            return Err(SimilarityError::Api {
                status: response.status,
                message: format!("document.get failed for {job_id}"),
            });
        }
        let document = response
            .documents
            .first()
            .ok_or_else(|| SimilarityError::Parse(format!("no document for job {job_id}")))?;
        if document.is_pending != 0 {
            Ok(SubmissionState::Pending)
        } else if document.parts.is_empty() {
            // processed but nothing to report against
            Ok(SubmissionState::Failed)
        } else {
            Ok(SubmissionState::Ready)
        }
    }

    async fn sources(&self, job_id: &str) -> Result<SubmissionReport> {
        let session = self.session().await?;
        let response: DocumentGetResponse = self
            .call("document.get", json!({ "id": job_id, "sid": session.sid }))
            .await?;
        let part = response
            .documents
            .first()
            .and_then(|d| d.parts.first())
            .ok_or_else(|| SimilarityError::Parse(format!("no report part for job {job_id}")))?;
        debug!(part = part.id, score = part.score, "fetching part sources");

        let sources: ReportSourcesResponse = self
            .call(
                "report.sources",
                json!({ "id": part.id, "sid": session.sid }),
            )
            .await?;
        if sources.status != 200 {
            return Err(SimilarityError::Api {
                status: sources.status,
                message: format!("report.sources failed for part {}", part.id),
            });
        }

        Ok(SubmissionReport {
            report_id: part.id.to_string(),
            sources: sources
                .sources
                .into_iter()
                .filter_map(|s| {
                    s.linkurl.map(|url| SourceRecord {
                        url,
                        percent: s.percent,
                        word_count: s.word_count,
                        collection: s.collection,
                    })
                })
                .collect(),
        })
    }

    async fn reset_session(&self) {
        *self.session.lock().await = None;
    }
}
