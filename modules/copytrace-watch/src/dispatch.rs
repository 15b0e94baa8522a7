//! Submission batching and asynchronous result correlation.
//!
//! One batch is in flight at a time. Submissions are fire-and-forget per
//! candidate: a rejected submit drops that candidate and never blocks the
//! rest. Status polling is timer-gated so the ingestion loop keeps turning
//! while the service grinds.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::time::{Duration, Instant};
use tracing::{info, warn};

use copytrace_common::{
    AnalysisJob, Candidate, ClassifiedSource, JobStatus, SourceMatch, Tuning,
};
use similarity_client::{SimilarityService, SubmissionState};

use crate::classify::SourceClassifier;
use crate::stats::WatchStats;

/// A job whose sources came back and survived filtering.
#[derive(Debug, Clone)]
pub struct ResolvedJob {
    pub job: AnalysisJob,
    pub report_id: String,
    pub sources: Vec<ClassifiedSource>,
}

pub struct BatchDispatcher {
    service: Arc<dyn SimilarityService>,
    jobs: Vec<AnalysisJob>,
    /// Revision ids ever submitted in this run; nothing is dispatched twice.
    dispatched: HashSet<u64>,
    last_poll: Option<Instant>,
    poll_interval: Duration,
    /// When set, candidates qualify and are counted but nothing is sent.
    no_dispatch: bool,
}

impl BatchDispatcher {
    pub fn new(service: Arc<dyn SimilarityService>, tuning: &Tuning, no_dispatch: bool) -> Self {
        Self {
            service,
            jobs: Vec::new(),
            dispatched: HashSet::new(),
            last_poll: None,
            poll_interval: Duration::from_secs(tuning.poll_interval_secs),
            no_dispatch,
        }
    }

    pub fn has_in_flight(&self) -> bool {
        !self.jobs.is_empty()
    }

    /// Submit one qualified candidate. Failures are terminal for the
    /// candidate, not for the batch.
    pub async fn submit(&mut self, candidate: Candidate, addition: String, stats: &mut WatchStats) {
        if !self.dispatched.insert(candidate.new_rev) {
            info!(title = %candidate.title, rev = candidate.new_rev, "already dispatched, skipping");
            return;
        }
        if self.no_dispatch {
            info!(title = %candidate.title, chars = addition.chars().count(), "debug mode, not submitting");
            return;
        }
        let label = format!("{}/{}", candidate.title, candidate.new_rev);
        match self.service.submit(&addition, &label).await {
            Ok(job_id) => {
                info!(title = %candidate.title, rev = candidate.new_rev, job_id, "submitted for analysis");
                stats.dispatched += 1;
                self.jobs.push(AnalysisJob {
                    job_id,
                    candidate,
                    addition,
                    status: JobStatus::Pending,
                });
            }
            Err(e) => {
                warn!(title = %candidate.title, rev = candidate.new_rev, error = %e, "submission failed, dropping candidate");
                stats.submit_failures += 1;
            }
        }
    }

    /// Timer-gated status sweep. Returns true once every job in the batch
    /// is out of `Pending`; between poll windows it returns false without
    /// touching the service.
    pub async fn poll_ready(&mut self) -> bool {
        if self.jobs.is_empty() {
            return false;
        }
        if let Some(last) = self.last_poll {
            if last.elapsed() < self.poll_interval {
                return false;
            }
        }
        self.last_poll = Some(Instant::now());

        for job in self.jobs.iter_mut() {
            if job.status != JobStatus::Pending {
                continue;
            }
            match self.service.status(&job.job_id).await {
                Ok(SubmissionState::Pending) => {
                    info!(job_id = %job.job_id, title = %job.candidate.title, "still pending");
                    return false;
                }
                Ok(SubmissionState::Ready) => job.status = JobStatus::Ready,
                Ok(SubmissionState::Failed) => {
                    warn!(job_id = %job.job_id, title = %job.candidate.title, "service reported failure");
                    job.status = JobStatus::Failed;
                }
                Err(e) => {
                    // an unresponsive job must not hold the batch hostage
                    warn!(job_id = %job.job_id, error = %e, "status query failed, abandoning job");
                    job.status = JobStatus::Failed;
                }
            }
        }
        self.jobs.iter().all(|j| j.status != JobStatus::Pending)
    }

    /// Fetch, filter and classify sources for every ready job, emptying the
    /// batch. Failed jobs are dropped here with a log line and nothing else.
    pub async fn collect(
        &mut self,
        classifier: &SourceClassifier,
        tuning: &Tuning,
        stats: &mut WatchStats,
    ) -> Vec<ResolvedJob> {
        let mut resolved = Vec::new();
        for mut job in std::mem::take(&mut self.jobs) {
            if job.status != JobStatus::Ready {
                stats.jobs_failed += 1;
                continue;
            }
            let report = match self.service.sources(&job.job_id).await {
                Ok(report) => report,
                Err(e) => {
                    warn!(job_id = %job.job_id, title = %job.candidate.title, error = %e, "sources fetch failed, excluding from report");
                    job.status = JobStatus::Failed;
                    stats.jobs_failed += 1;
                    continue;
                }
            };

            let mut kept: Vec<ClassifiedSource> = Vec::new();
            for record in report.sources {
                if classifier.is_ignored(&record.url) {
                    continue;
                }
                if record.percent < tuning.min_source_percent {
                    info!(
                        url = %record.url,
                        percent = record.percent,
                        words = record.word_count,
                        "not enough similarity"
                    );
                    continue;
                }
                let source = SourceMatch {
                    collection: record.collection,
                    percent: record.percent,
                    word_count: record.word_count,
                    url: record.url,
                };
                if let Some(verdict) = classifier
                    .classify(&source, &job.candidate.title, &job.addition)
                    .await
                {
                    kept.push(ClassifiedSource { source, verdict });
                    if kept.len() == tuning.max_report_sources {
                        break;
                    }
                }
            }

            resolved.push(ResolvedJob {
                report_id: report.report_id,
                sources: kept,
                job,
            });
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use similarity_client::{Result, SimilarityError, SourceRecord, SubmissionReport};
    use std::sync::Mutex;

    struct FakeService {
        submissions: Mutex<Vec<String>>,
        fail_submit: bool,
    }

    impl FakeService {
        fn new(fail_submit: bool) -> Self {
            Self {
                submissions: Mutex::new(Vec::new()),
                fail_submit,
            }
        }
    }

    #[async_trait]
    impl SimilarityService for FakeService {
        async fn submit(&self, _text: &str, label: &str) -> Result<String> {
            if self.fail_submit {
                return Err(SimilarityError::Session("down".into()));
            }
            let mut subs = self.submissions.lock().unwrap();
            subs.push(label.to_string());
            Ok(format!("job-{}", subs.len()))
        }

        async fn status(&self, _job_id: &str) -> Result<SubmissionState> {
            Ok(SubmissionState::Ready)
        }

        async fn sources(&self, _job_id: &str) -> Result<SubmissionReport> {
            Ok(SubmissionReport {
                report_id: "700".to_string(),
                sources: vec![SourceRecord {
                    url: "https://en.wikipedia.org/wiki/Sample".to_string(),
                    percent: 90,
                    word_count: 300,
                    collection: "Internet".to_string(),
                }],
            })
        }

        async fn reset_session(&self) {}
    }

    fn candidate(rev: u64) -> Candidate {
        Candidate {
            title: "Sample Article".to_string(),
            namespace: 0,
            editor: "Example".to_string(),
            comment: "expanded".to_string(),
            old_rev: rev - 1,
            new_rev: rev,
            old_text: String::new(),
            new_text: String::new(),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn a_candidate_is_never_dispatched_twice() {
        let service = Arc::new(FakeService::new(false));
        let mut dispatcher = BatchDispatcher::new(service.clone(), &Tuning::default(), false);
        let mut stats = WatchStats::default();

        dispatcher
            .submit(candidate(101), "text".to_string(), &mut stats)
            .await;
        dispatcher
            .submit(candidate(101), "text".to_string(), &mut stats)
            .await;

        assert_eq!(service.submissions.lock().unwrap().len(), 1);
        assert_eq!(stats.dispatched, 1);
    }

    #[tokio::test]
    async fn failed_submission_drops_only_that_candidate() {
        let service = Arc::new(FakeService::new(true));
        let mut dispatcher = BatchDispatcher::new(service, &Tuning::default(), false);
        let mut stats = WatchStats::default();

        dispatcher
            .submit(candidate(101), "text".to_string(), &mut stats)
            .await;

        assert!(!dispatcher.has_in_flight());
        assert_eq!(stats.submit_failures, 1);
    }

    #[tokio::test]
    async fn debug_mode_never_submits() {
        let service = Arc::new(FakeService::new(false));
        let mut dispatcher = BatchDispatcher::new(service.clone(), &Tuning::default(), true);
        let mut stats = WatchStats::default();

        dispatcher
            .submit(candidate(101), "text".to_string(), &mut stats)
            .await;

        assert!(service.submissions.lock().unwrap().is_empty());
        assert!(!dispatcher.has_in_flight());
    }

    #[tokio::test]
    async fn ignored_domains_are_filtered_from_results() {
        let service = Arc::new(FakeService::new(false));
        let tuning = Tuning {
            poll_interval_secs: 0,
            ..Tuning::default()
        };
        let mut dispatcher = BatchDispatcher::new(service, &tuning, false);
        let mut stats = WatchStats::default();

        dispatcher
            .submit(candidate(101), "text".to_string(), &mut stats)
            .await;
        assert!(dispatcher.poll_ready().await);

        let classifier = SourceClassifier::new(crate::classify::default_ignore_list());
        let resolved = dispatcher.collect(&classifier, &tuning, &mut stats).await;
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].sources.is_empty());
        assert!(!dispatcher.has_in_flight());
    }
}
