//! Stage composition and the two run modes.
//!
//! Live mode: stream → filter → bounded buffer → batch → dispatch →
//! correlate → report, with one batch in flight at a time and ingestion
//! continuing underneath it. Batch mode: one pass over recent changes,
//! then a single dispatch/correlate/report cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, error, info, warn};

use copytrace_common::{
    AnalysisJob, Candidate, ChangeEvent, ChangeType, Locale, ReportEntry, Tuning,
};
use similarity_client::SimilarityService;

use crate::audit::{AuditLog, AuditRecord};
use crate::classify::SourceClassifier;
use crate::diff::extract_addition;
use crate::dispatch::{BatchDispatcher, ResolvedJob};
use crate::filter::{ChangeFilter, DEFAULT_NAMESPACES};
use crate::noise::{NoiseSuppressor, Refined};
use crate::normalize::normalize;
use crate::report::{render_sources, ReportAggregator};
use crate::stats::WatchStats;
use crate::stream::{StreamMonitor, StreamPoll};
use crate::traits::WikiStore;

/// How long a stopping run keeps waiting for the in-flight batch.
const DRAIN_GRACE: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Live,
    Batch,
}

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub mode: RunMode,
    pub lang: String,
    pub stream_url: String,
    pub report_page: Option<String>,
    /// Days of recent changes inspected in batch mode (0.5 = 12 hours).
    pub window_days: f64,
    /// Restrict batch mode to articles whose talk page carries this template.
    pub talk_template: Option<String>,
    /// Restrict batch mode to articles linked from this page.
    pub linked_from: Option<String>,
    /// Page whose outbound links form the tracked-pages override set.
    pub tracked_from: Option<String>,
    /// Run the whole pipeline without submitting anything.
    pub no_dispatch: bool,
    pub batch_limit: usize,
}

pub struct Pipeline {
    store: Arc<dyn WikiStore>,
    service: Arc<dyn SimilarityService>,
    classifier: SourceClassifier,
    options: WatchOptions,
    tuning: Tuning,
    locale: &'static Locale,
    audit: AuditLog,
    tracked: HashSet<String>,
    shutdown: Arc<AtomicBool>,
}

impl Pipeline {
    pub async fn new(
        store: Arc<dyn WikiStore>,
        service: Arc<dyn SimilarityService>,
        classifier: SourceClassifier,
        options: WatchOptions,
        tuning: Tuning,
    ) -> Result<Self> {
        let locale = Locale::for_code(&options.lang);
        let audit = AuditLog::open(&options.lang).context("could not open audit log")?;

        let tracked = match &options.tracked_from {
            Some(page) => match store.page_links(page).await {
                Ok(links) => {
                    info!(page = %page, count = links.len(), "loaded tracked page set");
                    links.into_iter().collect()
                }
                Err(e) => {
                    warn!(page = %page, error = %e, "could not load tracked pages, continuing without");
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        Ok(Self {
            store,
            service,
            classifier,
            options,
            tuning,
            locale,
            audit,
            tracked,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Flag checked once per loop turn; set it from a signal handler to
    /// stop accepting new batches and drain what is in flight.
    pub fn shutdown_handle(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    pub async fn run(self) -> Result<WatchStats> {
        match self.options.mode {
            RunMode::Live => self.run_live().await,
            RunMode::Batch => self.run_batch().await,
        }
    }

    async fn run_live(self) -> Result<WatchStats> {
        let mut stats = WatchStats::default();
        let mut monitor = StreamMonitor::connect(&self.options.stream_url, &self.tuning);
        let deadline = Instant::now() + Duration::from_secs(self.tuning.run_timeout_secs);
        let filter = ChangeFilter::new(self.locale, &self.tuning, self.tracked.clone());
        let suppressor = NoiseSuppressor::new(self.store.as_ref(), self.locale, &self.tuning);
        let mut dispatcher =
            BatchDispatcher::new(self.service.clone(), &self.tuning, self.options.no_dispatch);
        let aggregator = ReportAggregator::new(
            self.store.as_ref(),
            self.locale,
            &self.tuning,
            self.options.report_page.clone(),
        );

        let mut buffer: Vec<ChangeEvent> = Vec::new();
        let mut batches_since_login: u32 = 0;
        let mut fatal: Option<anyhow::Error> = None;
        let mut drain_deadline: Option<Instant> = None;

        info!(stream = %self.options.stream_url, "starting live watch");
        loop {
            let stopping = fatal.is_some()
                || self.shutdown.load(Ordering::Relaxed)
                || Instant::now() >= deadline;

            if !stopping {
                match monitor.poll().await {
                    Ok(StreamPoll::Event(event)) => {
                        stats.events_seen += 1;
                        if filter.accepts(&event) {
                            stats.events_accepted += 1;
                            buffer.push(event);
                            debug!(buffered = buffer.len(), "event buffered");
                        }
                    }
                    Ok(StreamPoll::Idle) => {}
                    Ok(StreamPoll::Closed) => {
                        info!("feed closed, winding down");
                        self.shutdown.store(true, Ordering::Relaxed);
                    }
                    Err(e) => {
                        error!(error = %e, "feed is gone for good");
                        fatal = Some(e.into());
                    }
                }
            }

            if dispatcher.has_in_flight() {
                if dispatcher.poll_ready().await {
                    let resolved = dispatcher
                        .collect(&self.classifier, &self.tuning, &mut stats)
                        .await;
                    let entries = self.build_entries(resolved).await;
                    if let Err(e) = aggregator.publish(&entries, &mut stats).await {
                        warn!(error = %e, "report publish failed, entries lost");
                    }
                    stats.batches_reported += 1;
                    batches_since_login += 1;
                    if batches_since_login >= self.tuning.relogin_every {
                        info!("resetting similarity session after many batches");
                        self.service.reset_session().await;
                        batches_since_login = 0;
                    }
                } else if stopping {
                    // waiting out the in-flight batch
                    let limit =
                        *drain_deadline.get_or_insert_with(|| Instant::now() + DRAIN_GRACE);
                    if Instant::now() >= limit {
                        warn!("in-flight batch did not resolve within the drain window, dropping it");
                        break;
                    }
                    sleep(Duration::from_millis(500)).await;
                }
            } else if stopping {
                break;
            } else if buffer.len() >= self.tuning.batch_threshold {
                let batch: Vec<ChangeEvent> = buffer.drain(..).collect();
                info!(count = batch.len(), "assembling batch");
                for event in batch {
                    let Some(candidate) = self.load_candidate(&event, &mut stats).await else {
                        continue;
                    };
                    if let Some((candidate, addition)) =
                        self.qualify(candidate, &suppressor, &mut stats).await
                    {
                        dispatcher.submit(candidate, addition, &mut stats).await;
                    }
                }
            }
        }

        info!("{stats}");
        match fatal {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }

    async fn run_batch(self) -> Result<WatchStats> {
        let mut stats = WatchStats::default();
        let filter = ChangeFilter::new(self.locale, &self.tuning, self.tracked.clone());
        let suppressor = NoiseSuppressor::new(self.store.as_ref(), self.locale, &self.tuning);
        let mut dispatcher =
            BatchDispatcher::new(self.service.clone(), &self.tuning, self.options.no_dispatch);
        let aggregator = ReportAggregator::new(
            self.store.as_ref(),
            self.locale,
            &self.tuning,
            self.options.report_page.clone(),
        );

        let allowed = self.batch_page_set().await?;
        let since = Utc::now()
            - chrono::Duration::seconds((self.options.window_days * 86400.0) as i64);
        let changes = self
            .store
            .recent_changes(since, &DEFAULT_NAMESPACES, self.options.batch_limit)
            .await
            .context("could not list recent changes")?;
        info!(count = changes.len(), "recent changes fetched");

        let mut seen_titles: HashSet<String> = HashSet::new();
        for change in changes {
            let change_type = match change.change_type.as_str() {
                "edit" => ChangeType::Edit,
                "new" => ChangeType::New,
                _ => continue,
            };
            let event = ChangeEvent {
                title: change.title,
                namespace: change.namespace,
                change_type,
                is_bot: change.bot,
                editor: change.user,
                comment: change.comment,
                old_rev: change.old_rev,
                new_rev: change.new_rev,
                byte_delta: change.new_len - change.old_len,
                timestamp: change.timestamp,
            };
            stats.events_seen += 1;
            if let Some(allowed) = &allowed {
                if !allowed.contains(&event.title) {
                    continue;
                }
            }
            if !filter.accepts(&event) {
                continue;
            }
            // the listing is newest-first; one look per page is enough
            if !seen_titles.insert(event.title.clone()) {
                continue;
            }
            stats.events_accepted += 1;

            let Some(candidate) = self.load_candidate(&event, &mut stats).await else {
                continue;
            };
            if let Some((candidate, addition)) =
                self.qualify(candidate, &suppressor, &mut stats).await
            {
                dispatcher.submit(candidate, addition, &mut stats).await;
            }
        }

        // single correlate/report cycle
        let drain_deadline = Instant::now() + DRAIN_GRACE;
        while dispatcher.has_in_flight() {
            if dispatcher.poll_ready().await {
                let resolved = dispatcher
                    .collect(&self.classifier, &self.tuning, &mut stats)
                    .await;
                let entries = self.build_entries(resolved).await;
                aggregator.publish(&entries, &mut stats).await?;
                stats.batches_reported += 1;
                break;
            }
            if Instant::now() >= drain_deadline {
                warn!("batch did not resolve within the drain window, dropping it");
                break;
            }
            sleep(Duration::from_secs(5)).await;
        }

        info!("{stats}");
        Ok(stats)
    }

    /// Union of the configured page-set filters, or `None` when unrestricted.
    async fn batch_page_set(&self) -> Result<Option<HashSet<String>>> {
        let mut allowed: Option<HashSet<String>> = None;
        if let Some(template) = &self.options.talk_template {
            let pages = self
                .store
                .pages_with_talk_template(template)
                .await
                .with_context(|| format!("could not resolve talk template {template}"))?;
            info!(template = %template, count = pages.len(), "talk-template page set loaded");
            allowed.get_or_insert_with(HashSet::new).extend(pages);
        }
        if let Some(page) = &self.options.linked_from {
            let pages = self
                .store
                .page_links(page)
                .await
                .with_context(|| format!("could not resolve links from {page}"))?;
            info!(page = %page, count = pages.len(), "linked-from page set loaded");
            allowed.get_or_insert_with(HashSet::new).extend(pages);
        }
        Ok(allowed)
    }

    /// Load both revision texts for a filtered change. Failures skip the
    /// candidate and nothing else.
    async fn load_candidate(
        &self,
        event: &ChangeEvent,
        stats: &mut WatchStats,
    ) -> Option<Candidate> {
        let rev_ids: Vec<u64> = if event.old_rev == 0 {
            vec![event.new_rev]
        } else {
            vec![event.old_rev, event.new_rev]
        };
        let revisions = match self.store.revisions_by_id(&rev_ids).await {
            Ok(revisions) => revisions,
            Err(e) => {
                warn!(title = %event.title, new_rev = event.new_rev, old_rev = event.old_rev, error = %e, "revision load failed, skipping candidate");
                stats.load_failures += 1;
                return None;
            }
        };
        let Some((new_info, new_text)) = revisions.iter().find(|(i, _)| i.rev_id == event.new_rev)
        else {
            warn!(title = %event.title, rev = event.new_rev, "new revision text unavailable, skipping candidate");
            stats.load_failures += 1;
            return None;
        };
        let old_text = if event.old_rev == 0 {
            String::new()
        } else {
            match revisions.iter().find(|(i, _)| i.rev_id == event.old_rev) {
                Some((_, text)) => text.clone(),
                None => {
                    warn!(title = %event.title, rev = event.old_rev, "old revision text unavailable, skipping candidate");
                    stats.load_failures += 1;
                    return None;
                }
            }
        };
        stats.candidates_loaded += 1;
        Some(Candidate {
            title: event.title.clone(),
            namespace: event.namespace,
            editor: new_info.editor.clone(),
            comment: new_info.comment.clone(),
            old_rev: event.old_rev,
            new_rev: event.new_rev,
            old_text,
            new_text: new_text.clone(),
            timestamp: new_info.timestamp,
        })
    }

    /// Diff, normalize and noise-suppress one candidate down to the text
    /// worth analyzing, or nothing.
    async fn qualify(
        &self,
        candidate: Candidate,
        suppressor: &NoiseSuppressor<'_>,
        stats: &mut WatchStats,
    ) -> Option<(Candidate, String)> {
        info!(title = %candidate.title, old = candidate.old_rev, new = candidate.new_rev, "inspecting");
        let old_norm = normalize(
            &candidate.old_text,
            self.tuning.quote_words,
            self.tuning.max_template_passes,
        );
        let new_norm = normalize(
            &candidate.new_text,
            self.tuning.quote_words,
            self.tuning.max_template_passes,
        );
        let addition = extract_addition(&old_norm, &new_norm);
        if addition.chars().count() < self.tuning.min_addition_chars {
            debug!(title = %candidate.title, "delta too small");
            stats.too_small += 1;
            return None;
        }
        match suppressor.refine(&candidate, addition, &old_norm).await {
            Refined::Accepted(addition) => Some((candidate, addition)),
            Refined::TooSmall => {
                debug!(title = %candidate.title, "nothing left after noise suppression");
                stats.too_small += 1;
                None
            }
            Refined::Reverted => {
                debug!(title = %candidate.title, "already reverted");
                stats.reverted += 1;
                None
            }
        }
    }

    /// Turn resolved jobs into report entries, tagging each article and
    /// appending audit records. Jobs with no surviving source vanish here.
    async fn build_entries(&self, resolved: Vec<ResolvedJob>) -> Vec<ReportEntry> {
        let mut entries = Vec::new();
        for item in resolved {
            if item.sources.is_empty() {
                debug!(title = %item.job.candidate.title, "no surviving sources");
                continue;
            }
            let AnalysisJob {
                job_id, candidate, ..
            } = item.job;
            let tags = self.page_tags(&candidate.title).await;
            let entry = ReportEntry {
                title: candidate.title,
                namespace: candidate.namespace,
                editor: candidate.editor,
                new_rev: candidate.new_rev,
                old_rev: candidate.old_rev,
                timestamp: candidate.timestamp,
                tags,
                report_id: item.report_id,
                sources: item.sources,
            };
            if let Err(e) = self.audit.append(&AuditRecord {
                revision_id: entry.new_rev,
                timestamp: entry.timestamp,
                title: entry.title.clone(),
                namespace: entry.namespace,
                job_id,
                rendered_sources: render_sources(&entry),
            }) {
                warn!(title = %entry.title, error = %e, "audit append failed");
            }
            entries.push(entry);
        }
        entries
    }

    /// WikiProject tags from the article's talk page, plus the tracked-set
    /// marker. Lookup failures mean an untagged row, nothing worse.
    async fn page_tags(&self, title: &str) -> Vec<String> {
        let mut tags: Vec<String> = match self.store.templates(&format!("Talk:{title}")).await {
            Ok(templates) => templates
                .into_iter()
                .filter(|t| t.starts_with("WikiProject ") && !t.contains('/'))
                .collect(),
            Err(e) => {
                debug!(title = %title, error = %e, "talk page tag lookup failed");
                Vec::new()
            }
        };
        if self.tracked.contains(title) {
            tags.push("WikiEd".to_string());
        }
        tags
    }
}
