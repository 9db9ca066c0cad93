//! Crawler coordinator - main crawl orchestration logic
//!
//! This module drives one crawl invocation from start to finish:
//! - Fetching page 1 and planning the page count
//! - Dispatching one task per remaining page, a bounded window ahead of
//!   the admission gate
//! - Collecting page results in the waiting task, with a soft overall deadline
//! - Handing the aggregate to storage and closing the run ledger entry
//!
//! Page tasks only return values; all aggregation happens here, so no
//! collection is shared between tasks.

use crate::config::Config;
use crate::crawler::admission::AdmissionGate;
use crate::crawler::extractor::{parse_page, PageResult};
use crate::crawler::fetcher::{fetch_with_retry, FetchError, HttpPageFetcher, PageSource};
use crate::crawler::persister::{persist_batch, PersistSummary};
use crate::crawler::planner::plan_pages;
use crate::crawler::retry::RetryPolicy;
use crate::quote::{FieldMap, Quote, RecordNormalizer};
use crate::state::{CrawlPhase, PageState, PhaseTracker};
use crate::storage::{QuoteSink, RunStatus, RunTotals, SharedSink};
use crate::HarvestError;
use chrono::Utc;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, MutexGuard};
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What a crawl invocation covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlMode {
    SinglePage(u32),
    AllPages,
}

impl CrawlMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePage(_) => "single-page",
            Self::AllPages => "all-pages",
        }
    }
}

impl fmt::Display for CrawlMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SinglePage(page) => write!(f, "single-page (page {})", page),
            Self::AllPages => write!(f, "all-pages"),
        }
    }
}

/// Tunables for one harvester
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub page_size: u32,
    pub max_concurrent_fetches: usize,
    /// Ceiling on the planned page count
    pub max_pages: u32,
    pub retry: RetryPolicy,
    /// Soft bound on the wait for page tasks
    pub overall_timeout: Duration,
}

impl CrawlSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            page_size: config.endpoint.page_size,
            max_concurrent_fetches: config.crawler.max_concurrent_fetches as usize,
            max_pages: config.crawler.max_pages,
            retry: RetryPolicy::linear(config.crawler.max_attempts, config.crawler.retry_backoff()),
            overall_timeout: config.crawler.overall_timeout(),
        }
    }
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Summary of one crawl invocation
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub mode: CrawlMode,
    pub run_id: Option<i64>,
    pub pages_planned: u32,
    pub page_states: BTreeMap<u32, PageState>,
    /// Quotes that passed the validity gate
    pub records_parsed: u64,
    pub records_dropped: u64,
    /// Pages fetched successfully whose body carried no payload
    pub pages_without_payload: u32,
    pub persisted: PersistSummary,
    /// The soft deadline elapsed before every page task resolved
    pub timed_out: bool,
    /// The crawl was cancelled from outside
    pub interrupted: bool,
    pub phase: CrawlPhase,
    pub elapsed: Duration,
}

impl CrawlReport {
    fn new(mode: CrawlMode, run_id: Option<i64>) -> Self {
        Self {
            mode,
            run_id,
            pages_planned: 0,
            page_states: BTreeMap::new(),
            records_parsed: 0,
            records_dropped: 0,
            pages_without_payload: 0,
            persisted: PersistSummary::default(),
            timed_out: false,
            interrupted: false,
            phase: CrawlPhase::Idle,
            elapsed: Duration::ZERO,
        }
    }

    pub fn pages_succeeded(&self) -> usize {
        self.count_pages(PageState::Completed)
    }

    pub fn pages_failed(&self) -> usize {
        self.count_pages(PageState::Failed)
    }

    pub fn pages_abandoned(&self) -> usize {
        self.count_pages(PageState::Abandoned)
    }

    fn count_pages(&self, state: PageState) -> usize {
        self.page_states.values().filter(|s| **s == state).count()
    }

    /// Ledger status for this outcome
    pub fn status(&self) -> RunStatus {
        if self.interrupted {
            RunStatus::Interrupted
        } else if self.pages_succeeded() < self.pages_planned as usize || self.persisted.failed > 0 {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        }
    }

    pub fn totals(&self) -> RunTotals {
        RunTotals {
            pages_planned: self.pages_planned,
            pages_failed: (self.pages_failed() + self.pages_abandoned()) as u32,
            records_parsed: self.records_parsed,
            records_dropped: self.records_dropped,
            records_saved: self.persisted.saved,
            records_failed: self.persisted.failed,
        }
    }

    fn record_page(&mut self, result: PageResult, batch: &mut Vec<Quote>) {
        self.records_parsed += result.quotes.len() as u64;
        self.records_dropped += result.dropped;
        if !result.payload_found {
            self.pages_without_payload += 1;
        }
        self.page_states.insert(result.page, PageState::Completed);
        batch.extend(result.quotes);
    }

    fn record_failure(&mut self, page: u32, error: &FetchError) {
        let state = match error {
            FetchError::Interrupted { .. } => {
                tracing::info!("Page {} abandoned", page);
                PageState::Abandoned
            }
            _ => {
                tracing::error!("Page {} failed: {}", page, error);
                PageState::Failed
            }
        };
        self.page_states.insert(page, state);
    }

    /// Resolves pages whose task never reported back
    fn close_unresolved(&mut self) {
        let fallback = if self.timed_out {
            PageState::Abandoned
        } else {
            PageState::Failed
        };
        for state in self.page_states.values_mut() {
            if !state.is_terminal() {
                *state = fallback;
            }
        }
    }
}

/// What a page task hands back to the coordinator
enum PageOutcome {
    Parsed(PageResult),
    Failed { page: u32, error: FetchError },
}

/// Main harvester structure
pub struct Harvester {
    source: Arc<dyn PageSource>,
    sink: SharedSink,
    normalizer: Arc<RecordNormalizer>,
    settings: CrawlSettings,
    config_hash: String,
    shutdown: CancellationToken,
}

impl Harvester {
    /// Creates a harvester that fetches over HTTP
    ///
    /// # Arguments
    ///
    /// * `config` - Validated configuration
    /// * `sink` - Storage receiving the aggregated quotes and run ledger entries
    ///
    /// # Returns
    ///
    /// * `Ok(Harvester)` - Ready to crawl
    /// * `Err(HarvestError)` - Bad field overrides or HTTP client setup failure
    pub fn new(config: &Config, sink: SharedSink) -> Result<Self, HarvestError> {
        let fields = FieldMap::with_overrides(&config.fields)?;
        let source = HttpPageFetcher::from_config(config)?;

        Ok(Self::with_source(
            Arc::new(source),
            sink,
            RecordNormalizer::new(fields),
            CrawlSettings::from_config(config),
        ))
    }

    /// Creates a harvester around any page source
    pub fn with_source(
        source: Arc<dyn PageSource>,
        sink: SharedSink,
        normalizer: RecordNormalizer,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            source,
            sink,
            normalizer: Arc::new(normalizer),
            settings,
            config_hash: String::new(),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn with_config_hash(mut self, config_hash: impl Into<String>) -> Self {
        self.config_hash = config_hash.into();
        self
    }

    /// Replaces the shutdown token, e.g. with one wired to Ctrl-C
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Cancelling this token interrupts any crawl in progress
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn settings(&self) -> &CrawlSettings {
        &self.settings
    }

    /// Runs a crawl in the given mode
    pub async fn crawl(&self, mode: CrawlMode) -> Result<CrawlReport, HarvestError> {
        match mode {
            CrawlMode::SinglePage(page) => self.crawl_one_page(page).await,
            CrawlMode::AllPages => self.crawl_all_pages().await,
        }
    }

    /// Fetches, normalizes and persists a single page
    ///
    /// Pages are 1-based; page 0 is treated as page 1.
    pub async fn crawl_one_page(&self, page: u32) -> Result<CrawlReport, HarvestError> {
        let page = page.max(1);
        let mode = CrawlMode::SinglePage(page);
        let started = Instant::now();
        let mut phase = PhaseTracker::new();
        let cancel = self.shutdown.child_token();

        tracing::info!("Starting {} crawl", mode);
        let mut report = CrawlReport::new(mode, self.begin_run(mode));
        report.pages_planned = 1;
        let mut batch = Vec::new();

        phase.advance(CrawlPhase::Fetching)?;
        report.page_states.insert(page, PageState::Fetching);
        match fetch_with_retry(self.source.as_ref(), page, &self.settings.retry, &cancel).await {
            Ok(body) => {
                let result = parse_page(page, &body, &self.normalizer, Utc::now());
                report.record_page(result, &mut batch);
            }
            Err(e) => report.record_failure(page, &e),
        }

        report.interrupted = self.shutdown.is_cancelled();
        phase.advance(CrawlPhase::Aggregating)?;
        self.persist_and_finish(report, batch, phase, started).await
    }

    /// Fetches every page of the listing and persists the aggregate
    ///
    /// Page 1 is fetched once: its body both sizes the crawl and supplies
    /// the first page of rows. The page count is capped at `max_pages`.
    /// Pages 2..=N run concurrently, at most `max_concurrent_fetches` at a
    /// time, and are dispatched as earlier pages resolve. When the overall
    /// timeout elapses or shutdown is requested, dispatch stops, outstanding
    /// tasks are cancelled, and whatever has been collected is persisted.
    pub async fn crawl_all_pages(&self) -> Result<CrawlReport, HarvestError> {
        let mode = CrawlMode::AllPages;
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.settings.overall_timeout;
        let mut phase = PhaseTracker::new();
        let cancel = self.shutdown.child_token();

        tracing::info!("Starting {} crawl", mode);
        let mut report = CrawlReport::new(mode, self.begin_run(mode));
        let mut batch = Vec::new();

        phase.advance(CrawlPhase::PlanningPages)?;
        report.page_states.insert(1, PageState::Fetching);
        let seed = tokio::time::timeout_at(
            deadline,
            fetch_with_retry(self.source.as_ref(), 1, &self.settings.retry, &cancel),
        )
        .await
        .unwrap_or_else(|_| {
            report.timed_out = true;
            cancel.cancel();
            Err(FetchError::Interrupted { page: 1 })
        });

        let first_body = match seed {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Could not fetch the first page, nothing to plan from");
                report.pages_planned = 1;
                report.record_failure(1, &e);
                report.interrupted = self.shutdown.is_cancelled();
                phase.advance(CrawlPhase::Aggregating)?;
                return self.persist_and_finish(report, batch, phase, started).await;
            }
        };

        let plan = plan_pages(&first_body, self.settings.page_size).capped(self.settings.max_pages);
        let total_pages = plan.total_pages;
        report.pages_planned = total_pages;
        tracing::info!("Total pages to crawl: {}", total_pages);

        phase.advance(CrawlPhase::Fetching)?;
        report.record_page(
            parse_page(1, &first_body, &self.normalizer, Utc::now()),
            &mut batch,
        );
        drop(first_body);

        let gate = AdmissionGate::new(self.settings.max_concurrent_fetches);
        let window = gate.capacity() * 2;
        let mut pending = plan.pages().skip(1);
        let mut tasks = JoinSet::new();

        let mut resolved = 1;
        loop {
            while tasks.len() < window && !cancel.is_cancelled() {
                let Some(page) = pending.next() else {
                    break;
                };
                report.page_states.insert(page, PageState::Queued);
                tasks.spawn(self.page_task(page, total_pages, &gate, &cancel));
            }

            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok(outcome))) => {
                    match outcome {
                        PageOutcome::Parsed(result) => report.record_page(result, &mut batch),
                        PageOutcome::Failed { page, error } => report.record_failure(page, &error),
                    }

                    resolved += 1;
                    if resolved % 10 == 0 {
                        tracing::info!(
                            "Progress: {}/{} pages resolved, {} fetching, {} quotes collected",
                            resolved,
                            total_pages,
                            gate.in_flight(),
                            batch.len()
                        );
                    }
                }
                Ok(Some(Err(e))) => {
                    tracing::error!("Page task ended abnormally: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        "Overall timeout of {:?} elapsed with {} page tasks outstanding, continuing with partial results",
                        self.settings.overall_timeout,
                        tasks.len()
                    );
                    report.timed_out = true;
                    cancel.cancel();
                    tasks.abort_all();
                    break;
                }
            }
        }

        let undispatched: Vec<u32> = pending.collect();
        if !undispatched.is_empty() {
            tracing::info!("{} pages were never dispatched", undispatched.len());
            for page in undispatched {
                report.page_states.insert(page, PageState::Abandoned);
            }
        }

        report.close_unresolved();
        report.interrupted = self.shutdown.is_cancelled();
        phase.advance(CrawlPhase::Aggregating)?;
        self.persist_and_finish(report, batch, phase, started).await
    }

    /// One page: wait for admission, fetch with retries, parse
    fn page_task(
        &self,
        page: u32,
        total_pages: u32,
        gate: &AdmissionGate,
        cancel: &CancellationToken,
    ) -> impl Future<Output = PageOutcome> + Send + 'static {
        let source = Arc::clone(&self.source);
        let normalizer = Arc::clone(&self.normalizer);
        let retry = self.settings.retry.clone();
        let gate = gate.clone();
        let cancel = cancel.clone();

        async move {
            let Some(_permit) = gate.admit(&cancel).await else {
                return PageOutcome::Failed {
                    page,
                    error: FetchError::Interrupted { page },
                };
            };

            tracing::debug!("Crawling page {}/{}", page, total_pages);
            match fetch_with_retry(source.as_ref(), page, &retry, &cancel).await {
                Ok(body) => PageOutcome::Parsed(parse_page(page, &body, &normalizer, Utc::now())),
                Err(error) => PageOutcome::Failed { page, error },
            }
        }
    }

    /// Writes the aggregate batch and closes the run ledger entry
    async fn persist_and_finish(
        &self,
        mut report: CrawlReport,
        batch: Vec<Quote>,
        mut phase: PhaseTracker,
        started: Instant,
    ) -> Result<CrawlReport, HarvestError> {
        phase.advance(CrawlPhase::Persisting)?;

        let sink = Arc::clone(&self.sink);
        let batch_len = batch.len() as u64;
        report.persisted = tokio::task::spawn_blocking(move || {
            let mut guard = lock_sink(&sink);
            persist_batch(&mut *guard, &batch)
        })
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Persistence task failed: {}", e);
            PersistSummary {
                saved: 0,
                failed: batch_len,
            }
        });

        phase.advance(CrawlPhase::Done)?;
        report.phase = phase.current();
        report.elapsed = started.elapsed();

        if let Some(run_id) = report.run_id {
            if let Err(e) = lock_sink(&self.sink).finish_run(run_id, report.status(), &report.totals()) {
                tracing::warn!("Failed to record outcome of run {}: {}", run_id, e);
            }
        }

        if report.pages_without_payload > 0 {
            tracing::warn!(
                "{} page(s) returned a body with no listing payload",
                report.pages_without_payload
            );
        }
        tracing::info!(
            "Crawl finished in {:?}: {}/{} pages succeeded, {} quotes saved, {} failed",
            report.elapsed,
            report.pages_succeeded(),
            report.pages_planned,
            report.persisted.saved,
            report.persisted.failed
        );

        Ok(report)
    }

    fn begin_run(&self, mode: CrawlMode) -> Option<i64> {
        match lock_sink(&self.sink).create_run(&self.config_hash, mode.as_str()) {
            Ok(run_id) => run_id,
            Err(e) => {
                tracing::warn!("Failed to record start of crawl run: {}", e);
                None
            }
        }
    }
}

/// Locks the sink, recovering it if a previous holder panicked
fn lock_sink(sink: &SharedSink) -> MutexGuard<'_, dyn QuoteSink + Send + 'static> {
    match sink.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
