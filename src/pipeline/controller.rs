use std::collections::HashSet;
use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::crawl::{CrawlJob, Crawler};
use crate::db::ResultSink;
use crate::errors::HeliosError;
use crate::exploit::BridgeCredentials;
use crate::fingerprint::{CMS_RESULT_TYPE, WEBAPP_RESULT_TYPE};
use crate::models::finding::{Finding, Severity};
use crate::models::scan_tree::{CmsResults, ExploitResults, ScanTree, WebAppResults};
use crate::models::session::SessionContext;
use crate::models::work_item::WorkItem;
use crate::scan::ScanRequest;
use crate::scope::{ScopeConfig, ScopeOptions};
use super::collaborators::Collaborators;
use super::dedup::dedupe;
use super::events::{duration_ms, PipelineEvent};
use super::stage::Stage;
use super::state::{RunConfig, RunOutcome};

/// Owns the open result sink for one run and closes it at most once.
struct SinkSession {
    sink: Arc<dyn ResultSink>,
    closed: AtomicBool,
}

impl SinkSession {
    fn open(sink: Arc<dyn ResultSink>, path: &Path) -> Result<Self, HeliosError> {
        sink.open(path)?;
        Ok(Self { sink, closed: AtomicBool::new(false) })
    }

    fn put(&self, result_type: &str, script: &str, severity: Severity, text: &str) -> Result<(), HeliosError> {
        self.sink.put(result_type, script, severity, text)
    }

    fn close(&self) -> Result<(), HeliosError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.sink.close()
    }

    fn close_logged(&self) {
        if let Err(e) = self.close() {
            error!(error = %e, "Failed to close result sink");
        }
    }
}

impl Drop for SinkSession {
    fn drop(&mut self) {
        if !self.closed.load(Ordering::SeqCst) {
            debug!("Result sink closed on drop");
            self.close_logged();
        }
    }
}

/// Runs one scan end to end: stage sequencing, work-list hand-off between
/// stages, and the cleanup contract around the result sink.
pub struct ScanController {
    config: RunConfig,
    collaborators: Collaborators,
    cancel_token: CancellationToken,
    event_tx: Option<mpsc::UnboundedSender<PipelineEvent>>,
}

impl ScanController {
    pub fn new(config: RunConfig, collaborators: Collaborators) -> Self {
        Self {
            config,
            collaborators,
            cancel_token: CancellationToken::new(),
            event_tx: None,
        }
    }

    /// Use an external cancel token, e.g. one tripped by a Ctrl-C handler.
    pub fn with_cancel_token(mut self, token: CancellationToken) -> Self {
        self.cancel_token = token;
        self
    }

    /// Attach an event channel for progress rendering.
    pub fn with_event_channel(mut self, tx: mpsc::UnboundedSender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token.clone()
    }

    fn emit(&self, event: PipelineEvent) {
        if let Some(ref tx) = self.event_tx {
            let _ = tx.send(event);
        }
    }

    pub async fn run(&self, seed_urls: &[String], extra_scope_hosts: Option<&str>) -> Result<RunOutcome, HeliosError> {
        let seed_url = seed_urls
            .first()
            .ok_or_else(|| HeliosError::Config("No start URL supplied".into()))?;
        let options = ScopeOptions::parse(self.config.scope_options.as_deref())?;
        let scope = ScopeConfig::new(seed_url, options)?.with_extra_hosts(extra_scope_hosts)?;
        info!(seed_url = %seed_url, scope_host = scope.host(), seeds = seed_urls.len(), "Scan starting");

        let sink = match SinkSession::open(self.collaborators.sink.clone(), &self.config.database_path) {
            Ok(sink) => sink,
            Err(e) => return self.conclude_error(e),
        };

        let result = match sink.sink.record_run_start(seed_url, scope.host()) {
            Ok(()) => {
                self.emit(PipelineEvent::RunStarted {
                    seed_url: seed_url.clone(),
                    scope_host: scope.host().to_string(),
                });
                self.execute(seed_urls, &scope, &sink).await
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(tree) => {
                info!(
                    crawled = tree.crawled_count,
                    scanned = tree.scanned_count,
                    findings = tree.total_findings(),
                    duration_ms = tree.duration_ms(),
                    "Scan complete"
                );
                self.emit(PipelineEvent::RunCompleted {
                    total_findings: tree.total_findings(),
                    crawled: tree.crawled_count,
                    scanned: tree.scanned_count,
                    duration_ms: tree.duration_ms(),
                });
                Ok(RunOutcome::Completed(Box::new(tree)))
            }
            Err(HeliosError::Interrupted) => {
                sink.close_logged();
                warn!("Scan interrupted by user, shutting down");
                self.emit(PipelineEvent::RunInterrupted);
                Ok(RunOutcome::Interrupted)
            }
            Err(e) => {
                sink.close_logged();
                self.conclude_error(e)
            }
        }
    }

    /// Top-level error boundary. Cleanup has already happened.
    fn conclude_error(&self, error: HeliosError) -> Result<RunOutcome, HeliosError> {
        error!(error = %error, error_type = error.classify().error_type, "Scan failed");
        self.emit(PipelineEvent::RunFailed { error: error.to_string() });
        if self.config.error_policy.propagate {
            Err(error)
        } else {
            warn!("Critical error received, shutting down");
            Ok(RunOutcome::Aborted { error })
        }
    }

    fn check_cancelled(&self) -> Result<(), HeliosError> {
        if self.cancel_token.is_cancelled() {
            Err(HeliosError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Whether a stage runs. Disabled stages are reported as skipped.
    fn activate(&self, stage: Stage) -> bool {
        let enabled = self.config.stage_enabled(stage);
        if !enabled {
            debug!(stage = %stage, "Stage disabled");
            self.emit(PipelineEvent::StageSkipped { stage, display_name: stage.display_name() });
        }
        enabled
    }

    /// Await one stage, racing it against the cancel token.
    async fn run_stage<T, F>(&self, stage: Stage, fut: F) -> Result<T, HeliosError>
    where
        F: Future<Output = Result<T, HeliosError>>,
    {
        let display_name = stage.display_name();
        self.emit(PipelineEvent::StageStarted { stage, display_name });
        let started = Instant::now();

        let result = tokio::select! {
            biased;
            _ = self.cancel_token.cancelled() => Err(HeliosError::Interrupted),
            r = fut => r.map_err(|e| e.in_stage(stage.as_str())),
        };

        match &result {
            Ok(_) => {
                let elapsed = duration_ms(started.elapsed());
                debug!(stage = %stage, duration_ms = elapsed, "Stage complete");
                self.emit(PipelineEvent::StageCompleted { stage, display_name, duration_ms: elapsed });
            }
            Err(HeliosError::Interrupted) => {}
            Err(e) => {
                self.emit(PipelineEvent::StageFailed { stage, display_name, error: e.to_string() });
            }
        }
        result
    }

    fn record_findings(&self, sink: &SinkSession, stage: Stage, findings: &[Finding]) -> Result<(), HeliosError> {
        for finding in findings {
            sink.put(&finding.result_type, &finding.script, finding.severity, &finding.text)?;
        }
        self.emit(PipelineEvent::FindingsRecorded { stage, count: findings.len() });
        Ok(())
    }

    async fn execute(&self, seed_urls: &[String], scope: &ScopeConfig, sink: &SinkSession) -> Result<ScanTree, HeliosError> {
        let start_time = Utc::now();
        let seed_url = &seed_urls[0];
        let user_agent = self.config.user_agent.as_deref();
        let mut session = SessionContext::new();

        if self.activate(Stage::Login) {
            let login = self.config.login.clone().unwrap_or_default();
            session.merge_headers(login.header_map());
            let authenticated = self
                .run_stage(Stage::Login, self.collaborators.login.pre_parse(&login))
                .await?;
            match authenticated {
                Some(result) => {
                    info!(cookies = result.cookies.len(), headers = result.headers.len(), "Login session established");
                    session.merge_headers(result.headers);
                    session.merge_cookies(result.cookies);
                }
                None => warn!("Login did not return a session, continuing without cookies"),
            }
        }

        let mut fs_links = Vec::new();
        if self.activate(Stage::FilesystemDiscovery) {
            info!("Starting filesystem discovery (pre-crawler)");
            fs_links = self
                .run_stage(Stage::FilesystemDiscovery, self.collaborators.filesystem.discover(seed_url, &session))
                .await?;
            debug!(links = fs_links.len(), "Filesystem discovery links");
        }

        let mut script_links = Vec::new();
        if self.activate(Stage::PreCrawlScripts) {
            info!("Running custom scripts (pre-crawler)");
            script_links = self
                .run_stage(
                    Stage::PreCrawlScripts,
                    self.collaborators.scripts.pre_crawl(seed_url, scope, &session),
                )
                .await?;
            for link in &script_links {
                debug!(link = %link, "Adding link from pre-crawl scripts");
            }
        }

        let (mut work, pages) = if self.activate(Stage::Crawl) {
            info!("Starting Crawler");
            let job = CrawlJob {
                start_url: seed_url.clone(),
                extra_seeds: seed_urls[1..]
                    .iter()
                    .cloned()
                    .chain(fs_links)
                    .chain(script_links)
                    .collect(),
                thread_count: self.config.governor.clamp(self.config.thread_count, 0),
                max_urls: self.config.max_urls,
                scope: scope.clone(),
                session: session.clone(),
                user_agent: self.config.user_agent.clone(),
            };
            let output = self.run_stage(Stage::Crawl, self.collaborators.crawler.crawl(job)).await?;
            debug!(cookies = ?output.cookies.keys().collect::<Vec<_>>(), "Cookies set during crawl");
            session.merge_cookies(output.cookies);
            info!("Creating unique link/post data list");
            (dedupe(output.pages.clone()), output.pages)
        } else {
            (vec![WorkItem::get(seed_url.clone())], Vec::new())
        };
        let crawled = pages.len();

        if self.activate(Stage::BrowserDiscovery) {
            info!("Running browser driver");
            let candidates = self
                .run_stage(
                    Stage::BrowserDiscovery,
                    self.collaborators.browser.run(&work, self.config.browser.interactive),
                )
                .await?;
            let before = work.len();
            work.extend(filter_browser_candidates(candidates, scope, self.collaborators.crawler.as_ref(), &pages));
            info!("Creating unique link/post data list");
            work = dedupe(work);
            debug!(added = work.len().saturating_sub(before), "Browser driver discovered more url/post data pairs");
        }

        let thread_count = self.config.governor.clamp(self.config.thread_count, work.len());

        let mut findings = Vec::new();
        if self.activate(Stage::Scan) {
            info!(threads = thread_count, items = work.len(), "Starting scan sequence");
            let queue: Vec<ScanRequest> = work
                .iter()
                .map(|item| {
                    debug!(item = %item, "Queued");
                    ScanRequest::new(item, user_agent, &session)
                })
                .collect();
            findings = self
                .run_stage(Stage::Scan, self.collaborators.scanner.scan(queue, thread_count))
                .await?;
            self.record_findings(sink, Stage::Scan, &findings)?;
        }

        let mut post_results = Vec::new();
        if self.activate(Stage::PostExploitation) {
            info!("Running post scripts");
            post_results = self
                .run_stage(Stage::PostExploitation, self.collaborators.scripts.post_scan(&work, &session))
                .await?;
            self.record_findings(sink, Stage::PostExploitation, &post_results)?;
        }

        let mut cms_results = CmsResults::new();
        if self.activate(Stage::CmsFingerprint) {
            cms_results = self
                .run_stage(Stage::CmsFingerprint, self.collaborators.cms.run_scripts(seed_url))
                .await?;
            let mut count = 0;
            for (script, results) in &cms_results {
                for text in results {
                    sink.put(CMS_RESULT_TYPE, script, Severity::Info, text)?;
                    count += 1;
                }
            }
            self.emit(PipelineEvent::FindingsRecorded { stage: Stage::CmsFingerprint, count });
        }

        let mut webapp_results = WebAppResults::new();
        if self.activate(Stage::WebAppFingerprint) {
            webapp_results = self
                .run_stage(
                    Stage::WebAppFingerprint,
                    self.fingerprint_webapps(seed_url, scope, &session),
                )
                .await?;
            let mut count = 0;
            for (script, results) in &webapp_results {
                for payload in results {
                    sink.put(WEBAPP_RESULT_TYPE, script, Severity::Info, &serde_json::to_string(payload)?)?;
                    count += 1;
                }
            }
            self.emit(PipelineEvent::FindingsRecorded { stage: Stage::WebAppFingerprint, count });
        }

        let mut exploit_results = ExploitResults::new();
        if self.activate(Stage::ExploitCorrelation) {
            match BridgeCredentials::parse(&self.config.exploit.credentials) {
                Ok(credentials) => {
                    exploit_results = self
                        .run_stage(Stage::ExploitCorrelation, self.correlate(seed_url, &credentials))
                        .await?;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping exploit correlation, expected username:password");
                    self.emit(PipelineEvent::StageSkipped {
                        stage: Stage::ExploitCorrelation,
                        display_name: Stage::ExploitCorrelation.display_name(),
                    });
                }
            }
        }

        self.check_cancelled()?;
        self.emit(PipelineEvent::StageStarted {
            stage: Stage::ReportAssembly,
            display_name: Stage::ReportAssembly.display_name(),
        });
        let assembly_started = Instant::now();
        let scanned_count = if self.config.stage_enabled(Stage::Scan) { work.len() } else { 0 };
        let tree = ScanTree {
            start_time,
            end_time: Utc::now(),
            scope_host: scope.host().to_string(),
            start_url: seed_url.clone(),
            crawled_count: crawled,
            scanned_count,
            findings,
            exploit_results,
            cms_results,
            webapp_results,
            post_results,
        };
        sink.sink.record_report(&tree)?;
        sink.close()?;

        if let Some(path) = &self.config.output_path {
            let json = serde_json::to_string_pretty(&tree)?;
            tokio::fs::write(path, json).await?;
            info!(path = %path.display(), "Wrote results to file");
        }
        self.emit(PipelineEvent::StageCompleted {
            stage: Stage::ReportAssembly,
            display_name: Stage::ReportAssembly.display_name(),
            duration_ms: duration_ms(assembly_started.elapsed()),
        });
        Ok(tree)
    }

    async fn fingerprint_webapps(
        &self,
        url: &str,
        scope: &ScopeConfig,
        session: &SessionContext,
    ) -> Result<WebAppResults, HeliosError> {
        let modules = self.collaborators.webapp.load_modules()?;
        debug!(modules, "WebApp modules loaded");
        self.collaborators.webapp.run_scripts(url, scope, session).await
    }

    async fn correlate(&self, url: &str, credentials: &BridgeCredentials) -> Result<ExploitResults, HeliosError> {
        let mut client = self.collaborators.exploit.connect(url, credentials).await?;
        if !client.is_working() {
            warn!("Exploit bridge did not return a working client, skipping correlation");
            return Ok(ExploitResults::new());
        }
        client.load_exploit_modules().await?;
        client.detect().await?;
        let queries = client.build_queries();
        debug!(queries = queries.len(), "Running exploit queries");
        client.run_queries(&queries).await?;
        Ok(client.results())
    }
}

/// Keep browser candidates that are in scope, not a blocked file type, and
/// not already crawled.
fn filter_browser_candidates(
    candidates: Vec<WorkItem>,
    scope: &ScopeConfig,
    crawler: &dyn Crawler,
    crawled: &[WorkItem],
) -> Vec<WorkItem> {
    let crawled: HashSet<&WorkItem> = crawled.iter().collect();
    candidates
        .into_iter()
        .filter(|item| {
            if !scope.in_scope(&item.url) {
                debug!(item = %item, "IGNORE out-of-scope");
                return false;
            }
            if let Some(file_type) = crawler.file_type(&item.url) {
                if crawler.is_blocked_filetype(&file_type) {
                    debug!(item = %item, "IGNORE bad file-type");
                    return false;
                }
            }
            if crawled.contains(item) {
                debug!(item = %item, "IGNORE exists");
                return false;
            }
            debug!(item = %item, "QUEUE");
            true
        })
        .collect()
}
