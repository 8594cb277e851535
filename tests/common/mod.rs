#![allow(dead_code)]

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use helios::auth::LoginModule;
use helios::browser::BrowserBridge;
use helios::config::LoginConfig;
use helios::crawl::{CrawlJob, CrawlOutput, Crawler};
use helios::db::ResultSink;
use helios::discovery::{AdvancedScripts, FilesystemDiscovery};
use helios::errors::HeliosError;
use helios::exploit::{BridgeCredentials, ExploitBridge, ExploitClient};
use helios::fingerprint::{CmsFingerprinter, WebAppFingerprinter};
use helios::models::{
    CmsResults, ExploitResults, Finding, ScanTree, SessionContext, Severity, WebAppResults, WorkItem,
};
use helios::pipeline::Collaborators;
use helios::scan::{ScanRequest, Scanner};
use helios::scope::ScopeConfig;

#[derive(Default)]
pub struct RecordingSink {
    pub fail_open: bool,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
    pub puts: Mutex<Vec<(String, String, Severity, String)>>,
    pub run_start: Mutex<Option<(String, String)>>,
    pub report: Mutex<Option<ScanTree>>,
}

impl RecordingSink {
    pub fn failing_open() -> Self {
        Self { fail_open: true, ..Default::default() }
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn puts(&self) -> Vec<(String, String, Severity, String)> {
        self.puts.lock().unwrap().clone()
    }
}

impl ResultSink for RecordingSink {
    fn open(&self, _path: &Path) -> Result<(), HeliosError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(HeliosError::Database("disk full".into()));
        }
        Ok(())
    }

    fn record_run_start(&self, seed_url: &str, scope_host: &str) -> Result<(), HeliosError> {
        *self.run_start.lock().unwrap() = Some((seed_url.to_string(), scope_host.to_string()));
        Ok(())
    }

    fn put(&self, result_type: &str, script: &str, severity: Severity, text: &str) -> Result<(), HeliosError> {
        self.puts
            .lock()
            .unwrap()
            .push((result_type.to_string(), script.to_string(), severity, text.to_string()));
        Ok(())
    }

    fn record_report(&self, report: &ScanTree) -> Result<(), HeliosError> {
        *self.report.lock().unwrap() = Some(report.clone());
        Ok(())
    }

    fn close(&self) -> Result<(), HeliosError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct MockLogin {
    pub session: Option<SessionContext>,
    pub seen: Mutex<Option<LoginConfig>>,
}

#[async_trait]
impl LoginModule for MockLogin {
    async fn pre_parse(&self, config: &LoginConfig) -> Result<Option<SessionContext>, HeliosError> {
        *self.seen.lock().unwrap() = Some(config.clone());
        Ok(self.session.clone())
    }
}

#[derive(Default)]
pub struct MockFilesystem {
    pub links: Vec<String>,
    pub calls: AtomicUsize,
}

#[async_trait]
impl FilesystemDiscovery for MockFilesystem {
    async fn discover(&self, _url: &str, _session: &SessionContext) -> Result<Vec<String>, HeliosError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.links.clone())
    }
}

#[derive(Default)]
pub struct MockScripts {
    pub links: Vec<String>,
    pub post: Vec<Finding>,
    pub post_work: Mutex<Vec<WorkItem>>,
}

#[async_trait]
impl AdvancedScripts for MockScripts {
    async fn pre_crawl(
        &self,
        _url: &str,
        _scope: &ScopeConfig,
        _session: &SessionContext,
    ) -> Result<Vec<String>, HeliosError> {
        Ok(self.links.clone())
    }

    async fn post_scan(&self, work: &[WorkItem], _session: &SessionContext) -> Result<Vec<Finding>, HeliosError> {
        *self.post_work.lock().unwrap() = work.to_vec();
        Ok(self.post.clone())
    }
}

#[derive(Default)]
pub struct MockCrawler {
    pub pages: Vec<WorkItem>,
    pub cookies: BTreeMap<String, String>,
    pub job: Mutex<Option<CrawlJob>>,
}

#[async_trait]
impl Crawler for MockCrawler {
    async fn crawl(&self, job: CrawlJob) -> Result<CrawlOutput, HeliosError> {
        *self.job.lock().unwrap() = Some(job);
        Ok(CrawlOutput { pages: self.pages.clone(), cookies: self.cookies.clone() })
    }
}

#[derive(Default)]
pub struct MockBrowser {
    pub candidates: Vec<WorkItem>,
    pub fail: bool,
}

#[async_trait]
impl BrowserBridge for MockBrowser {
    async fn run(&self, _work: &[WorkItem], _interactive: bool) -> Result<Vec<WorkItem>, HeliosError> {
        if self.fail {
            return Err(HeliosError::Browser("driver not found".into()));
        }
        Ok(self.candidates.clone())
    }
}

pub enum ScanBehavior {
    /// One finding per request.
    Echo,
    /// Cancel the token, then never finish.
    InterruptMidScan(CancellationToken),
    Fail,
}

pub struct MockScanner {
    pub behavior: ScanBehavior,
    pub queue: Mutex<Vec<ScanRequest>>,
    pub threads: Mutex<Option<usize>>,
}

impl MockScanner {
    pub fn new(behavior: ScanBehavior) -> Self {
        Self { behavior, queue: Mutex::new(Vec::new()), threads: Mutex::new(None) }
    }

    pub fn queue(&self) -> Vec<ScanRequest> {
        self.queue.lock().unwrap().clone()
    }
}

impl Default for MockScanner {
    fn default() -> Self {
        Self::new(ScanBehavior::Echo)
    }
}

#[async_trait]
impl Scanner for MockScanner {
    async fn scan(&self, queue: Vec<ScanRequest>, threads: usize) -> Result<Vec<Finding>, HeliosError> {
        *self.queue.lock().unwrap() = queue.clone();
        *self.threads.lock().unwrap() = Some(threads);
        match &self.behavior {
            ScanBehavior::Echo => Ok(queue
                .iter()
                .map(|r| Finding::new("Passive Check", "echo", Severity::Low, r.url.clone()).at(&r.url))
                .collect()),
            ScanBehavior::InterruptMidScan(token) => {
                token.cancel();
                std::future::pending().await
            }
            ScanBehavior::Fail => Err(HeliosError::Network("connection reset".into())),
        }
    }
}

#[derive(Default)]
pub struct MockCms {
    pub results: CmsResults,
}

#[async_trait]
impl CmsFingerprinter for MockCms {
    async fn run_scripts(&self, _url: &str) -> Result<CmsResults, HeliosError> {
        Ok(self.results.clone())
    }
}

#[derive(Default)]
pub struct MockWebApp {
    pub results: WebAppResults,
    pub loaded: AtomicBool,
}

#[async_trait]
impl WebAppFingerprinter for MockWebApp {
    fn load_modules(&self) -> Result<usize, HeliosError> {
        self.loaded.store(true, Ordering::SeqCst);
        Ok(1)
    }

    async fn run_scripts(
        &self,
        _url: &str,
        _scope: &ScopeConfig,
        _session: &SessionContext,
    ) -> Result<WebAppResults, HeliosError> {
        if !self.loaded.load(Ordering::SeqCst) {
            return Err(HeliosError::Internal("modules not loaded".into()));
        }
        Ok(self.results.clone())
    }
}

#[derive(Default)]
pub struct MockExploit {
    pub working: bool,
    pub results: ExploitResults,
    pub connects: AtomicUsize,
}

struct MockExploitClient {
    working: bool,
    results: ExploitResults,
    ran: bool,
}

#[async_trait]
impl ExploitClient for MockExploitClient {
    fn is_working(&self) -> bool {
        self.working
    }

    async fn load_exploit_modules(&mut self) -> Result<usize, HeliosError> {
        Ok(self.results.len())
    }

    async fn detect(&mut self) -> Result<(), HeliosError> {
        Ok(())
    }

    fn build_queries(&self) -> Vec<String> {
        self.results.keys().cloned().collect()
    }

    async fn run_queries(&mut self, _queries: &[String]) -> Result<(), HeliosError> {
        self.ran = true;
        Ok(())
    }

    fn results(&self) -> ExploitResults {
        if self.ran {
            self.results.clone()
        } else {
            ExploitResults::new()
        }
    }
}

#[async_trait]
impl ExploitBridge for MockExploit {
    async fn connect(&self, _url: &str, _credentials: &BridgeCredentials) -> Result<Box<dyn ExploitClient>, HeliosError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockExploitClient {
            working: self.working,
            results: self.results.clone(),
            ran: false,
        }))
    }
}

/// Mock collaborators with handles kept for inspection.
pub struct Fixture {
    pub login: Arc<MockLogin>,
    pub filesystem: Arc<MockFilesystem>,
    pub scripts: Arc<MockScripts>,
    pub crawler: Arc<MockCrawler>,
    pub browser: Arc<MockBrowser>,
    pub scanner: Arc<MockScanner>,
    pub cms: Arc<MockCms>,
    pub webapp: Arc<MockWebApp>,
    pub exploit: Arc<MockExploit>,
    pub sink: Arc<RecordingSink>,
}

impl Default for Fixture {
    fn default() -> Self {
        Self {
            login: Arc::new(MockLogin::default()),
            filesystem: Arc::new(MockFilesystem::default()),
            scripts: Arc::new(MockScripts::default()),
            crawler: Arc::new(MockCrawler::default()),
            browser: Arc::new(MockBrowser::default()),
            scanner: Arc::new(MockScanner::default()),
            cms: Arc::new(MockCms::default()),
            webapp: Arc::new(MockWebApp::default()),
            exploit: Arc::new(MockExploit::default()),
            sink: Arc::new(RecordingSink::default()),
        }
    }
}

impl Fixture {
    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            login: self.login.clone(),
            filesystem: self.filesystem.clone(),
            scripts: self.scripts.clone(),
            crawler: self.crawler.clone(),
            browser: self.browser.clone(),
            scanner: self.scanner.clone(),
            cms: self.cms.clone(),
            webapp: self.webapp.clone(),
            exploit: self.exploit.clone(),
            sink: self.sink.clone(),
        }
    }
}
