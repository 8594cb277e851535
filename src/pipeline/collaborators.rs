use std::sync::Arc;

use crate::auth::{LoginModule, WebAuthenticator};
use crate::browser::{BrowserBridge, DriverBridge};
use crate::crawl::{Crawler, HttpCrawler};
use crate::db::{ResultSink, SqliteSink};
use crate::discovery::{AdvancedScripts, FilesystemDiscovery, PathProber, WebScripts};
use crate::errors::HeliosError;
use crate::exploit::{ExploitBridge, MetasploitBridge};
use crate::fingerprint::{CmsFingerprinter, CmsScanner, WebAppFingerprinter, WebAppScanner};
use crate::http::HttpSettings;
use crate::scan::{HttpScanner, Scanner};
use super::state::RunConfig;

/// Every collaborator the controller drives, behind its trait.
#[derive(Clone)]
pub struct Collaborators {
    pub login: Arc<dyn LoginModule>,
    pub filesystem: Arc<dyn FilesystemDiscovery>,
    pub scripts: Arc<dyn AdvancedScripts>,
    pub crawler: Arc<dyn Crawler>,
    pub browser: Arc<dyn BrowserBridge>,
    pub scanner: Arc<dyn Scanner>,
    pub cms: Arc<dyn CmsFingerprinter>,
    pub webapp: Arc<dyn WebAppFingerprinter>,
    pub exploit: Arc<dyn ExploitBridge>,
    pub sink: Arc<dyn ResultSink>,
}

impl Collaborators {
    /// The built-in HTTP implementations, configured from the run.
    pub fn from_config(config: &RunConfig) -> Result<Self, HeliosError> {
        let settings = HttpSettings::from_run_config(config);
        Ok(Self {
            login: Arc::new(WebAuthenticator::new(settings.clone())),
            filesystem: Arc::new(PathProber::new(settings.clone())),
            scripts: Arc::new(WebScripts::new(settings.clone())),
            crawler: Arc::new(HttpCrawler::new(settings.clone())),
            browser: Arc::new(DriverBridge::new(config.browser.clone())),
            scanner: Arc::new(HttpScanner::new(settings.clone(), &config.scan_options)?),
            cms: Arc::new(CmsScanner::new(settings.clone())),
            webapp: Arc::new(WebAppScanner::new(settings.clone())),
            exploit: Arc::new(MetasploitBridge::new(config.exploit.clone(), settings)),
            sink: Arc::new(SqliteSink::new()),
        })
    }
}
