use std::sync::RwLock;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::HeliosError;
use crate::http::{build_client, HttpSettings};
use crate::models::scan_tree::WebAppResults;
use crate::models::session::SessionContext;
use crate::scope::ScopeConfig;
use super::signatures::{fetch_probes, match_signatures, probe_paths, Signature, WEBAPP_SIGNATURES};
use super::WebAppFingerprinter;

const WEBAPP_CONCURRENCY: usize = 4;

/// Application-server and framework detection (Tomcat, JBoss, Jenkins, ...).
pub struct WebAppScanner {
    settings: HttpSettings,
    modules: RwLock<Vec<Signature>>,
}

impl WebAppScanner {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings, modules: RwLock::new(Vec::new()) }
    }

    fn loaded(&self) -> Result<Vec<Signature>, HeliosError> {
        self.modules
            .read()
            .map(|m| m.clone())
            .map_err(|_| HeliosError::Internal("WebApp module lock poisoned".into()))
    }
}

#[async_trait]
impl WebAppFingerprinter for WebAppScanner {
    fn load_modules(&self) -> Result<usize, HeliosError> {
        let mut modules = self
            .modules
            .write()
            .map_err(|_| HeliosError::Internal("WebApp module lock poisoned".into()))?;
        *modules = WEBAPP_SIGNATURES.to_vec();
        debug!(count = modules.len(), "Loaded WebApp modules");
        Ok(modules.len())
    }

    async fn run_scripts(
        &self,
        url: &str,
        scope: &ScopeConfig,
        session: &SessionContext,
    ) -> Result<WebAppResults, HeliosError> {
        let modules = self.loaded()?;
        if modules.is_empty() {
            warn!("No WebApp modules loaded");
            return Ok(WebAppResults::new());
        }
        let base = Url::parse(url).map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", url, e)))?;
        let client = build_client(&self.settings, None)?;

        let targets = probe_paths(&modules)
            .into_iter()
            .filter_map(|path| Some((path, base.join(path).ok()?)))
            .filter(|(_, probe)| scope.in_scope(probe.as_str()))
            .collect();
        let probes = fetch_probes(&client, targets, session, WEBAPP_CONCURRENCY).await;

        let mut results = WebAppResults::new();
        for (detection, probe_url) in match_signatures(&modules, &probes) {
            results.entry(detection.name.to_string()).or_default().push(json!({
                "url": probe_url.as_str(),
                "version": detection.version,
                "evidence": detection.description,
            }));
        }
        info!(detected = results.len(), "WebApp fingerprinting finished");
        Ok(results)
    }
}
