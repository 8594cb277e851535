use async_trait::async_trait;
use tracing::info;
use url::Url;

use crate::errors::HeliosError;
use crate::http::{build_client, HttpSettings};
use crate::models::scan_tree::CmsResults;
use crate::models::session::SessionContext;
use super::signatures::{fetch_probes, match_signatures, probe_paths, Detection, CMS_SIGNATURES};
use super::CmsFingerprinter;

const CMS_CONCURRENCY: usize = 4;

/// Signature-table CMS detection against the start URL's host.
pub struct CmsScanner {
    settings: HttpSettings,
}

impl CmsScanner {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }
}

pub(crate) fn describe(detection: &Detection, url: &Url) -> String {
    match &detection.version {
        Some(version) => format!("{} version {} ({} at {})", detection.name, version, detection.description, url),
        None => format!("{} detected ({} at {})", detection.name, detection.description, url),
    }
}

#[async_trait]
impl CmsFingerprinter for CmsScanner {
    async fn run_scripts(&self, url: &str) -> Result<CmsResults, HeliosError> {
        let base = Url::parse(url).map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", url, e)))?;
        let client = build_client(&self.settings, None)?;
        let targets = probe_paths(CMS_SIGNATURES)
            .into_iter()
            .filter_map(|path| Some((path, base.join(path).ok()?)))
            .collect();
        let probes = fetch_probes(&client, targets, &SessionContext::new(), CMS_CONCURRENCY).await;

        let mut results = CmsResults::new();
        for (detection, probe_url) in match_signatures(CMS_SIGNATURES, &probes) {
            results
                .entry(detection.name.to_string())
                .or_default()
                .push(describe(&detection, &probe_url));
        }
        info!(detected = results.len(), "CMS fingerprinting finished");
        Ok(results)
    }
}
