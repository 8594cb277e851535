use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info};
use url::Url;

use crate::errors::HeliosError;
use crate::http::{apply_session, build_client, HttpSettings};
use crate::models::session::SessionContext;
use super::FilesystemDiscovery;

/// Paths probed against every target.
pub const COMMON_PATHS: &[&str] = &[
    "admin/", "administrator/", "api/", "backup/", "backups/", "cgi-bin/", "config/",
    "console/", "dev/", "docs/", "logs/", "old/", "private/", "test/", "tmp/", "uploads/",
    ".env", ".git/HEAD", ".htaccess", ".htpasswd", ".svn/entries", ".DS_Store",
    "backup.sql", "backup.zip", "composer.json", "config.php", "config.json",
    "database.sql", "db.sql", "package.json", "phpinfo.php", "server-status",
    "web.config", "wp-config.php.bak", "crossdomain.xml",
];

const PROBE_CONCURRENCY: usize = 8;

/// Response shape of a path that is known not to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Baseline {
    pub status: u16,
    pub length: usize,
}

impl Baseline {
    /// True when a probe response is indistinguishable from the not-found page.
    pub fn matches(&self, status: u16, length: usize) -> bool {
        if status != self.status {
            return false;
        }
        let tolerance = (self.length / 20).max(16);
        length.abs_diff(self.length) <= tolerance
    }
}

fn is_interesting(status: u16) -> bool {
    (200..400).contains(&status) || status == 401 || status == 403
}

/// Soft-404 aware probe of [`COMMON_PATHS`].
pub struct PathProber {
    settings: HttpSettings,
    paths: Vec<String>,
}

impl PathProber {
    pub fn new(settings: HttpSettings) -> Self {
        Self {
            settings,
            paths: COMMON_PATHS.iter().map(|p| p.to_string()).collect(),
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }

    async fn fetch(client: &Client, url: &Url, session: &SessionContext) -> Option<(u16, usize)> {
        let response = apply_session(client.get(url.as_str()), session).send().await.ok()?;
        let status = response.status().as_u16();
        let length = response.bytes().await.map(|b| b.len()).unwrap_or(0);
        Some((status, length))
    }
}

#[async_trait]
impl FilesystemDiscovery for PathProber {
    async fn discover(&self, url: &str, session: &SessionContext) -> Result<Vec<String>, HeliosError> {
        let base = Url::parse(url).map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", url, e)))?;
        let client = build_client(&self.settings, None)?;

        let random = base
            .join(&format!("/{}", uuid::Uuid::new_v4()))
            .map_err(|e| HeliosError::Internal(e.to_string()))?;
        let baseline = Self::fetch(&client, &random, session)
            .await
            .map(|(status, length)| Baseline { status, length });
        debug!(?baseline, "Soft-404 baseline");

        let candidates: Vec<Url> = self
            .paths
            .iter()
            .filter_map(|p| base.join(&format!("/{}", p.trim_start_matches('/'))).ok())
            .collect();

        let session = Arc::new(session.clone());
        let found: Vec<String> = stream::iter(candidates)
            .map(|candidate| {
                let client = client.clone();
                let session = Arc::clone(&session);
                async move {
                    let (status, length) = Self::fetch(&client, &candidate, &session).await?;
                    if !is_interesting(status) {
                        return None;
                    }
                    if baseline.is_some_and(|b| b.matches(status, length)) {
                        return None;
                    }
                    debug!(url = %candidate, status, "Path exists");
                    Some(candidate.to_string())
                }
            })
            .buffered(PROBE_CONCURRENCY)
            .filter_map(|hit| async move { hit })
            .collect()
            .await;

        info!(probed = self.paths.len(), found = found.len(), "Filesystem discovery finished");
        Ok(found)
    }
}
