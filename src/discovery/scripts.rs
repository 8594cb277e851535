use std::collections::BTreeSet;
use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::HeliosError;
use crate::http::{apply_session, build_client, HttpSettings};
use crate::models::finding::{Finding, Severity};
use crate::models::session::SessionContext;
use crate::models::work_item::WorkItem;
use crate::scope::ScopeConfig;
use super::AdvancedScripts;

pub const POST_RESULT_TYPE: &str = "Post Script";

/// Origin sent by the CORS reflection check.
pub const CORS_PROBE_ORIGIN: &str = "https://helios-cors-probe.invalid";

const DANGEROUS_METHODS: &[&str] = &["PUT", "DELETE", "TRACE", "CONNECT"];
const MAX_SITEMAPS: usize = 5;
const SCRIPT_CONCURRENCY: usize = 4;

static LOC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<loc>\s*(.*?)\s*</loc>").unwrap());

/// Links harvested from a robots.txt body.
#[derive(Debug, Default, PartialEq)]
pub struct RobotsEntries {
    pub paths: Vec<String>,
    pub sitemaps: Vec<String>,
}

pub fn parse_robots(body: &str) -> RobotsEntries {
    let mut entries = RobotsEntries::default();
    for line in body.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match key.trim().to_ascii_lowercase().as_str() {
            "allow" | "disallow" => {
                // Wildcard rules are patterns, not paths
                let path = value.split(['*', '$']).next().unwrap_or("");
                if path.starts_with('/') && path.len() > 1 && path == value {
                    entries.paths.push(path.to_string());
                }
            }
            "sitemap" => entries.sitemaps.push(value.to_string()),
            _ => {}
        }
    }
    entries
}

pub fn parse_sitemap(body: &str) -> Vec<String> {
    LOC_RE
        .captures_iter(body)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().replace("&amp;", "&"))
        .collect()
}

/// Methods listed in an `Allow` header that a production server should not expose.
pub fn dangerous_methods(allow: &str) -> Vec<String> {
    allow
        .split(',')
        .map(|m| m.trim().to_ascii_uppercase())
        .filter(|m| DANGEROUS_METHODS.contains(&m.as_str()))
        .collect()
}

/// Severity of a CORS response to the probe origin, if it is a misconfiguration.
pub fn cors_severity(allow_origin: Option<&str>, allow_credentials: Option<&str>) -> Option<Severity> {
    let credentials = allow_credentials.is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
    match allow_origin.map(str::trim) {
        Some(origin) if origin == CORS_PROBE_ORIGIN => {
            Some(if credentials { Severity::High } else { Severity::Medium })
        }
        Some("null") if credentials => Some(Severity::Medium),
        _ => None,
    }
}

/// robots.txt and sitemap harvesting before the crawl, HTTP method and CORS
/// checks after the scan.
pub struct WebScripts {
    settings: HttpSettings,
}

impl WebScripts {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }

    async fn fetch_text(client: &Client, url: &str, session: &SessionContext) -> Option<String> {
        let response = apply_session(client.get(url), session).send().await.ok()?;
        if !response.status().is_success() {
            debug!(url, status = response.status().as_u16(), "Not found");
            return None;
        }
        response.text().await.ok()
    }

    async fn check_methods(client: &Client, origin: &Url, session: &SessionContext) -> Option<Finding> {
        let request = apply_session(client.request(reqwest::Method::OPTIONS, origin.as_str()), session);
        let response = request.send().await.ok()?;
        let allow = response
            .headers()
            .get(reqwest::header::ALLOW)
            .and_then(|v| v.to_str().ok())?
            .to_string();
        let methods = dangerous_methods(&allow);
        if methods.is_empty() {
            return None;
        }
        Some(
            Finding::new(
                POST_RESULT_TYPE,
                "http-methods",
                Severity::Medium,
                format!("Server allows {} (Allow: {})", methods.join(", "), allow),
            )
            .at(origin.as_str()),
        )
    }

    async fn check_cors(client: &Client, url: &str, session: &SessionContext) -> Option<Finding> {
        let request = apply_session(client.get(url), session).header(reqwest::header::ORIGIN, CORS_PROBE_ORIGIN);
        let response = request.send().await.ok()?;
        let header = |name: reqwest::header::HeaderName| response.headers().get(name).and_then(|v| v.to_str().ok());
        let allow_origin = header(reqwest::header::ACCESS_CONTROL_ALLOW_ORIGIN);
        let allow_credentials = header(reqwest::header::ACCESS_CONTROL_ALLOW_CREDENTIALS);
        let severity = cors_severity(allow_origin, allow_credentials)?;
        Some(
            Finding::new(
                POST_RESULT_TYPE,
                "cors",
                severity,
                format!(
                    "Arbitrary origin trusted (Access-Control-Allow-Origin: {}, credentials: {})",
                    allow_origin.unwrap_or(""),
                    allow_credentials.unwrap_or("false")
                ),
            )
            .at(url),
        )
    }
}

#[async_trait]
impl AdvancedScripts for WebScripts {
    async fn pre_crawl(
        &self,
        url: &str,
        scope: &ScopeConfig,
        session: &SessionContext,
    ) -> Result<Vec<String>, HeliosError> {
        let base = Url::parse(url).map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", url, e)))?;
        let client = build_client(&self.settings, None)?;
        let mut candidates = Vec::new();
        let mut sitemaps = Vec::new();

        if let Ok(robots_url) = base.join("/robots.txt") {
            if let Some(body) = Self::fetch_text(&client, robots_url.as_str(), session).await {
                let entries = parse_robots(&body);
                debug!(paths = entries.paths.len(), sitemaps = entries.sitemaps.len(), "Parsed robots.txt");
                candidates.extend(entries.paths.iter().filter_map(|p| base.join(p).ok()).map(String::from));
                sitemaps.extend(entries.sitemaps);
            }
        }
        if sitemaps.is_empty() {
            if let Ok(default) = base.join("/sitemap.xml") {
                sitemaps.push(default.to_string());
            }
        }

        for sitemap in sitemaps.iter().take(MAX_SITEMAPS) {
            if !scope.in_scope(sitemap) {
                debug!(sitemap, "Sitemap out of scope");
                continue;
            }
            if let Some(body) = Self::fetch_text(&client, sitemap, session).await {
                candidates.extend(parse_sitemap(&body));
            }
        }

        let mut seen = BTreeSet::new();
        let links: Vec<String> = candidates
            .into_iter()
            .filter(|link| scope.in_scope(link))
            .filter(|link| seen.insert(link.clone()))
            .collect();
        info!(links = links.len(), "Pre-crawl scripts finished");
        Ok(links)
    }

    async fn post_scan(&self, work: &[WorkItem], session: &SessionContext) -> Result<Vec<Finding>, HeliosError> {
        let client = build_client(&self.settings, None)?;

        let mut origins: Vec<Url> = Vec::new();
        let mut cors_targets: Vec<String> = Vec::new();
        for item in work {
            let Ok(parsed) = Url::parse(&item.url) else {
                warn!(url = %item.url, "Skipping unparsable work item");
                continue;
            };
            let Ok(origin) = parsed.join("/") else { continue };
            if !origins.contains(&origin) {
                origins.push(origin);
                cors_targets.push(item.url.clone());
            }
        }

        let origin_count = origins.len();
        let session = Arc::new(session.clone());
        let mut findings: Vec<Finding> = stream::iter(origins)
            .map(|origin| {
                let client = client.clone();
                let session = Arc::clone(&session);
                async move { Self::check_methods(&client, &origin, &session).await }
            })
            .buffered(SCRIPT_CONCURRENCY)
            .filter_map(|f| async move { f })
            .collect()
            .await;
        let cors: Vec<Finding> = stream::iter(cors_targets)
            .map(|url| {
                let client = client.clone();
                let session = Arc::clone(&session);
                async move { Self::check_cors(&client, &url, &session).await }
            })
            .buffered(SCRIPT_CONCURRENCY)
            .filter_map(|f| async move { f })
            .collect()
            .await;
        findings.extend(cors);

        info!(origins = origin_count, findings = findings.len(), "Post scripts finished");
        Ok(findings)
    }
}
