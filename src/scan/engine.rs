use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info};

use crate::errors::HeliosError;
use crate::http::{build_client, HttpSettings};
use crate::models::finding::{Finding, Severity};
use crate::models::session::render_cookie_header;
use super::checks::{
    reflected_unescaped, reflection_probe_url, run_passive_checks, CheckCategory, ResponseSnapshot,
    INJECTION_RESULT_TYPE,
};
use super::{ScanRequest, Scanner};

const MAX_SNAPSHOT_BYTES: usize = 1024 * 1024;

/// Worker-pool scanner. Each request is fetched once and run through the
/// enabled checks.
pub struct HttpScanner {
    settings: HttpSettings,
    categories: Arc<BTreeSet<CheckCategory>>,
}

impl HttpScanner {
    pub fn new(settings: HttpSettings, scan_options: &[String]) -> Result<Self, HeliosError> {
        let categories = CheckCategory::from_options(scan_options)?;
        debug!(?categories, "Scanner check categories");
        Ok(Self { settings, categories: Arc::new(categories) })
    }
}

async fn scan_one(client: Client, categories: Arc<BTreeSet<CheckCategory>>, request: ScanRequest) -> Vec<Finding> {
    let mut findings = match snapshot(&client, &request, &request.url).await {
        Ok(snap) => run_passive_checks(&snap, &categories),
        Err(e) => {
            debug!(url = %request.url, error = %e, "Scan request failed");
            return Vec::new();
        }
    };

    if categories.contains(&CheckCategory::Injection) && request.body.is_none() {
        if let Some(probe) = reflection_probe_url(&request.url) {
            match snapshot(&client, &request, &probe).await {
                Ok(snap) if reflected_unescaped(&snap.body) => findings.push(
                    Finding::new(
                        INJECTION_RESULT_TYPE,
                        "reflected-parameter",
                        Severity::Medium,
                        "Query parameter value reflected without HTML encoding",
                    )
                    .at(&request.url),
                ),
                Ok(_) => {}
                Err(e) => debug!(url = %probe, error = %e, "Reflection probe failed"),
            }
        }
    }

    findings
}

async fn snapshot(client: &Client, request: &ScanRequest, url: &str) -> Result<ResponseSnapshot, HeliosError> {
    let mut builder = match &request.body {
        Some(body) => client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.clone()),
        None => client.get(url),
    };
    if let Some(agent) = &request.user_agent {
        builder = builder.header(reqwest::header::USER_AGENT, agent.as_str());
    }
    for (name, value) in &request.headers {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(cookie) = render_cookie_header(&request.cookies) {
        builder = builder.header(reqwest::header::COOKIE, cookie);
    }

    let response = builder.send().await?;
    let mut snap = ResponseSnapshot {
        url: url.to_string(),
        status: response.status().as_u16(),
        ..Default::default()
    };
    for (name, value) in response.headers() {
        let Ok(value) = value.to_str() else { continue };
        if *name == reqwest::header::SET_COOKIE {
            snap.set_cookies.push(value.to_string());
            continue;
        }
        snap.headers
            .entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    let mut body = response.text().await?;
    if body.len() > MAX_SNAPSHOT_BYTES {
        let mut cut = MAX_SNAPSHOT_BYTES;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    snap.body = body;
    Ok(snap)
}

/// Drop repeated site-wide findings, keeping the first occurrence in queue order.
fn collapse_repeats(findings: Vec<Finding>) -> Vec<Finding> {
    let mut seen: HashSet<(String, String)> = HashSet::new();
    findings
        .into_iter()
        .filter(|f| seen.insert((f.script.clone(), f.text.clone())))
        .collect()
}

#[async_trait]
impl Scanner for HttpScanner {
    async fn scan(&self, queue: Vec<ScanRequest>, threads: usize) -> Result<Vec<Finding>, HeliosError> {
        let client = build_client(&self.settings, None)?;
        let total = queue.len();
        info!(requests = total, threads, "Scan sequence started");

        let per_request: Vec<Vec<Finding>> = stream::iter(queue)
            .map(|request| scan_one(client.clone(), Arc::clone(&self.categories), request))
            .buffered(threads.max(1))
            .collect()
            .await;

        let findings = collapse_repeats(per_request.into_iter().flatten().collect());
        info!(requests = total, findings = findings.len(), "Scan sequence finished");
        Ok(findings)
    }
}
