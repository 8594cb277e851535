use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::stream::{self, StreamExt};
use reqwest::cookie::Jar;
use reqwest::Client;
use tracing::{debug, info, warn};
use url::Url;

use crate::errors::HeliosError;
use crate::http::{build_client, jar_cookies, seed_jar, HttpSettings};
use crate::models::session::SessionContext;
use crate::models::work_item::WorkItem;
use crate::scope::ScopeConfig;
use super::extract::extract_work_items;
use super::{file_type, CrawlJob, CrawlOutput, Crawler, BLOCKED_FILETYPES};

const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// Breadth-first crawler over plain HTTP. Each frontier level is fetched
/// with at most `thread_count` requests in flight.
pub struct HttpCrawler {
    settings: HttpSettings,
}

impl HttpCrawler {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }

    fn accepts(&self, item: &WorkItem, scope: &ScopeConfig) -> bool {
        if !scope.in_scope(&item.url) {
            return false;
        }
        match file_type(&item.url) {
            Some(ext) => !BLOCKED_FILETYPES.contains(&ext.as_str()),
            None => true,
        }
    }
}

struct Fetched {
    item: WorkItem,
    html: Option<String>,
}

async fn fetch(client: &Client, item: WorkItem, session: &SessionContext) -> Option<Fetched> {
    let mut request = match &item.body {
        Some(body) => client
            .post(&item.url)
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(body.clone()),
        None => client.get(&item.url),
    };
    for (name, value) in &session.headers {
        request = request.header(name.as_str(), value.as_str());
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) => {
            debug!(url = %item.url, error = %e, "Fetch failed");
            return None;
        }
    };

    let is_html = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.contains("html"))
        .unwrap_or(true);

    let html = if is_html {
        match response.text().await {
            Ok(text) if text.len() <= MAX_BODY_BYTES => Some(text),
            Ok(_) => None,
            Err(e) => {
                debug!(url = %item.url, error = %e, "Failed to read body");
                None
            }
        }
    } else {
        None
    };
    Some(Fetched { item, html })
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn crawl(&self, job: CrawlJob) -> Result<CrawlOutput, HeliosError> {
        let start = Url::parse(&job.start_url)
            .map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", job.start_url, e)))?;

        let jar = Arc::new(Jar::default());
        seed_jar(&jar, &start, &job.session.cookies);
        let settings = HttpSettings {
            user_agent: job.user_agent.clone().or_else(|| self.settings.user_agent.clone()),
            ..self.settings.clone()
        };
        let client = build_client(&settings, Some(jar.clone()))?;

        let visited: DashMap<WorkItem, ()> = DashMap::new();
        let mut frontier: Vec<WorkItem> = std::iter::once(job.start_url.clone())
            .chain(job.extra_seeds.iter().cloned())
            .map(WorkItem::get)
            .filter(|item| self.accepts(item, &job.scope))
            .collect();
        let mut pages: Vec<WorkItem> = Vec::new();
        let threads = job.thread_count.max(1);
        let session = Arc::new(job.session.clone());

        info!(seeds = frontier.len(), max_urls = job.max_urls, threads, "Crawl started");

        while !frontier.is_empty() && pages.len() < job.max_urls {
            let budget = job.max_urls - pages.len();
            let level: Vec<WorkItem> = std::mem::take(&mut frontier);

            let claimed: Vec<WorkItem> = level
                .into_iter()
                .filter(|item| visited.insert(item.clone(), ()).is_none())
                .take(budget)
                .collect();

            let fetched: Vec<Fetched> = stream::iter(claimed)
                .map(|item| {
                    let client = client.clone();
                    let session = Arc::clone(&session);
                    async move { fetch(&client, item, &session).await }
                })
                .buffered(threads)
                .filter_map(|f| async move { f })
                .collect()
                .await;

            for page in fetched {
                if let Some(html) = &page.html {
                    if let Ok(page_url) = Url::parse(&page.item.url) {
                        for link in extract_work_items(&page_url, html) {
                            if !visited.contains_key(&link) && self.accepts(&link, &job.scope) {
                                frontier.push(link);
                            }
                        }
                    }
                }
                debug!(page = %page.item, "Scraped");
                pages.push(page.item);
            }
        }

        if pages.is_empty() {
            warn!(start_url = %job.start_url, "Crawler did not reach any page");
        }

        let mut cookies: BTreeMap<String, String> = job.session.cookies.clone();
        cookies.extend(jar_cookies(&jar, &start));
        info!(pages = pages.len(), cookies = cookies.len(), "Crawl finished");

        Ok(CrawlOutput { pages, cookies })
    }
}
