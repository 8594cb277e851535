pub mod extract;
pub mod http;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::HeliosError;
use crate::models::session::SessionContext;
use crate::models::work_item::WorkItem;
use crate::scope::ScopeConfig;

pub use http::HttpCrawler;

/// Extensions the crawler never queues.
pub const BLOCKED_FILETYPES: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "bmp", "ico", "svg", "webp", "tif", "tiff",
    "woff", "woff2", "ttf", "eot", "otf",
    "mp3", "mp4", "avi", "mov", "wmv", "flv", "webm", "ogg", "wav",
    "zip", "gz", "tar", "rar", "7z", "bz2",
    "css", "pdf",
];

/// Everything the crawler needs for one run.
#[derive(Debug, Clone)]
pub struct CrawlJob {
    pub start_url: String,
    /// Additional seeds, in submission order.
    pub extra_seeds: Vec<String>,
    pub thread_count: usize,
    pub max_urls: usize,
    pub scope: ScopeConfig,
    pub session: SessionContext,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    /// Pages visited, in the order they were scraped. May contain duplicates.
    pub pages: Vec<WorkItem>,
    /// Cookies observed during the crawl.
    pub cookies: BTreeMap<String, String>,
}

#[async_trait]
pub trait Crawler: Send + Sync {
    async fn crawl(&self, job: CrawlJob) -> Result<CrawlOutput, HeliosError>;

    /// Lowercased extension of the URL's last path segment.
    fn file_type(&self, url: &str) -> Option<String> {
        file_type(url)
    }

    fn is_blocked_filetype(&self, file_type: &str) -> bool {
        BLOCKED_FILETYPES.contains(&file_type)
    }
}

pub fn file_type(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.last()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
