pub mod checks;
pub mod engine;

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::HeliosError;
use crate::models::finding::Finding;
use crate::models::session::SessionContext;
use crate::models::work_item::WorkItem;

pub use checks::CheckCategory;
pub use engine::HttpScanner;

/// One request for the scanner to issue and inspect.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub url: String,
    pub body: Option<String>,
    pub user_agent: Option<String>,
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl ScanRequest {
    pub fn new(item: &WorkItem, user_agent: Option<&str>, session: &SessionContext) -> Self {
        Self {
            url: item.url.clone(),
            body: item.body.clone(),
            user_agent: user_agent.map(str::to_string),
            headers: session.headers.clone(),
            cookies: session.cookies.clone(),
        }
    }
}

#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan every request with at most `threads` in flight. Findings come
    /// back in queue order.
    async fn scan(&self, queue: Vec<ScanRequest>, threads: usize) -> Result<Vec<Finding>, HeliosError>;
}
