pub mod filesystem;
pub mod scripts;

use async_trait::async_trait;

use crate::errors::HeliosError;
use crate::models::finding::Finding;
use crate::models::session::SessionContext;
use crate::models::work_item::WorkItem;
use crate::scope::ScopeConfig;

pub use filesystem::PathProber;
pub use scripts::{WebScripts, POST_RESULT_TYPE};

/// Finds interesting paths on the target before crawling starts.
#[async_trait]
pub trait FilesystemDiscovery: Send + Sync {
    async fn discover(&self, url: &str, session: &SessionContext) -> Result<Vec<String>, HeliosError>;
}

/// Scripts that run around the crawl and scan stages.
#[async_trait]
pub trait AdvancedScripts: Send + Sync {
    /// Links to feed the crawler as extra seeds.
    async fn pre_crawl(
        &self,
        url: &str,
        scope: &ScopeConfig,
        session: &SessionContext,
    ) -> Result<Vec<String>, HeliosError>;

    /// Checks over the final work list.
    async fn post_scan(&self, work: &[WorkItem], session: &SessionContext) -> Result<Vec<Finding>, HeliosError>;
}
