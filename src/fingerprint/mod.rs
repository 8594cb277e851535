pub mod cms;
pub mod signatures;
pub mod webapp;

use async_trait::async_trait;

use crate::errors::HeliosError;
use crate::models::scan_tree::{CmsResults, WebAppResults};
use crate::models::session::SessionContext;
use crate::scope::ScopeConfig;

pub use cms::CmsScanner;
pub use webapp::WebAppScanner;

pub const CMS_RESULT_TYPE: &str = "CMS Script";
pub const WEBAPP_RESULT_TYPE: &str = "WebApp Script";

#[async_trait]
pub trait CmsFingerprinter: Send + Sync {
    async fn run_scripts(&self, url: &str) -> Result<CmsResults, HeliosError>;
}

#[async_trait]
pub trait WebAppFingerprinter: Send + Sync {
    /// Load the fingerprint modules, returning how many are available.
    fn load_modules(&self) -> Result<usize, HeliosError>;

    async fn run_scripts(
        &self,
        url: &str,
        scope: &ScopeConfig,
        session: &SessionContext,
    ) -> Result<WebAppResults, HeliosError>;
}
