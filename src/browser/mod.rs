pub mod bridge;

use async_trait::async_trait;

use crate::errors::HeliosError;
use crate::models::work_item::WorkItem;

pub use bridge::DriverBridge;

/// Drives a real browser over the work list and reports new request candidates.
#[async_trait]
pub trait BrowserBridge: Send + Sync {
    async fn run(&self, work: &[WorkItem], interactive: bool) -> Result<Vec<WorkItem>, HeliosError>;
}
