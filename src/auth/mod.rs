pub mod web_auth;

use async_trait::async_trait;

use crate::config::LoginConfig;
use crate::errors::HeliosError;
use crate::models::session::SessionContext;

pub use web_auth::WebAuthenticator;

#[async_trait]
pub trait LoginModule: Send + Sync {
    /// Perform the configured login. `None` means no session could be
    /// established and the run continues unauthenticated.
    async fn pre_parse(&self, config: &LoginConfig) -> Result<Option<SessionContext>, HeliosError>;
}
