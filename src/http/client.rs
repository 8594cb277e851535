use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::cookie::{CookieStore, Jar};
use reqwest::{Client, RequestBuilder};
use url::Url;

use crate::errors::{HeliosError, RetryConfig};
use crate::models::session::{parse_cookie_header, SessionContext};
use crate::pipeline::state::RunConfig;

pub const DEFAULT_USER_AGENT: &str = concat!("Helios/", env!("CARGO_PKG_VERSION"));
const DEFAULT_TIMEOUT_SECS: u64 = 20;
const MAX_REDIRECTS: usize = 5;

/// Transport settings shared by every default collaborator.
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub ssl_verify: bool,
    pub timeout: Duration,
    pub retries: u32,
    pub user_agent: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            ssl_verify: false,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            retries: 2,
            user_agent: None,
        }
    }
}

impl HttpSettings {
    pub fn from_run_config(config: &RunConfig) -> Self {
        Self {
            ssl_verify: config.ssl_verify,
            retries: config.http_retries,
            user_agent: config.user_agent.clone(),
            ..Default::default()
        }
    }

    pub fn user_agent(&self) -> &str {
        self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig { max_retries: self.retries }
    }
}

pub fn build_client(settings: &HttpSettings, jar: Option<Arc<Jar>>) -> Result<Client, HeliosError> {
    let mut builder = Client::builder()
        .danger_accept_invalid_certs(!settings.ssl_verify)
        .timeout(settings.timeout)
        .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
        .user_agent(settings.user_agent());
    if let Some(jar) = jar {
        builder = builder.cookie_provider(jar);
    }
    builder
        .build()
        .map_err(|e| HeliosError::Network(format!("Failed to build HTTP client: {}", e)))
}

/// Attach the session's headers and cookies to a request.
pub fn apply_session(mut request: RequestBuilder, session: &SessionContext) -> RequestBuilder {
    for (name, value) in &session.headers {
        request = request.header(name.as_str(), value.as_str());
    }
    if let Some(cookie) = session.cookie_header() {
        request = request.header(reqwest::header::COOKIE, cookie);
    }
    request
}

pub fn seed_jar(jar: &Jar, url: &Url, cookies: &BTreeMap<String, String>) {
    for (name, value) in cookies {
        jar.add_cookie_str(&format!("{}={}", name, value), url);
    }
}

/// Cookies the jar would send to `url`.
pub fn jar_cookies(jar: &Jar, url: &Url) -> BTreeMap<String, String> {
    jar.cookies(url)
        .and_then(|value| value.to_str().map(parse_cookie_header).ok())
        .unwrap_or_default()
}
