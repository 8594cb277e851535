use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use data_encoding::BASE64;
use reqwest::cookie::Jar;
use reqwest::Client;
use scraper::{Html, Selector};
use tracing::{debug, info, warn};
use url::{form_urlencoded, Url};

use crate::config::{parse_user_pass, LoginConfig, LoginMethod};
use crate::errors::{with_retry, HeliosError};
use crate::http::{apply_session, build_client, jar_cookies, HttpSettings};
use crate::models::session::SessionContext;
use super::LoginModule;

/// Known CSRF/anti-forgery token field names across major frameworks
const CSRF_FIELD_NAMES: &[&str] = &[
    "user_token",            // DVWA
    "csrf_token",            // Generic / Flask-WTF
    "csrftoken",             // Generic
    "csrf-token",            // Generic
    "_token",                // Laravel
    "csrfmiddlewaretoken",   // Django
    "authenticity_token",    // Rails
    "_csrf",                 // Express/csurf
    "__RequestVerificationToken", // ASP.NET
    "token",                 // Generic fallback
];

const SESSION_INDICATORS: &[&str] = &["session", "phpsessid", "jsessionid", "connect.sid", "token", "auth"];

static INPUT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("input[name]").unwrap());
static META_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("meta[name][content]").unwrap());

/// HTTP login supporting basic auth, plain and CSRF-protected forms, and
/// static headers.
pub struct WebAuthenticator {
    settings: HttpSettings,
}

impl WebAuthenticator {
    pub fn new(settings: HttpSettings) -> Self {
        Self { settings }
    }

    async fn form_login(
        &self,
        config: &LoginConfig,
        mut session: SessionContext,
        with_csrf: bool,
    ) -> Result<Option<SessionContext>, HeliosError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| HeliosError::Config("form login requires a login URL".into()))?;
        let login_url = Url::parse(url).map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", url, e)))?;

        let jar = Arc::new(Jar::default());
        let client = build_client(&self.settings, Some(jar.clone()))?;

        let mut body = config.data.clone().unwrap_or_default();
        if with_csrf {
            let token_url = config.token_url().unwrap_or(url);
            match self.fetch_csrf_token(&client, token_url, &session).await {
                Ok(Some((name, value))) => {
                    debug!(field = %name, value_len = value.len(), "CSRF token extracted");
                    body = append_field(&body, &name, &value);
                }
                Ok(None) => warn!(token_url, "No CSRF token found on login page"),
                Err(e) => warn!(token_url, error = %e, "Failed to fetch CSRF token page"),
            }
        }

        info!(login_url = %login_url, "Attempting form login");
        let sent = with_retry("login", &self.settings.retry(), || {
            let request = apply_session(
                client
                    .post(login_url.as_str())
                    .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
                    .body(body.clone()),
                &session,
            );
            async move { request.send().await.map_err(HeliosError::from) }
        })
        .await;

        let response = match sent {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Login request failed");
                return Ok(None);
            }
        };
        debug!(status = response.status().as_u16(), "Login response received");

        let cookies = jar_cookies(&jar, &login_url);
        if cookies.is_empty() {
            warn!("Login did not set any cookies");
            return Ok(None);
        }
        let has_session = cookies
            .keys()
            .any(|name| SESSION_INDICATORS.iter().any(|s| name.to_lowercase().contains(s)));
        if has_session {
            info!(cookies = cookies.len(), "Authentication successful");
        } else {
            warn!("Authentication may have failed, no session cookie detected");
        }
        session.merge_cookies(cookies);
        Ok(Some(session))
    }

    async fn fetch_csrf_token(
        &self,
        client: &Client,
        token_url: &str,
        session: &SessionContext,
    ) -> Result<Option<(String, String)>, HeliosError> {
        let html = apply_session(client.get(token_url), session).send().await?.text().await?;
        Ok(extract_csrf_token(&html))
    }
}

fn append_field(body: &str, name: &str, value: &str) -> String {
    let pair: String = form_urlencoded::Serializer::new(String::new())
        .append_pair(name, value)
        .finish();
    if body.is_empty() {
        pair
    } else {
        format!("{}&{}", body, pair)
    }
}

/// First hidden input or meta tag whose name is a known CSRF field.
pub fn extract_csrf_token(html: &str) -> Option<(String, String)> {
    let document = Html::parse_document(html);
    let is_csrf = |name: &str| CSRF_FIELD_NAMES.iter().any(|known| name.eq_ignore_ascii_case(known));

    let from_inputs = document.select(&INPUT_SELECTOR).find_map(|el| {
        let name = el.value().attr("name")?;
        if !is_csrf(name) {
            return None;
        }
        Some((name.to_string(), el.value().attr("value").unwrap_or("").to_string()))
    });
    from_inputs.or_else(|| {
        document.select(&META_SELECTOR).find_map(|el| {
            let name = el.value().attr("name")?;
            if !is_csrf(name) {
                return None;
            }
            Some((name.to_string(), el.value().attr("content")?.to_string()))
        })
    })
}

#[async_trait]
impl LoginModule for WebAuthenticator {
    async fn pre_parse(&self, config: &LoginConfig) -> Result<Option<SessionContext>, HeliosError> {
        let mut session = SessionContext::new();
        session.merge_headers(config.header_map());

        match config.method {
            None | Some(LoginMethod::Header) => Ok(Some(session)),
            Some(LoginMethod::Basic) => {
                let creds = config
                    .credentials
                    .as_deref()
                    .ok_or_else(|| HeliosError::Config("basic login requires --login-creds".into()))?;
                let (user, pass) = parse_user_pass(creds)?;
                let token = BASE64.encode(format!("{}:{}", user, pass).as_bytes());
                session.headers.insert("Authorization".to_string(), format!("Basic {}", token));
                debug!(user = %user, "Basic authentication header set");
                Ok(Some(session))
            }
            Some(LoginMethod::Form) => self.form_login(config, session, false).await,
            Some(LoginMethod::FormCsrf) => self.form_login(config, session, true).await,
        }
    }
}
