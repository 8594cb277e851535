use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::HeliosError;

/// Top-level YAML configuration file.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct HeliosConfig {
    pub scan: Option<ScanConfig>,
    pub scope: Option<ScopeSection>,
    pub login: Option<LoginConfig>,
    pub browser: Option<BrowserConfig>,
    pub exploit: Option<ExploitBridgeConfig>,
    pub output: Option<OutputConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScanConfig {
    pub threads: Option<i64>,
    pub max_urls: Option<usize>,
    /// Stage flags to enable, e.g. `[crawl, scan, cms]`.
    pub stages: Option<Vec<String>>,
    pub all: Option<bool>,
    /// Scanner check categories (discovery, passive, injection, dangerous, all).
    pub options: Option<Vec<String>>,
    pub user_agent: Option<String>,
    pub ssl_verify: Option<bool>,
    pub retries: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ScopeSection {
    /// Extra host patterns, `*` wildcards allowed.
    pub hosts: Option<Vec<String>>,
    /// Scope options (subdomains, same-scheme, https-only).
    pub options: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct OutputConfig {
    pub file: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoginMethod {
    Basic,
    Form,
    FormCsrf,
    Header,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Basic => "basic",
            Self::Form => "form",
            Self::FormCsrf => "form-csrf",
            Self::Header => "header",
        }
    }
}

impl std::fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LoginMethod {
    type Err = HeliosError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "basic" => Ok(Self::Basic),
            "form" => Ok(Self::Form),
            "form-csrf" => Ok(Self::FormCsrf),
            "header" => Ok(Self::Header),
            other => Err(HeliosError::Config(format!(
                "Unknown login method '{}' (expected basic, form, form-csrf, header)",
                other
            ))),
        }
    }
}

/// Authentication settings consumed by the login stage.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct LoginConfig {
    pub method: Option<LoginMethod>,
    /// `username:password`, or `$ENV_VAR`.
    pub credentials: Option<String>,
    /// URL the login form posts to.
    pub url: Option<String>,
    /// urlencoded form body.
    pub data: Option<String>,
    /// Page to fetch CSRF tokens from. Defaults to `url`.
    pub token_url: Option<String>,
    /// Static `Key: Value` headers sent on every request.
    pub headers: Vec<String>,
}

impl LoginConfig {
    pub fn header_map(&self) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        for raw in &self.headers {
            match raw.split_once(':') {
                Some((key, value)) if !key.trim().is_empty() => {
                    map.insert(key.trim().to_string(), value.trim().to_string());
                }
                _ => warn!(header = %raw, "Ignoring malformed header, expected 'Key: Value'"),
            }
        }
        map
    }

    pub fn token_url(&self) -> Option<&str> {
        self.token_url.as_deref().or(self.url.as_deref())
    }
}

pub const DEFAULT_DRIVER_PATH: &str = "helios-driver";
pub const DEFAULT_PROXY_PORT: u16 = 3333;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BrowserConfig {
    pub driver_path: String,
    pub show: bool,
    pub interactive: bool,
    pub proxy: bool,
    pub proxy_port: u16,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            driver_path: DEFAULT_DRIVER_PATH.to_string(),
            show: false,
            interactive: false,
            proxy: true,
            proxy_port: DEFAULT_PROXY_PORT,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ExploitBridgeConfig {
    pub host: String,
    pub port: u16,
    /// `username:password`, or `$ENV_VAR`.
    pub credentials: String,
    pub endpoint: String,
    pub ssl: bool,
    /// Start `msfrpcd` when the first connection attempt fails.
    pub autostart: bool,
}

impl Default for ExploitBridgeConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 55553,
            credentials: "msf:msfrpcd".to_string(),
            endpoint: "/api/".to_string(),
            ssl: true,
            autostart: false,
        }
    }
}
