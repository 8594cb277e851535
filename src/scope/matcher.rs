use std::collections::BTreeSet;

use url::Url;

use crate::errors::HeliosError;

/// Scope options parsed from a comma-separated option string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeOptions {
    /// Accept subdomains of the primary host.
    pub subdomains: bool,
    /// Require the seed URL's scheme.
    pub same_scheme: bool,
    /// Require https.
    pub https_only: bool,
}

impl ScopeOptions {
    pub fn parse(options: Option<&str>) -> Result<Self, HeliosError> {
        let mut parsed = Self::default();
        let Some(options) = options else {
            return Ok(parsed);
        };
        for token in options.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            match token.to_ascii_lowercase().as_str() {
                "subdomains" => parsed.subdomains = true,
                "same-scheme" => parsed.same_scheme = true,
                "https-only" => parsed.https_only = true,
                other => {
                    return Err(HeliosError::Config(format!(
                        "Unknown scope option '{}' (expected subdomains, same-scheme, https-only)",
                        other
                    )))
                }
            }
        }
        Ok(parsed)
    }
}

/// The set of hosts considered part of the authorized target for one run.
#[derive(Debug, Clone)]
pub struct ScopeConfig {
    primary_host: String,
    seed_scheme: String,
    extra_host_patterns: BTreeSet<String>,
    compiled: Vec<glob::Pattern>,
    options: ScopeOptions,
}

impl ScopeConfig {
    pub fn new(seed_url: &str, options: ScopeOptions) -> Result<Self, HeliosError> {
        let url = Url::parse(seed_url)
            .map_err(|e| HeliosError::InvalidTarget(format!("{}: {}", seed_url, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| HeliosError::InvalidTarget(format!("{}: URL has no host", seed_url)))?;

        Ok(Self {
            primary_host: host.to_ascii_lowercase(),
            seed_scheme: url.scheme().to_string(),
            extra_host_patterns: BTreeSet::new(),
            compiled: Vec::new(),
            options,
        })
    }

    /// Add comma-separated extra host patterns (`*` wildcards allowed).
    pub fn with_extra_hosts(mut self, extra: Option<&str>) -> Result<Self, HeliosError> {
        if let Some(extra) = extra {
            for pattern in extra.split(',').map(str::trim).filter(|p| !p.is_empty()) {
                self.add_host_pattern(pattern)?;
            }
        }
        Ok(self)
    }

    pub fn add_host_pattern(&mut self, pattern: &str) -> Result<(), HeliosError> {
        let pattern = pattern.to_ascii_lowercase();
        if self.extra_host_patterns.contains(&pattern) {
            return Ok(());
        }
        let compiled = glob::Pattern::new(&pattern)
            .map_err(|e| HeliosError::Config(format!("Invalid scope pattern '{}': {}", pattern, e)))?;
        self.compiled.push(compiled);
        self.extra_host_patterns.insert(pattern);
        Ok(())
    }

    pub fn host(&self) -> &str {
        &self.primary_host
    }

    pub fn is_https(&self) -> bool {
        self.seed_scheme == "https"
    }

    pub fn extra_host_patterns(&self) -> &BTreeSet<String> {
        &self.extra_host_patterns
    }

    pub fn options(&self) -> ScopeOptions {
        self.options
    }

    pub fn in_scope(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        let scheme = parsed.scheme();
        if scheme != "http" && scheme != "https" {
            return false;
        }
        if self.options.https_only && scheme != "https" {
            return false;
        }
        if self.options.same_scheme && scheme != self.seed_scheme {
            return false;
        }

        let Some(host) = parsed.host_str() else {
            return false;
        };
        self.host_in_scope(&host.to_ascii_lowercase())
    }

    fn host_in_scope(&self, host: &str) -> bool {
        if host == self.primary_host {
            return true;
        }
        if self.options.subdomains && host.ends_with(&format!(".{}", self.primary_host)) {
            return true;
        }
        self.compiled.iter().any(|p| p.matches(host))
    }
}
