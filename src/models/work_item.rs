use serde::{Deserialize, Serialize};

/// One thing to crawl or scan: a URL plus an optional request body.
/// Identity is the `(url, body)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkItem {
    pub url: String,
    #[serde(default)]
    pub body: Option<String>,
}

impl WorkItem {
    pub fn new(url: impl Into<String>, body: Option<String>) -> Self {
        Self { url: url.into(), body }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(url, None)
    }

    pub fn post(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self::new(url, Some(body.into()))
    }

    pub fn is_post(&self) -> bool {
        self.body.is_some()
    }
}

impl std::fmt::Display for WorkItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.body {
            Some(body) => write!(f, "POST {} [{}]", self.url, body),
            None => write!(f, "GET {}", self.url),
        }
    }
}
