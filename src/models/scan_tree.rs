use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::finding::Finding;

/// Script name -> result strings produced by the CMS fingerprint stage.
pub type CmsResults = BTreeMap<String, Vec<String>>;

/// Script name -> structured payloads produced by the WebApp fingerprint stage.
pub type WebAppResults = BTreeMap<String, Vec<serde_json::Value>>;

/// Correlation query -> matching exploit modules.
pub type ExploitResults = BTreeMap<String, Vec<String>>;

/// The final report for one run. Assembled once, after every stage has finished.
///
/// Serialized field names follow the report file format consumed by
/// downstream tooling, hence the short renames.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanTree {
    #[serde(rename = "start")]
    pub start_time: DateTime<Utc>,
    #[serde(rename = "end")]
    pub end_time: DateTime<Utc>,
    #[serde(rename = "scope")]
    pub scope_host: String,
    #[serde(rename = "starturl")]
    pub start_url: String,
    #[serde(rename = "crawled")]
    pub crawled_count: usize,
    #[serde(rename = "scanned")]
    pub scanned_count: usize,
    #[serde(rename = "results")]
    pub findings: Vec<Finding>,
    #[serde(rename = "metasploit")]
    pub exploit_results: ExploitResults,
    #[serde(rename = "cms")]
    pub cms_results: CmsResults,
    #[serde(rename = "webapps")]
    pub webapp_results: WebAppResults,
    #[serde(rename = "post")]
    pub post_results: Vec<Finding>,
}

impl ScanTree {
    /// Total number of findings across the scan and post-scan stages.
    pub fn total_findings(&self) -> usize {
        self.findings.len() + self.post_results.len()
    }

    pub fn duration_ms(&self) -> u64 {
        self.end_time
            .signed_duration_since(self.start_time)
            .num_milliseconds()
            .unsigned_abs()
    }
}
