use serde::{Deserialize, Serialize};

/// Severity level for a finding, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
}

impl Severity {
    /// Numeric level as stored by the result sink.
    /// Info = 0, Low = 1, Medium = 2, High = 3.
    pub fn level(&self) -> u8 {
        match self {
            Severity::Info => 0,
            Severity::Low => 1,
            Severity::Medium => 2,
            Severity::High => 3,
        }
    }

    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Severity::Info,
            1 => Severity::Low,
            2 => Severity::Medium,
            _ => Severity::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single result produced by a scanning, scripting or fingerprinting stage.
///
/// The pipeline forwards findings to the result sink without looking at
/// anything beyond the fields the sink stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Result category as persisted (e.g. "Passive Check", "Post Script").
    pub result_type: String,
    /// Name of the check or script that produced this finding.
    pub script: String,
    pub severity: Severity,
    pub text: String,
    /// URL the finding applies to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl Finding {
    pub fn new(result_type: &str, script: &str, severity: Severity, text: impl Into<String>) -> Self {
        Self {
            result_type: result_type.to_string(),
            script: script.to_string(),
            severity,
            text: text.into(),
            url: None,
        }
    }

    pub fn at(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_levels() {
        assert_eq!(Severity::Info.level(), 0);
        assert_eq!(Severity::High.level(), 3);
        assert_eq!(Severity::from_level(2), Severity::Medium);
        assert_eq!(Severity::from_level(9), Severity::High);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Info < Severity::Low);
        assert!(Severity::Medium < Severity::High);
    }

    #[test]
    fn test_finding_serializes_without_empty_url() {
        let f = Finding::new("CMS Script", "wordpress", Severity::Info, "WordPress detected");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["severity"], "info");
        assert!(json.get("url").is_none());

        let f = f.at("http://example.com/");
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["url"], "http://example.com/");
    }
}
