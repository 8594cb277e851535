use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::errors::HeliosError;
use crate::models::finding::{Finding, Severity};

pub const PASSIVE_RESULT_TYPE: &str = "Passive Check";
pub const INJECTION_RESULT_TYPE: &str = "Injection Check";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CheckCategory {
    Discovery,
    Passive,
    Injection,
    Dangerous,
}

impl CheckCategory {
    pub const ALL: [CheckCategory; 4] = [
        CheckCategory::Discovery,
        CheckCategory::Passive,
        CheckCategory::Injection,
        CheckCategory::Dangerous,
    ];

    /// Categories selected by `--options`. No options means discovery + passive.
    pub fn from_options(options: &[String]) -> Result<BTreeSet<CheckCategory>, HeliosError> {
        if options.is_empty() {
            return Ok([CheckCategory::Discovery, CheckCategory::Passive].into_iter().collect());
        }
        let mut selected = BTreeSet::new();
        for option in options {
            match option.trim().to_ascii_lowercase().as_str() {
                "all" => selected.extend(CheckCategory::ALL),
                "discovery" => {
                    selected.insert(CheckCategory::Discovery);
                }
                "passive" => {
                    selected.insert(CheckCategory::Passive);
                }
                "injection" => {
                    selected.insert(CheckCategory::Injection);
                }
                "dangerous" => {
                    selected.insert(CheckCategory::Dangerous);
                }
                "" => {}
                other => {
                    return Err(HeliosError::Config(format!(
                        "Unknown scan option '{}' (expected discovery, passive, injection, dangerous, all)",
                        other
                    )))
                }
            }
        }
        Ok(selected)
    }
}

/// The parts of an HTTP response the checks look at.
#[derive(Debug, Clone, Default)]
pub struct ResponseSnapshot {
    pub url: String,
    pub status: u16,
    /// Lowercased header names. Repeated headers are joined with ", ".
    pub headers: BTreeMap<String, String>,
    pub set_cookies: Vec<String>,
    pub body: String,
}

impl ResponseSnapshot {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn is_https(&self) -> bool {
        self.url.starts_with("https://")
    }
}

pub struct PassiveCheck {
    pub name: &'static str,
    pub category: CheckCategory,
    pub run: fn(&ResponseSnapshot) -> Vec<(Severity, String)>,
}

pub static PASSIVE_CHECKS: &[PassiveCheck] = &[
    PassiveCheck { name: "security-headers", category: CheckCategory::Passive, run: security_headers },
    PassiveCheck { name: "server-banner", category: CheckCategory::Passive, run: server_banner },
    PassiveCheck { name: "error-disclosure", category: CheckCategory::Passive, run: error_disclosure },
    PassiveCheck { name: "cookie-flags", category: CheckCategory::Passive, run: cookie_flags },
    PassiveCheck { name: "directory-listing", category: CheckCategory::Discovery, run: directory_listing },
];

pub fn run_passive_checks(snapshot: &ResponseSnapshot, categories: &BTreeSet<CheckCategory>) -> Vec<Finding> {
    PASSIVE_CHECKS
        .iter()
        .filter(|c| categories.contains(&c.category))
        .flat_map(|check| {
            (check.run)(snapshot)
                .into_iter()
                .map(move |(severity, text)| {
                    Finding::new(PASSIVE_RESULT_TYPE, check.name, severity, text).at(&snapshot.url)
                })
        })
        .collect()
}

fn security_headers(snapshot: &ResponseSnapshot) -> Vec<(Severity, String)> {
    let mut required = vec!["x-frame-options", "x-content-type-options", "content-security-policy"];
    if snapshot.is_https() {
        required.push("strict-transport-security");
    }
    required
        .into_iter()
        .filter(|h| snapshot.header(h).is_none())
        .map(|h| (Severity::Low, format!("Missing security header: {}", h)))
        .collect()
}

static VERSION_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+\.\d+").unwrap());

fn server_banner(snapshot: &ResponseSnapshot) -> Vec<(Severity, String)> {
    ["server", "x-powered-by", "x-aspnet-version", "x-generator"]
        .into_iter()
        .filter_map(|h| snapshot.header(h).map(|v| (h, v)))
        .filter(|(_, v)| VERSION_RE.is_match(v))
        .map(|(h, v)| (Severity::Info, format!("{} header discloses version: {}", h, v)))
        .collect()
}

static SQL_ERROR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)You have an error in your SQL syntax|mysql_fetch|SQLSTATE\[|ORA-\d{5}|unterminated quoted string|Unclosed quotation mark|SQLiteException|pg_query\(\)").unwrap()
});

static STACK_TRACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Traceback \(most recent call last\)|at [a-z]+\.[A-Za-z.$]+\([A-Za-z]+\.java:\d+\)|<b>(?:Fatal error|Warning)</b>: .* on line <b>\d+</b>|Microsoft \.NET Framework Version").unwrap()
});

fn error_disclosure(snapshot: &ResponseSnapshot) -> Vec<(Severity, String)> {
    let mut found = Vec::new();
    if let Some(m) = SQL_ERROR.find(&snapshot.body) {
        found.push((Severity::Medium, format!("Database error message in response: {}", m.as_str())));
    }
    if STACK_TRACE.is_match(&snapshot.body) {
        found.push((Severity::Low, "Stack trace or interpreter error in response".to_string()));
    }
    found
}

fn cookie_flags(snapshot: &ResponseSnapshot) -> Vec<(Severity, String)> {
    let mut found = Vec::new();
    for cookie in &snapshot.set_cookies {
        let name = cookie.split('=').next().unwrap_or("").trim();
        let lower = cookie.to_ascii_lowercase();
        if !lower.contains("httponly") {
            found.push((Severity::Low, format!("Cookie {} set without HttpOnly", name)));
        }
        if snapshot.is_https() && !lower.contains("secure") {
            found.push((Severity::Low, format!("Cookie {} set without Secure", name)));
        }
    }
    found
}

fn directory_listing(snapshot: &ResponseSnapshot) -> Vec<(Severity, String)> {
    let lower = snapshot.body.to_ascii_lowercase();
    if snapshot.status == 200 && (lower.contains("<title>index of /") || lower.contains("<h1>directory listing for")) {
        vec![(Severity::Medium, "Directory listing enabled".to_string())]
    } else {
        Vec::new()
    }
}

pub const REFLECTION_MARKER: &str = "hx7r\"'<q>";

/// Copy of `url` with every query value replaced by the reflection marker.
/// `None` when the URL has no query parameters.
pub fn reflection_probe_url(url: &str) -> Option<String> {
    let mut parsed = url::Url::parse(url).ok()?;
    let names: Vec<String> = parsed.query_pairs().map(|(k, _)| k.into_owned()).collect();
    if names.is_empty() {
        return None;
    }
    parsed
        .query_pairs_mut()
        .clear()
        .extend_pairs(names.iter().map(|n| (n.as_str(), REFLECTION_MARKER)));
    Some(parsed.to_string())
}

pub fn reflected_unescaped(body: &str) -> bool {
    body.contains(REFLECTION_MARKER)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(url: &str, headers: &[(&str, &str)], body: &str) -> ResponseSnapshot {
        ResponseSnapshot {
            url: url.to_string(),
            status: 200,
            headers: headers.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            set_cookies: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_category_options() {
        let default = CheckCategory::from_options(&[]).unwrap();
        assert!(default.contains(&CheckCategory::Passive));
        assert!(!default.contains(&CheckCategory::Injection));
        let all = CheckCategory::from_options(&["all".to_string()]).unwrap();
        assert_eq!(all.len(), 4);
        assert!(CheckCategory::from_options(&["sneaky".to_string()]).is_err());
    }

    #[test]
    fn test_security_headers() {
        let s = snapshot("https://a.com/", &[("x-frame-options", "DENY")], "");
        let found = security_headers(&s);
        assert_eq!(found.len(), 3);
        assert!(found.iter().any(|(_, t)| t.contains("strict-transport-security")));
        let s = snapshot("http://a.com/", &[], "");
        assert_eq!(security_headers(&s).len(), 3);
    }

    #[test]
    fn test_server_banner() {
        let s = snapshot("http://a.com/", &[("server", "Apache/2.4.41 (Ubuntu)"), ("x-powered-by", "Express")], "");
        let found = server_banner(&s);
        assert_eq!(found.len(), 1);
        assert!(found[0].1.contains("Apache/2.4.41"));
    }

    #[test]
    fn test_error_disclosure() {
        let s = snapshot("http://a.com/", &[], "Warning: You have an error in your SQL syntax near ''");
        let found = error_disclosure(&s);
        assert_eq!(found[0].0, Severity::Medium);
        assert!(error_disclosure(&snapshot("http://a.com/", &[], "all good")).is_empty());
    }

    #[test]
    fn test_cookie_flags() {
        let mut s = snapshot("https://a.com/", &[], "");
        s.set_cookies = vec!["sid=1; Path=/".to_string(), "ok=2; HttpOnly; Secure".to_string()];
        let found = cookie_flags(&s);
        assert_eq!(found.len(), 2);
        assert!(found.iter().all(|(_, t)| t.contains("sid")));
    }

    #[test]
    fn test_directory_listing_is_discovery() {
        let s = snapshot("http://a.com/files/", &[], "<html><title>Index of /files</title>");
        let only_passive: BTreeSet<_> = [CheckCategory::Passive].into_iter().collect();
        let findings = run_passive_checks(&s, &only_passive);
        assert!(findings.iter().all(|f| f.script != "directory-listing"));
        let only_discovery: BTreeSet<_> = [CheckCategory::Discovery].into_iter().collect();
        let findings = run_passive_checks(&s, &only_discovery);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].url.as_deref(), Some("http://a.com/files/"));
    }

    #[test]
    fn test_reflection_probe_url() {
        assert!(reflection_probe_url("http://a.com/page").is_none());
        let probe = reflection_probe_url("http://a.com/s?q=1&lang=en").unwrap();
        let parsed = url::Url::parse(&probe).unwrap();
        let pairs: Vec<(String, String)> = parsed.query_pairs().map(|(k, v)| (k.into_owned(), v.into_owned())).collect();
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|(_, v)| v == REFLECTION_MARKER));
        assert!(reflected_unescaped(&format!("<p>{}</p>", REFLECTION_MARKER)));
        assert!(!reflected_unescaped("<p>hx7r&quot;&#39;&lt;q&gt;</p>"));
    }
}
