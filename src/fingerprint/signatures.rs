//! Static fingerprint tables and the matcher shared by the CMS and WebApp loaders.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::http::apply_session;
use crate::models::session::SessionContext;

/// Where a signature looks for its pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMethod {
    /// Response body of a successful probe.
    Body,
    /// A response header, matched case-insensitively by name.
    Header(&'static str),
}

/// One detection rule. When `pattern` has a capture group, group 1 is the version.
#[derive(Debug, Clone, Copy)]
pub struct Signature {
    pub name: &'static str,
    pub path: &'static str,
    pub method: DetectionMethod,
    pub pattern: &'static str,
    pub description: &'static str,
}

pub const CMS_SIGNATURES: &[Signature] = &[
    // WordPress
    Signature { name: "wordpress", path: "/", method: DetectionMethod::Body, pattern: r"/wp-(?:content|includes)/", description: "wp-content reference" },
    Signature { name: "wordpress", path: "/", method: DetectionMethod::Body, pattern: r#"(?i)<meta[^>]+generator[^>]+WordPress ?([\d.]+)?"#, description: "WordPress meta generator" },
    Signature { name: "wordpress", path: "/wp-login.php", method: DetectionMethod::Body, pattern: r"(?i)wp-submit|user_login", description: "wp-login.php form" },
    Signature { name: "wordpress", path: "/", method: DetectionMethod::Header("link"), pattern: r"/wp-json/", description: "WP REST API link header" },
    // Drupal
    Signature { name: "drupal", path: "/", method: DetectionMethod::Header("x-generator"), pattern: r"Drupal ?(\d+)?", description: "Drupal in X-Generator" },
    Signature { name: "drupal", path: "/", method: DetectionMethod::Header("x-drupal-cache"), pattern: r".", description: "X-Drupal-Cache header" },
    Signature { name: "drupal", path: "/", method: DetectionMethod::Body, pattern: r"/sites/(?:default|all)/|Drupal\.settings", description: "Drupal asset paths" },
    Signature { name: "drupal", path: "/CHANGELOG.txt", method: DetectionMethod::Body, pattern: r"Drupal ([\d.]+)", description: "Drupal changelog" },
    // Joomla
    Signature { name: "joomla", path: "/", method: DetectionMethod::Body, pattern: r#"(?i)<meta[^>]+generator[^>]+Joomla!? ?([\d.]+)?"#, description: "Joomla meta generator" },
    Signature { name: "joomla", path: "/", method: DetectionMethod::Body, pattern: r"/media/jui/|/components/com_", description: "Joomla component paths" },
    Signature { name: "joomla", path: "/administrator/manifests/files/joomla.xml", method: DetectionMethod::Body, pattern: r"<version>([\d.]+)</version>", description: "Joomla manifest" },
    // Magento
    Signature { name: "magento", path: "/", method: DetectionMethod::Body, pattern: r"Mage\.Cookies|/skin/frontend/|/static/frontend/", description: "Magento frontend assets" },
    // TYPO3
    Signature { name: "typo3", path: "/", method: DetectionMethod::Body, pattern: r#"(?i)<meta[^>]+generator[^>]+TYPO3 ?(?:CMS )?([\d.]+)?"#, description: "TYPO3 meta generator" },
    // Ghost
    Signature { name: "ghost", path: "/", method: DetectionMethod::Body, pattern: r#"(?i)<meta[^>]+generator[^>]+Ghost ?([\d.]+)?"#, description: "Ghost meta generator" },
];

pub const WEBAPP_SIGNATURES: &[Signature] = &[
    // Apache Tomcat
    Signature { name: "tomcat", path: "/", method: DetectionMethod::Header("server"), pattern: r"Apache-Coyote(?:/([\d.]+))?", description: "Coyote connector banner" },
    Signature { name: "tomcat", path: "/docs/", method: DetectionMethod::Body, pattern: r"Apache Tomcat/([\d.]+)", description: "Tomcat documentation" },
    Signature { name: "tomcat", path: "/manager/html", method: DetectionMethod::Header("www-authenticate"), pattern: r"Tomcat Manager", description: "Tomcat manager realm" },
    // JBoss / WildFly
    Signature { name: "jboss", path: "/", method: DetectionMethod::Header("x-powered-by"), pattern: r"JBoss(?:[-\w]*[/ ]([\d.]+\w*))?", description: "JBoss X-Powered-By" },
    Signature { name: "jboss", path: "/jmx-console/", method: DetectionMethod::Body, pattern: r"(?i)JBoss JMX Management Console", description: "JMX console exposed" },
    Signature { name: "jboss", path: "/", method: DetectionMethod::Header("server"), pattern: r"WildFly(?:/([\d.]+))?", description: "WildFly banner" },
    // Jenkins
    Signature { name: "jenkins", path: "/", method: DetectionMethod::Header("x-jenkins"), pattern: r"([\d.]+)", description: "X-Jenkins header" },
    Signature { name: "jenkins", path: "/login", method: DetectionMethod::Body, pattern: r"(?i)<title>[^<]*Jenkins", description: "Jenkins login page" },
    // phpMyAdmin
    Signature { name: "phpmyadmin", path: "/phpmyadmin/", method: DetectionMethod::Body, pattern: r"(?i)phpMyAdmin", description: "phpMyAdmin login" },
    // Spring Boot actuator
    Signature { name: "spring-actuator", path: "/actuator/health", method: DetectionMethod::Body, pattern: r#""status"\s*:\s*"(?:UP|DOWN)""#, description: "Actuator health endpoint" },
    Signature { name: "spring-actuator", path: "/actuator/env", method: DetectionMethod::Body, pattern: r#""propertySources""#, description: "Actuator env endpoint exposed" },
    // Kibana
    Signature { name: "kibana", path: "/", method: DetectionMethod::Header("kbn-version"), pattern: r"([\d.]+)", description: "kbn-version header" },
];

/// What a probe fetch returned, reduced to what signatures look at.
#[derive(Debug, Clone, Default)]
pub struct ProbeResponse {
    pub status: u16,
    /// Header names lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub name: &'static str,
    pub path: &'static str,
    pub description: &'static str,
    pub version: Option<String>,
}

impl Signature {
    pub fn evaluate(&self, response: &ProbeResponse) -> Option<Detection> {
        let haystack = match self.method {
            DetectionMethod::Body if (200..300).contains(&response.status) => response.body.as_str(),
            DetectionMethod::Body => return None,
            DetectionMethod::Header(name) => response.headers.get(name)?.as_str(),
        };
        let re = match Regex::new(self.pattern) {
            Ok(re) => re,
            Err(e) => {
                debug!(signature = self.description, error = %e, "Invalid signature pattern");
                return None;
            }
        };
        let captures = re.captures(haystack)?;
        Some(Detection {
            name: self.name,
            path: self.path,
            description: self.description,
            version: captures.get(1).map(|m| m.as_str().to_string()),
        })
    }
}

/// Distinct probe paths of a signature set, in table order.
pub fn probe_paths(signatures: &[Signature]) -> Vec<&'static str> {
    let mut paths: Vec<&'static str> = Vec::new();
    for sig in signatures {
        if !paths.contains(&sig.path) {
            paths.push(sig.path);
        }
    }
    paths
}

/// Fetch every URL once. Unreachable URLs are left out.
pub async fn fetch_probes(
    client: &Client,
    urls: Vec<(&'static str, Url)>,
    session: &SessionContext,
    concurrency: usize,
) -> BTreeMap<&'static str, (Url, ProbeResponse)> {
    let session = Arc::new(session.clone());
    let probes: Vec<_> = urls
        .into_iter()
        .map(|(path, url)| {
            let client = client.clone();
            let session = Arc::clone(&session);
            async move { fetch_probe(&client, path, url, &session).await }
        })
        .collect();
    stream::iter(probes)
        .buffered(concurrency.max(1))
        .filter_map(|r| async move { r })
        .collect()
        .await
}

async fn fetch_probe(
    client: &Client,
    path: &'static str,
    url: Url,
    session: &SessionContext,
) -> Option<(&'static str, (Url, ProbeResponse))> {
    let response = apply_session(client.get(url.as_str()), session).send().await.ok()?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter_map(|(k, v)| Some((k.as_str().to_ascii_lowercase(), v.to_str().ok()?.to_string())))
        .collect();
    let body = response.text().await.unwrap_or_default();
    debug!(url = %url, status, "Fingerprint probe");
    Some((path, (url, ProbeResponse { status, headers, body })))
}

/// Run all signatures against fetched probes, collapsing repeated detections.
pub fn match_signatures(
    signatures: &[Signature],
    probes: &BTreeMap<&'static str, (Url, ProbeResponse)>,
) -> Vec<(Detection, Url)> {
    let mut detections: Vec<(Detection, Url)> = Vec::new();
    for sig in signatures {
        let Some((url, response)) = probes.get(sig.path) else {
            continue;
        };
        if let Some(found) = sig.evaluate(response) {
            if !detections.iter().any(|(d, _)| d == &found) {
                detections.push((found, url.clone()));
            }
        }
    }
    detections
}
