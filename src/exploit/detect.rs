use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

/// (header name, pattern, product keyword). Keywords are matched against exploit module names.
const HEADER_PRODUCTS: &[(&str, &str, &str)] = &[
    ("server", r"(?i)apache-coyote|tomcat", "tomcat"),
    ("server", r"(?i)^apache(?:/|$| )", "apache"),
    ("server", r"(?i)nginx", "nginx"),
    ("server", r"(?i)microsoft-iis", "iis"),
    ("server", r"(?i)lighttpd", "lighttpd"),
    ("server", r"(?i)weblogic", "weblogic"),
    ("server", r"(?i)jetty", "jetty"),
    ("server", r"(?i)openssl", "openssl"),
    ("x-powered-by", r"(?i)php", "php"),
    ("x-powered-by", r"(?i)asp\.net", "asp"),
    ("x-powered-by", r"(?i)jboss|wildfly", "jboss"),
    ("x-powered-by", r"(?i)servlet|jsp", "java"),
    ("x-jenkins", r".", "jenkins"),
    ("x-generator", r"(?i)drupal", "drupal"),
];

/// (pattern, product keyword) applied to the landing page body.
const BODY_PRODUCTS: &[(&str, &str)] = &[
    (r"/wp-(?:content|includes)/", "wordpress"),
    (r"(?i)<meta[^>]+generator[^>]+joomla", "joomla"),
    (r"/sites/(?:default|all)/", "drupal"),
    (r"(?i)phpmyadmin", "phpmyadmin"),
    (r"(?i)struts", "struts"),
];

static COMPILED_HEADERS: LazyLock<Vec<(&'static str, Regex, &'static str)>> = LazyLock::new(|| {
    HEADER_PRODUCTS
        .iter()
        .filter_map(|(h, p, k)| Some((*h, Regex::new(p).ok()?, *k)))
        .collect()
});

static COMPILED_BODIES: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    BODY_PRODUCTS
        .iter()
        .filter_map(|(p, k)| Some((Regex::new(p).ok()?, *k)))
        .collect()
});

/// Product keywords for a response. `headers` yields (lowercase name, value).
pub fn detect_products<'a, I>(headers: I, body: &str) -> BTreeSet<String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut products = BTreeSet::new();
    for (name, value) in headers {
        for (header, re, keyword) in COMPILED_HEADERS.iter() {
            if name.eq_ignore_ascii_case(header) && re.is_match(value) {
                products.insert(keyword.to_string());
            }
        }
    }
    for (re, keyword) in COMPILED_BODIES.iter() {
        if re.is_match(body) {
            products.insert(keyword.to_string());
        }
    }
    products
}

/// Module names containing `query`, case-insensitively.
pub fn match_modules(modules: &[String], query: &str) -> Vec<String> {
    let needle = query.to_ascii_lowercase();
    modules
        .iter()
        .filter(|m| m.to_ascii_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_from_headers() {
        let headers = vec![("server", "Apache/2.4.41 (Ubuntu)"), ("x-powered-by", "PHP/7.4.3")];
        let products = detect_products(headers, "");
        assert_eq!(products.into_iter().collect::<Vec<_>>(), vec!["apache", "php"]);
    }

    #[test]
    fn test_coyote_is_tomcat_not_apache() {
        let products = detect_products(vec![("Server", "Apache-Coyote/1.1")], "");
        assert!(products.contains("tomcat"));
        assert!(!products.contains("apache"));
    }

    #[test]
    fn test_detect_from_body() {
        let products = detect_products(Vec::new(), "<script src='/wp-includes/js/x.js'></script>");
        assert!(products.contains("wordpress"));
    }

    #[test]
    fn test_match_modules() {
        let modules = vec![
            "exploit/multi/http/tomcat_mgr_upload".to_string(),
            "exploit/windows/iis/iis_webdav_upload_asp".to_string(),
            "exploit/multi/http/Tomcat_jsp_upload_bypass".to_string(),
        ];
        assert_eq!(match_modules(&modules, "tomcat").len(), 2);
        assert_eq!(match_modules(&modules, "iis"), vec!["exploit/windows/iis/iis_webdav_upload_asp"]);
        assert!(match_modules(&modules, "nginx").is_empty());
    }
}
