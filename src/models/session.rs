use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Headers and cookies carried by every request-issuing stage.
///
/// The pipeline controller owns the session; collaborators may append
/// cookies they observe. Cookies are never removed once recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionContext {
    pub headers: BTreeMap<String, String>,
    pub cookies: BTreeMap<String, String>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or overwrite cookies. Existing cookies absent from `cookies` stay.
    pub fn merge_cookies<I>(&mut self, cookies: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.cookies.extend(cookies);
    }

    pub fn merge_headers<I>(&mut self, headers: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        self.headers.extend(headers);
    }

    /// Render cookies as a `Cookie` request header value, if any are set.
    pub fn cookie_header(&self) -> Option<String> {
        render_cookie_header(&self.cookies)
    }
}

pub fn render_cookie_header(cookies: &BTreeMap<String, String>) -> Option<String> {
    if cookies.is_empty() {
        return None;
    }
    Some(
        cookies
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("; "),
    )
}

/// Parse a `Cookie` header value ("a=1; b=2") into name/value pairs.
pub fn parse_cookie_header(value: &str) -> BTreeMap<String, String> {
    value
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            let name = name.trim();
            if name.is_empty() {
                return None;
            }
            Some((name.to_string(), value.trim().to_string()))
        })
        .collect()
}
