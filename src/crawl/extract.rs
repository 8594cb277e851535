use std::sync::LazyLock;

use scraper::{Html, Selector};
use url::{form_urlencoded, Url};

use crate::models::work_item::WorkItem;

static LINK_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("a[href], area[href], link[href], iframe[src], frame[src], script[src]").unwrap()
});
static BASE_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("base[href]").unwrap());
static FORM_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static FIELD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse("input[name], textarea[name], select[name], button[name]").unwrap()
});

/// Links and forms found on a page, resolved against the page URL.
/// POST forms become work items with a urlencoded body, GET forms carry
/// their fields in the query string.
pub fn extract_work_items(page_url: &Url, html: &str) -> Vec<WorkItem> {
    let document = Html::parse_document(html);
    let base = document
        .select(&BASE_SELECTOR)
        .next()
        .and_then(|el| el.value().attr("href"))
        .and_then(|href| page_url.join(href).ok())
        .unwrap_or_else(|| page_url.clone());

    let mut items = Vec::new();

    for element in document.select(&LINK_SELECTOR) {
        let raw = element.value().attr("href").or_else(|| element.value().attr("src"));
        if let Some(url) = raw.and_then(|r| resolve(&base, r)) {
            items.push(WorkItem::get(url.to_string()));
        }
    }

    for form in document.select(&FORM_SELECTOR) {
        let action = form.value().attr("action").unwrap_or("").trim();
        let target = if action.is_empty() {
            Some(page_url.clone())
        } else {
            resolve(&base, action)
        };
        let Some(mut target) = target else {
            continue;
        };

        let mut body = form_urlencoded::Serializer::new(String::new());
        for field in form.select(&FIELD_SELECTOR) {
            if let Some(name) = field.value().attr("name") {
                body.append_pair(name, field.value().attr("value").unwrap_or(""));
            }
        }
        let body = body.finish();

        let method = form.value().attr("method").unwrap_or("get");
        if method.eq_ignore_ascii_case("post") {
            items.push(WorkItem::post(target.to_string(), body));
        } else {
            if !body.is_empty() {
                target.set_query(Some(&body));
            }
            items.push(WorkItem::get(target.to_string()));
        }
    }

    items
}

fn resolve(base: &Url, raw: &str) -> Option<Url> {
    let raw = raw.trim();
    if raw.is_empty() || raw.starts_with('#') {
        return None;
    }
    let mut url = base.join(raw).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    url.set_fragment(None);
    Some(url)
}
