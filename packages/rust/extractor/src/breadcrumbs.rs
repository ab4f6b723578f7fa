//! Breadcrumb trail extraction.
//!
//! Structured data wins over markup: a JSON-LD `BreadcrumbList` is used when
//! present, otherwise the first element labelled as a breadcrumb.

use std::sync::LazyLock;

use scraper::{ElementRef, Html, Selector};
use serde_json::Value;

use crate::{collapse_whitespace, element_text};

static LD_JSON_SEL: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector")
});
static CONTAINER_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("nav, ol, ul, div, p").expect("valid selector"));
static ITEM_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("li").expect("valid selector"));
static LINK_SEL: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("a, span").expect("valid selector"));

/// Separators that some sites render as standalone crumbs.
const SEPARATORS: &[&str] = &[">", "/", "»", "›", "|", "→", "-"];

pub(crate) fn extract(doc: &Html) -> Vec<String> {
    let from_json_ld = from_json_ld(doc);
    if !from_json_ld.is_empty() {
        return from_json_ld;
    }
    from_markup(doc)
}

// ---------------------------------------------------------------------------
// JSON-LD
// ---------------------------------------------------------------------------

fn from_json_ld(doc: &Html) -> Vec<String> {
    for script in doc.select(&LD_JSON_SEL) {
        let raw = script.text().collect::<String>();
        let Ok(value) = serde_json::from_str::<Value>(raw.trim()) else {
            continue;
        };
        if let Some(list) = find_breadcrumb_list(&value) {
            let names = list_item_names(list);
            if !names.is_empty() {
                return names;
            }
        }
    }
    Vec::new()
}

/// Search top-level objects, arrays, and `@graph` for a `BreadcrumbList`.
fn find_breadcrumb_list(value: &Value) -> Option<&Value> {
    match value {
        Value::Array(items) => items.iter().find_map(find_breadcrumb_list),
        Value::Object(map) => {
            let is_list = match map.get("@type") {
                Some(Value::String(t)) => t == "BreadcrumbList",
                Some(Value::Array(types)) => types.iter().any(|t| t == "BreadcrumbList"),
                _ => false,
            };
            if is_list {
                Some(value)
            } else {
                map.get("@graph").and_then(find_breadcrumb_list)
            }
        }
        _ => None,
    }
}

fn list_item_names(list: &Value) -> Vec<String> {
    let Some(items) = list.get("itemListElement").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut positioned: Vec<(u64, usize, String)> = items
        .iter()
        .enumerate()
        .filter_map(|(i, item)| {
            let name = item
                .get("name")
                .or_else(|| item.get("item").and_then(|inner| inner.get("name")))
                .and_then(Value::as_str)
                .map(collapse_whitespace)
                .filter(|n| !n.is_empty())?;
            let position = item
                .get("position")
                .and_then(|p| p.as_u64().or_else(|| p.as_str()?.parse().ok()))
                .unwrap_or(u64::MAX);
            Some((position, i, name))
        })
        .collect();

    // Position first, document order for ties and missing positions
    positioned.sort_by_key(|(position, index, _)| (*position, *index));
    positioned.into_iter().map(|(_, _, name)| name).collect()
}

// ---------------------------------------------------------------------------
// Markup
// ---------------------------------------------------------------------------

fn from_markup(doc: &Html) -> Vec<String> {
    doc.select(&CONTAINER_SEL)
        .filter(is_breadcrumb_container)
        .map(crumbs_in)
        .find(|crumbs| !crumbs.is_empty())
        .unwrap_or_default()
}

fn is_breadcrumb_container(el: &ElementRef<'_>) -> bool {
    let v = el.value();
    let mentions = |attr: &str| {
        v.attr(attr)
            .is_some_and(|s| s.to_ascii_lowercase().contains("breadcrumb"))
    };
    mentions("aria-label") || mentions("class") || mentions("id")
}

fn crumbs_in(container: ElementRef<'_>) -> Vec<String> {
    let items: Vec<String> = container.select(&ITEM_SEL).map(|li| element_text(&li)).collect();
    let items = if items.is_empty() {
        container.select(&LINK_SEL).map(|a| element_text(&a)).collect()
    } else {
        items
    };

    items
        .into_iter()
        .filter(|s| !s.is_empty() && !SEPARATORS.contains(&s.as_str()))
        .collect()
}
