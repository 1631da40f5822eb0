//! List page parsing
//!
//! The upstream is inconsistent about where it puts list items and
//! pagination metadata. Both are read through ordered strategy tables;
//! the first strategy that matches wins, and a body matching none of them
//! is an empty, final page.
//!
//! | Priority | Pagination signal                                   |
//! |----------|-----------------------------------------------------|
//! | 1        | top-level `has_more` boolean                        |
//! | 2        | `meta.pagination.has_more` boolean                  |
//! | 3        | `page < total_pages` (top-level or `meta.pagination`) |
//! | 4        | a non-null `next_page` field                         |

use salesync_core::ports::ListPage;
use serde_json::Value;

/// Where list items may live, in priority order
const ITEM_PATHS: &[&str] = &["data", "items", "results", "data.items", "data.results"];

type PaginationProbe = fn(&Value, u32) -> Option<bool>;

/// Pagination strategies, in priority order
const PAGINATION_STRATEGIES: &[(&str, PaginationProbe)] = &[
    ("has_more", probe_has_more),
    ("meta.pagination.has_more", probe_meta_has_more),
    ("total_pages", probe_total_pages),
    ("next_page", probe_next_page),
];

fn lookup<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(value, |current, key| current.get(key))
        .filter(|v| !v.is_null())
}

fn as_u32(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn probe_has_more(body: &Value, _page: u32) -> Option<bool> {
    lookup(body, "has_more")?.as_bool()
}

fn probe_meta_has_more(body: &Value, _page: u32) -> Option<bool> {
    lookup(body, "meta.pagination.has_more")?.as_bool()
}

fn probe_total_pages(body: &Value, page: u32) -> Option<bool> {
    let total = ["total_pages", "meta.pagination.total_pages"]
        .iter()
        .find_map(|path| lookup(body, path).and_then(as_u32))?;
    let current = ["page", "meta.pagination.page", "meta.pagination.current_page"]
        .iter()
        .find_map(|path| lookup(body, path).and_then(as_u32))
        .unwrap_or(page);
    Some(current < total)
}

fn probe_next_page(body: &Value, _page: u32) -> Option<bool> {
    ["next_page", "meta.pagination.next_page"]
        .iter()
        .any(|path| lookup(body, path).is_some())
        .then_some(true)
}

/// Items of the page; an unrecognized shape yields no items
pub fn extract_items(body: &Value) -> Vec<Value> {
    if let Value::Array(items) = body {
        return items.clone();
    }
    ITEM_PATHS
        .iter()
        .find_map(|path| lookup(body, path).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

/// Whether more pages follow, and which strategy decided it
pub fn detect_has_more(body: &Value, page: u32) -> (bool, Option<&'static str>) {
    PAGINATION_STRATEGIES
        .iter()
        .find_map(|(name, probe)| probe(body, page).map(|more| (more, Some(*name))))
        .unwrap_or((false, None))
}

/// Explicit next page number, if the body names one
pub fn explicit_next_page(body: &Value) -> Option<u32> {
    ["next_page", "meta.pagination.next_page"]
        .iter()
        .find_map(|path| lookup(body, path).and_then(as_u32))
}

/// Parses a list response fetched for `page`
pub fn parse_page(body: &Value, page: u32) -> ListPage {
    let (has_more, _) = detect_has_more(body, page);
    ListPage {
        items: extract_items(body),
        has_more,
        next_page: if has_more {
            explicit_next_page(body)
        } else {
            None
        },
    }
}
