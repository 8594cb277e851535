use std::collections::HashSet;

use crate::models::work_item::WorkItem;

/// Collapse duplicate `(url, body)` work items, keeping the first occurrence.
pub fn dedupe(items: Vec<WorkItem>) -> Vec<WorkItem> {
    let mut seen: HashSet<WorkItem> = HashSet::with_capacity(items.len());
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(item.clone()) {
            unique.push(item);
        }
    }
    unique
}
