//! Deterministic clean-up of service output.

use crate::models::ClinicalSummary;

/// Canonical safety-netting advice, always the last pending task.
pub const DEFAULT_SAFETY_NET: &str = "Safety-net advice given: if symptoms worsen or new symptoms develop, seek urgent medical review or call 999 in an emergency.";

/// Pending tasks containing any of these (case-insensitive) are replaced by the
/// canonical advice.
pub const SAFETY_NET_TRIGGERS: [&str; 2] = ["symptoms worsen", "999"];

/// Default similarity above which two items count as duplicates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.9;

/// Whether an item carries safety-netting advice.
pub fn contains_trigger(item: &str) -> bool {
    let lower = item.to_lowercase();
    SAFETY_NET_TRIGGERS.iter().any(|trigger| lower.contains(trigger))
}

/// Drop existing safety-netting items and append `safety_net` once, last.
pub fn apply_safety_net(mut items: Vec<String>, safety_net: &str) -> Vec<String> {
    items.retain(|item| !contains_trigger(item));
    items.push(safety_net.to_string());
    items
}

/// Lowercase, collapse whitespace, strip trailing full stops.
pub fn normalize_item(item: &str) -> String {
    item.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches('.')
        .to_string()
}

/// Digits in order of appearance. Items whose numbers differ (doses, lab values,
/// dates) are never duplicates of each other.
fn digit_sequence(item: &str) -> String {
    item.chars().filter(char::is_ascii_digit).collect()
}

pub fn is_near_duplicate(a: &str, b: &str, threshold: f64) -> bool {
    let a = normalize_item(a);
    let b = normalize_item(b);
    if a == b {
        return true;
    }
    digit_sequence(&a) == digit_sequence(&b) && strsim::normalized_levenshtein(&a, &b) >= threshold
}

/// Trim items, drop blanks and near-duplicates. The first occurrence wins.
pub fn dedupe_items(items: Vec<String>, threshold: f64) -> Vec<String> {
    let mut kept: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        if kept.iter().any(|k| is_near_duplicate(k, item, threshold)) {
            continue;
        }
        kept.push(item.to_string());
    }
    kept
}

/// Full clean-up. Safety-netting items leave the pending tasks before dedupe, so
/// they never absorb an ordinary task that happens to read alike.
pub fn post_process(mut summary: ClinicalSummary, safety_net: &str, threshold: f64) -> ClinicalSummary {
    summary.pending_tasks.retain(|item| !contains_trigger(item));
    let mut summary = summary.map_lists(|items| dedupe_items(items, threshold));
    summary.pending_tasks = apply_safety_net(std::mem::take(&mut summary.pending_tasks), safety_net);
    summary
}
