//! Route-based deduplication (§4.5 "Deduplication"): result items that share the
//! same `metadata.route` are merged into one, with per-chunk scores summed and the
//! number of merged chunks exposed as `chunk_count`.

use std::collections::BTreeMap;

use crate::types::SearchResultItem;

pub fn dedupe_by_route(items: Vec<SearchResultItem>) -> Vec<SearchResultItem> {
    let mut order: Vec<String> = Vec::new();
    let mut buckets: BTreeMap<String, Vec<SearchResultItem>> = BTreeMap::new();
    let mut passthrough = Vec::new();

    for item in items {
        match &item.route {
            Some(route) => {
                if !buckets.contains_key(route) {
                    order.push(route.clone());
                }
                buckets.entry(route.clone()).or_default().push(item);
            }
            None => passthrough.push(item),
        }
    }

    let mut out: Vec<SearchResultItem> = order
        .into_iter()
        .filter_map(|route| buckets.remove(&route))
        .map(merge_route_group)
        .collect();
    out.extend(passthrough);
    out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    out
}

fn merge_route_group(mut group: Vec<SearchResultItem>) -> SearchResultItem {
    group.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    let chunk_count = group.len();
    let total_score: f64 = group.iter().map(|g| g.score).sum();
    let mut best = group.remove(0);
    for rest in group {
        for (field, snippets) in rest.highlights {
            best.highlights.entry(field).or_default().extend(snippets);
        }
    }
    best.score = total_score;
    best.chunk_count = Some(chunk_count);
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap as Map;

    fn item(id: &str, route: Option<&str>, score: f64) -> SearchResultItem {
        SearchResultItem {
            id: id.to_string(),
            score,
            content: Map::new(),
            metadata: json!({}),
            distance: None,
            bearing: None,
            cardinal: None,
            highlights: Map::new(),
            route: route.map(|r| r.to_string()),
            chunk_count: None,
        }
    }

    #[test]
    fn merges_items_sharing_a_route() {
        let items = vec![item("a", Some("/page"), 10.0), item("b", Some("/page"), 5.0), item("c", None, 1.0)];
        let out = dedupe_by_route(items);
        let merged = out.iter().find(|i| i.route.as_deref() == Some("/page")).unwrap();
        assert_eq!(merged.chunk_count, Some(2));
        assert_eq!(merged.score, 15.0);
    }

    #[test]
    fn items_without_route_pass_through_unmerged() {
        let items = vec![item("a", None, 10.0), item("b", None, 5.0)];
        let out = dedupe_by_route(items);
        assert_eq!(out.len(), 2);
    }
}
