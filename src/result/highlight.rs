//! Snippet extraction and `<mark>`-style tagging (§4.5 "Highlighting").
//!
//! Tokens handed in here are already the clean query tokens carried on
//! [`crate::types::PlannedQuery`] (`original_tokens` + `fuzzy_tokens`), so there is no
//! FTS5 operator syntax (`NEAR`, `OR`, `*`, quoting) left to strip.

use regex::RegexBuilder;

/// One highlighted snippet around the earliest match of any `tokens` entry (or its
/// simple plural) in `text`, wrapped with `tag_open`/`tag_close`. `None` when nothing
/// in `tokens` occurs in `text`.
pub fn highlight_field(text: &str, tokens: &[String], tag_open: &str, tag_close: &str, snippet_length: usize) -> Option<String> {
    if text.is_empty() || tokens.is_empty() {
        return None;
    }

    let mut terms: Vec<String> = Vec::new();
    for t in tokens {
        if t.is_empty() {
            continue;
        }
        terms.push(t.clone());
        if !t.ends_with('s') {
            let plural = if t.ends_with('x') || t.ends_with('z') || t.ends_with("ch") || t.ends_with("sh") {
                format!("{t}es")
            } else {
                format!("{t}s")
            };
            terms.push(plural);
        }
    }
    // Longest terms first so a shorter term's span never gets selected over a longer
    // one that contains it.
    terms.sort_by(|a, b| b.len().cmp(&a.len()));
    terms.dedup();

    let lower = text.to_lowercase();
    let first_match = terms
        .iter()
        .filter_map(|t| lower.find(&t.to_lowercase()))
        .min()?;

    let half = snippet_length / 2;
    let start = floor_char_boundary(text, first_match.saturating_sub(half));
    let end = ceil_char_boundary(text, (first_match + half).min(text.len()));

    let mut window = text[start..end].to_string();
    let truncated_start = start > 0;
    let truncated_end = end < text.len();

    let mut spans: Vec<(usize, usize)> = Vec::new();
    for term in &terms {
        let Ok(re) = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(term))).case_insensitive(true).build() else {
            continue;
        };
        spans.extend(re.find_iter(&window).map(|m| (m.start(), m.end())));
    }
    if spans.is_empty() {
        return None;
    }
    spans.sort_by_key(|s| s.0);
    let mut merged: Vec<(usize, usize)> = Vec::new();
    for (s, e) in spans {
        match merged.last_mut() {
            Some(last) if s <= last.1 => last.1 = last.1.max(e),
            _ => merged.push((s, e)),
        }
    }

    let mut out = String::new();
    let mut cursor = 0;
    for (s, e) in merged {
        out.push_str(&window[cursor..s]);
        out.push_str(tag_open);
        out.push_str(&window[s..e]);
        out.push_str(tag_close);
        cursor = e;
    }
    out.push_str(&window[cursor..]);
    window = out;

    if truncated_start {
        window = format!("…{window}");
    }
    if truncated_end {
        window = format!("{window}…");
    }
    Some(window)
}

fn floor_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_char_boundary(s: &str, idx: usize) -> usize {
    let mut i = idx.min(s.len());
    while i < s.len() && !s.is_char_boundary(i) {
        i += 1;
    }
    i
}
