//! The five similarity primitives the consensus corrector blends (§4.3).

use std::collections::HashSet;

/// n-gram set of a string. Uses 2-grams for tokens of length <= 4 (too short for
/// trigrams to be informative) and 3-grams otherwise, per the adaptive rule in the
/// variation generators (§4.3).
fn ngrams(s: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() < n {
        return HashSet::from([s.to_string()]);
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

fn adaptive_n(a: &str, b: &str) -> usize {
    if a.chars().count() <= 4 || b.chars().count() <= 4 {
        2
    } else {
        3
    }
}

/// Ratio of shared n-character substrings over the union of both strings' n-gram
/// sets.
pub fn trigram_similarity(a: &str, b: &str) -> f64 {
    let n = adaptive_n(a, b);
    let ga = ngrams(a, n);
    let gb = ngrams(b, n);
    if ga.is_empty() && gb.is_empty() {
        return 1.0;
    }
    let intersection = ga.intersection(&gb).count();
    let union = ga.union(&gb).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    strsim::levenshtein(a, b)
}

/// Levenshtein expressed as a [0, 1] similarity, normalised by the longer string.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let dist = levenshtein_distance(a, b) as f64;
    let max_len = a.chars().count().max(b.chars().count()).max(1) as f64;
    (1.0 - dist / max_len).max(0.0)
}

pub fn jaro_winkler_similarity(a: &str, b: &str) -> f64 {
    strsim::jaro_winkler(a, b)
}

/// A coarse phonetic key (Soundex-flavoured): first letter kept, remaining letters
/// mapped to a digit class, vowels and duplicates dropped, padded/truncated to 4
/// characters.
pub fn phonetic_key(s: &str) -> String {
    let lower = s.to_lowercase();
    let mut chars = lower.chars().filter(|c| c.is_ascii_alphabetic());
    let first = match chars.next() {
        Some(c) => c,
        None => return String::new(),
    };

    let code = |c: char| -> Option<char> {
        match c {
            'b' | 'f' | 'p' | 'v' => Some('1'),
            'c' | 'g' | 'j' | 'k' | 'q' | 's' | 'x' | 'z' => Some('2'),
            'd' | 't' => Some('3'),
            'l' => Some('4'),
            'm' | 'n' => Some('5'),
            'r' => Some('6'),
            _ => None,
        }
    };

    let mut out = String::new();
    out.push(first.to_ascii_uppercase());
    let mut last_code = code(first);
    for c in chars {
        let this_code = code(c);
        if this_code.is_some() && this_code != last_code {
            out.push(this_code.unwrap());
        }
        last_code = this_code;
        if out.len() >= 4 {
            break;
        }
    }
    while out.len() < 4 {
        out.push('0');
    }
    out
}

pub fn phonetic_similarity(a: &str, b: &str) -> f64 {
    if phonetic_key(a) == phonetic_key(b) {
        1.0
    } else {
        0.0
    }
}

/// QWERTY physical-key adjacency, used to weight likely fat-finger substitutions.
fn qwerty_neighbors(c: char) -> &'static [char] {
    match c {
        'q' => &['w', 'a'],
        'w' => &['q', 'e', 'a', 's'],
        'e' => &['w', 'r', 's', 'd'],
        'r' => &['e', 't', 'd', 'f'],
        't' => &['r', 'y', 'f', 'g'],
        'y' => &['t', 'u', 'g', 'h'],
        'u' => &['y', 'i', 'h', 'j'],
        'i' => &['u', 'o', 'j', 'k'],
        'o' => &['i', 'p', 'k', 'l'],
        'p' => &['o', 'l'],
        'a' => &['q', 'w', 's', 'z'],
        's' => &['a', 'w', 'e', 'd', 'z', 'x'],
        'd' => &['s', 'e', 'r', 'f', 'x', 'c'],
        'f' => &['d', 'r', 't', 'g', 'c', 'v'],
        'g' => &['f', 't', 'y', 'h', 'v', 'b'],
        'h' => &['g', 'y', 'u', 'j', 'b', 'n'],
        'j' => &['h', 'u', 'i', 'k', 'n', 'm'],
        'k' => &['j', 'i', 'o', 'l', 'm'],
        'l' => &['k', 'o', 'p'],
        'z' => &['a', 's', 'x'],
        'x' => &['z', 's', 'd', 'c'],
        'c' => &['x', 'd', 'f', 'v'],
        'v' => &['c', 'f', 'g', 'b'],
        'b' => &['v', 'g', 'h', 'n'],
        'n' => &['b', 'h', 'j', 'm'],
        'm' => &['n', 'j', 'k'],
        _ => &[],
    }
}

/// Position-wise comparison: equal-length strings score 1.0 per matching
/// character and 0.5 per adjacent-key substitution, averaged over length.
/// Different-length strings score 0 — keyboard proximity only makes sense for
/// single-character-substitution typos.
pub fn keyboard_proximity_similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.to_lowercase().chars().collect();
    let b_chars: Vec<char> = b.to_lowercase().chars().collect();
    if a_chars.len() != b_chars.len() || a_chars.is_empty() {
        return 0.0;
    }
    let total: f64 = a_chars
        .iter()
        .zip(b_chars.iter())
        .map(|(&x, &y)| {
            if x == y {
                1.0
            } else if qwerty_neighbors(x).contains(&y) {
                0.5
            } else {
                0.0
            }
        })
        .sum();
    total / a_chars.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigram_identical_is_one() {
        assert_eq!(trigram_similarity("batman", "batman"), 1.0);
    }

    #[test]
    fn trigram_unrelated_is_low() {
        assert!(trigram_similarity("batman", "zzzzzz") < 0.2);
    }

    #[test]
    fn levenshtein_single_substitution() {
        assert_eq!(levenshtein_distance("fone", "bone"), 1);
    }

    #[test]
    fn jaro_winkler_prefix_boost() {
        let sim = jaro_winkler_similarity("martha", "marhta");
        assert!(sim > 0.9);
    }

    #[test]
    fn phonetic_matches_similar_sounding_words() {
        assert_eq!(phonetic_key("robert"), phonetic_key("rupert"));
    }

    #[test]
    fn keyboard_proximity_adjacent_key_scores_partial() {
        // "fone" vs "done": f/d not adjacent on qwerty -> first char scores 0
        let sim = keyboard_proximity_similarity("gone", "fone");
        assert!(sim > 0.5 && sim < 1.0);
    }

    #[test]
    fn keyboard_proximity_different_length_is_zero() {
        assert_eq!(keyboard_proximity_similarity("cat", "cats"), 0.0);
    }
}
