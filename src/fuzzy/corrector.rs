//! Single-best-replacement and ranked-suggestion entry points for C3, plus the
//! multi-stage consensus algorithm behind them (§4.3).

use crate::config::{FuzzyAlgorithm, SearchConfig};
use crate::fuzzy::algorithms::{
    jaro_winkler_similarity, keyboard_proximity_similarity, levenshtein_distance,
    levenshtein_similarity, phonetic_similarity, trigram_similarity,
};
use crate::fuzzy::vocabulary::Vocabulary;
use crate::types::Suggestion;
use rayon::prelude::*;

/// A handful of frequent misspellings/digraph confusions resolved before any
/// vocabulary lookup happens (§4.3 step 1).
const QUICK_CORRECTIONS: &[(&str, &str)] = &[
    ("fone", "phone"),
    ("thier", "their"),
    ("recieve", "receive"),
    ("seperate", "separate"),
    ("definately", "definitely"),
    ("occured", "occurred"),
    ("wierd", "weird"),
    ("teh", "the"),
    ("adn", "and"),
    ("hte", "the"),
    ("wich", "which"),
    ("becuase", "because"),
    ("foto", "photo"),
    ("emfasis", "emphasis"),
    ("grafic", "graphic"),
    ("elefant", "elephant"),
    ("alfabet", "alphabet"),
];

fn quick_phonetic_correction(t: &str) -> Option<&'static str> {
    let lower = t.to_lowercase();
    QUICK_CORRECTIONS
        .iter()
        .find(|(k, _)| *k == lower)
        .map(|(_, v)| *v)
}

#[derive(Debug, Clone, Copy)]
struct Thresholds {
    correction_threshold: f64,
    max_variations: usize,
    trigram_threshold: f64,
    jaro_winkler_threshold: f64,
    levenshtein_threshold: usize,
}

impl From<&SearchConfig> for Thresholds {
    fn from(c: &SearchConfig) -> Self {
        Self {
            correction_threshold: c.correction_threshold,
            max_variations: c.max_fuzzy_variations,
            trigram_threshold: c.trigram_threshold,
            jaro_winkler_threshold: c.jaro_winkler_threshold,
            levenshtein_threshold: c.levenshtein_threshold,
        }
    }
}

/// One scored vocabulary candidate considered by the consensus stage.
#[derive(Debug, Clone)]
struct Candidate {
    term: String,
    freq: u64,
    trigram: f64,
    levenshtein: f64,
    jaro: f64,
    phonetic: f64,
    keyboard: f64,
    consensus: f64,
    weighted: f64,
}

fn score_candidate(t: &str, original_freq: u64, term: &str, freq: u64) -> Option<Candidate> {
    let trigram = trigram_similarity(t, term);
    let levenshtein = levenshtein_similarity(t, term);
    let jaro = jaro_winkler_similarity(t, term);
    let phonetic = phonetic_similarity(t, term);
    let keyboard = keyboard_proximity_similarity(t, term);

    let positive = [trigram, levenshtein, jaro, phonetic, keyboard]
        .iter()
        .filter(|&&s| s > 0.0)
        .count();
    if positive < 2 {
        return None;
    }

    let mut consensus = 0.25 * trigram + 0.20 * levenshtein + 0.25 * jaro + 0.15 * phonetic + 0.15 * keyboard;
    let above_08 = [trigram, levenshtein, jaro, phonetic, keyboard]
        .iter()
        .filter(|&&s| s > 0.8)
        .count();
    if above_08 >= 2 {
        consensus *= 1.1;
    }

    let freq_weight = (1.0 + ((1.0 + freq as f64).ln()) / 5.0).min(3.0);
    let mut weighted = consensus * freq_weight;

    let rare = original_freq < 3;
    let much_more_frequent = freq as f64 > (original_freq as f64) * 10.0;
    if rare && much_more_frequent {
        weighted *= 1.5;
    }

    Some(Candidate {
        term: term.to_string(),
        freq,
        trigram,
        levenshtein,
        jaro,
        phonetic,
        keyboard,
        consensus,
        weighted,
    })
}

fn consensus_candidates(t: &str, vocab: &Vocabulary) -> Vec<Candidate> {
    let original_freq = vocab.frequency(t);
    let len = t.chars().count();
    let mut out: Vec<Candidate> = vocab
        .terms_near_length(len, 2)
        .into_par_iter()
        .filter(|(term, _)| *term != t)
        .filter_map(|(term, freq)| score_candidate(t, original_freq, term, freq))
        .collect();
    out.sort_by(|a, b| {
        b.consensus
            .partial_cmp(&a.consensus)
            .unwrap()
            .then(b.weighted.partial_cmp(&a.weighted).unwrap())
    });
    out
}

fn validate(t: &str, vocab: &Vocabulary, candidate: &Candidate, th: &Thresholds) -> bool {
    if candidate.consensus < th.correction_threshold {
        return false;
    }
    let t_freq = vocab.frequency(t);
    let oov = !vocab.contains(t);

    (oov && candidate.weighted >= 0.7)
        || (t_freq < 3 && candidate.weighted >= 0.8 && candidate.freq > 2 * t_freq)
        || (candidate.weighted >= 0.9 && candidate.freq > 5 * t_freq)
}

/// Best single-word fuzzy match: edit distance <= 1 among length-similar terms,
/// ranked by `trigram_similarity * log(1+freq)` (§4.3 step 4).
fn best_fuzzy_candidate(t: &str, vocab: &Vocabulary) -> Option<(String, u64)> {
    vocab
        .terms_near_length(t.chars().count(), 1)
        .into_iter()
        .filter(|(term, _)| *term != t && levenshtein_distance(t, term) <= 1)
        .map(|(term, freq)| {
            let score = trigram_similarity(t, term) * (1.0 + freq as f64).ln();
            (term.to_string(), freq, score)
        })
        .max_by(|a, b| a.2.partial_cmp(&b.2).unwrap())
        .map(|(term, freq, _)| (term, freq))
}

/// Best two-word partition with both halves in the vocabulary at frequency >= 5,
/// maximising `log(fa+1) + log(fb+1)` (§4.3 step 4).
fn best_split(t: &str, vocab: &Vocabulary) -> Option<(String, String, u64, u64)> {
    let chars: Vec<char> = t.chars().collect();
    if chars.len() < 2 {
        return None;
    }
    let mut best: Option<(String, String, u64, u64, f64)> = None;
    for i in 1..chars.len() {
        let a: String = chars[..i].iter().collect();
        let b: String = chars[i..].iter().collect();
        if !vocab.contains(&a) || !vocab.contains(&b) {
            continue;
        }
        let fa = vocab.frequency(&a);
        let fb = vocab.frequency(&b);
        if fa < 5 || fb < 5 {
            continue;
        }
        let score = (1.0 + fa as f64).ln() + (1.0 + fb as f64).ln();
        if best.as_ref().map(|x| score > x.4).unwrap_or(true) {
            best = Some((a, b, fa, fb, score));
        }
    }
    best.map(|(a, b, fa, fb, _)| (a, b, fa, fb))
}

/// Decide between the compound-split and single-word-fuzzy candidates (§4.3 step 4).
fn compound_vs_fuzzy(t: &str, vocab: &Vocabulary) -> Option<String> {
    let fuzzy = best_fuzzy_candidate(t, vocab);
    let split = best_split(t, vocab);

    match (fuzzy, split) {
        (Some((fterm, ffreq)), Some((a, b, fa, fb))) => {
            let min_ab = fa.min(fb) as f64;
            let max_ab = fa.max(fb) as f64;
            if ffreq as f64 > min_ab {
                Some(fterm)
            } else if ffreq as f64 >= min_ab * 0.5
                && fterm.chars().count() == t.chars().count()
                && trigram_similarity(t, &fterm) >= 0.5
            {
                // Same-length fuzzy candidate overlaps the split heavily (e.g. "madman"
                // vs "mad max"), but only trust it over the split when its frequency is
                // at least in the same ballpark as the weaker split half — otherwise a
                // low-frequency near-miss like "madman" (55) shouldn't beat a
                // well-attested split like "mad"/"max" (130/161).
                Some(fterm)
            } else if max_ab > 0.0 && min_ab / max_ab < 0.15 {
                Some(fterm)
            } else {
                Some(format!("{a} {b}"))
            }
        }
        (Some((fterm, _)), None) => Some(fterm),
        (None, Some((a, b, _, _))) => Some(format!("{a} {b}")),
        (None, None) => None,
    }
}

pub struct FuzzyCorrector {
    thresholds: Thresholds,
}

impl FuzzyCorrector {
    pub fn new(config: &SearchConfig) -> Self {
        Self {
            thresholds: Thresholds::from(config),
        }
    }

    /// Correct a single token, or return it unchanged if it needs no correction or
    /// no candidate survives validation (§4.3).
    pub fn correct(&self, t: &str, vocab: &Vocabulary) -> String {
        if let Some(fixed) = quick_phonetic_correction(t) {
            return fixed.to_string();
        }
        if t.chars().count() <= 3 {
            return t.to_string();
        }
        if vocab.contains(t) {
            return t.to_string();
        }
        if (4..=10).contains(&t.chars().count()) {
            let exts = vocab.prefix_extensions(t, 5);
            if let Some((term, _)) = exts.iter().max_by(|(ta, fa), (tb, fb)| {
                let score_a = (1.0 + *fa as f64).ln() / (1.0 + (ta.chars().count() - t.chars().count()) as f64);
                let score_b = (1.0 + *fb as f64).ln() / (1.0 + (tb.chars().count() - t.chars().count()) as f64);
                score_a.partial_cmp(&score_b).unwrap()
            }) {
                return term.to_string();
            }
        }
        if let Some(winner) = compound_vs_fuzzy(t, vocab) {
            return winner;
        }

        let candidates = consensus_candidates(t, vocab);
        match candidates.first() {
            Some(best) if validate(t, vocab, best, &self.thresholds) => best.term.clone(),
            _ => t.to_string(),
        }
    }

    /// Up to `max_fuzzy_variations` indexed terms within the algorithm's similarity
    /// cutoff (§4.3 "Variation generators"), used by expansion-mode query rewriting.
    pub fn variations(&self, t: &str, algorithm: FuzzyAlgorithm, vocab: &Vocabulary) -> Vec<String> {
        use FuzzyAlgorithm::*;
        let mut scored: Vec<(String, f64)> = match algorithm {
            Trigram => vocab
                .iter()
                .filter(|(term, _)| *term != t)
                .map(|(term, _)| (term.to_string(), trigram_similarity(t, term)))
                .filter(|(_, s)| *s >= self.thresholds.trigram_threshold)
                .collect(),
            JaroWinkler => vocab
                .iter()
                .filter(|(term, _)| *term != t)
                .map(|(term, _)| (term.to_string(), jaro_winkler_similarity(t, term)))
                .filter(|(_, s)| *s >= self.thresholds.jaro_winkler_threshold)
                .collect(),
            Levenshtein => vocab
                .terms_near_length(t.chars().count(), self.thresholds.levenshtein_threshold)
                .into_iter()
                .filter(|(term, _)| *term != t)
                .filter(|(term, _)| shares_a_bigram(t, term))
                .map(|(term, _)| {
                    let d = levenshtein_distance(t, term);
                    (term.to_string(), d)
                })
                .filter(|(_, d)| *d <= self.thresholds.levenshtein_threshold)
                .map(|(term, d)| (term, 1.0 / (1.0 + d as f64)))
                .collect(),
            Basic => vocab
                .iter()
                .filter(|(term, _)| *term != t)
                .filter(|(term, _)| term.to_lowercase().contains(&t.to_lowercase()) || t.to_lowercase().contains(&term.to_lowercase()))
                .map(|(term, _)| (term.to_string(), 1.0))
                .collect(),
        };
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(self.thresholds.max_variations);
        scored.into_iter().map(|(t, _)| t).collect()
    }

    /// Ranked corrections with confidence and an explanation tag (§4.3 `suggest`).
    pub fn suggest(&self, t: &str, k: usize, vocab: &Vocabulary) -> Vec<Suggestion> {
        if let Some(fixed) = quick_phonetic_correction(t) {
            return vec![Suggestion {
                text: fixed.to_string(),
                confidence: 1.0,
                correction_type: "phonetic".to_string(),
            }];
        }
        let candidates = consensus_candidates(t, vocab);
        candidates
            .into_iter()
            .take(k)
            .map(|c| Suggestion {
                text: c.term,
                confidence: c.weighted.min(1.0),
                correction_type: "consensus".to_string(),
            })
            .collect()
    }

    /// `(text, score, count)` form of [`Self::suggest`] (§6 `suggest(term, options)`):
    /// `count` is the candidate's raw vocabulary document frequency, where `suggest`
    /// only exposes the normalized consensus confidence.
    pub fn suggest_ranked(&self, t: &str, k: usize, vocab: &Vocabulary) -> Vec<(String, f64, u64)> {
        if let Some(fixed) = quick_phonetic_correction(t) {
            return vec![(fixed.to_string(), 1.0, vocab.frequency(fixed))];
        }
        consensus_candidates(t, vocab)
            .into_iter()
            .take(k)
            .map(|c| (c.term, c.weighted.min(1.0), c.freq))
            .collect()
    }
}

fn bigrams(s: &str) -> std::collections::HashSet<(char, char)> {
    let chars: Vec<char> = s.chars().collect();
    chars.windows(2).map(|w| (w[0], w[1])).collect()
}

fn shares_a_bigram(a: &str, b: &str) -> bool {
    !bigrams(a).is_disjoint(&bigrams(b))
}

/// Merge adjacent query tokens into one if their concatenation is itself an
/// in-vocabulary term (§4.3 "Token merging").
pub fn merge_adjacent_tokens(tokens: &[String], vocab: &Vocabulary) -> Vec<String> {
    let mut out = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len() {
            let merged = format!("{}{}", tokens[i], tokens[i + 1]);
            if vocab.contains(&merged) {
                out.push(merged);
                i += 2;
                continue;
            }
        }
        out.push(tokens[i].clone());
        i += 1;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocab_with(pairs: &[(&str, u64)]) -> Vocabulary {
        Vocabulary::from_terms(pairs.iter().map(|(t, f)| (t.to_string(), *f)))
    }

    #[test]
    fn quick_correction_short_circuits() {
        let v = vocab_with(&[]);
        let corrector = FuzzyCorrector::new(&SearchConfig::default());
        assert_eq!(corrector.correct("fone", &v), "phone");
    }

    #[test]
    fn short_tokens_pass_through() {
        let v = vocab_with(&[("cat", 10)]);
        let corrector = FuzzyCorrector::new(&SearchConfig::default());
        assert_eq!(corrector.correct("cta", &v), "cta");
    }

    #[test]
    fn vocabulary_hit_returns_unchanged() {
        let v = vocab_with(&[("rocket", 10)]);
        let corrector = FuzzyCorrector::new(&SearchConfig::default());
        assert_eq!(corrector.correct("rocket", &v), "rocket");
    }

    #[test]
    fn compound_fuzzy_prefers_single_word_when_more_frequent() {
        // S3: batmen -> batman (single-word fuzzy wins over any split)
        let v = vocab_with(&[("batman", 55), ("bat", 24), ("men", 50)]);
        let corrector = FuzzyCorrector::new(&SearchConfig::default());
        assert_eq!(corrector.correct("batmen", &v), "batman");
    }

    #[test]
    fn compound_split_wins_when_unbalanced_and_no_fuzzy() {
        // S3: madmax -> "mad max". "madman" is within edit distance 1 of "madmax"
        // but its frequency (55) is too far below the weaker split half ("mad", 130)
        // to override a well-attested split.
        let v = vocab_with(&[("mad", 130), ("max", 161), ("madman", 55)]);
        let corrector = FuzzyCorrector::new(&SearchConfig::default());
        assert_eq!(corrector.correct("madmax", &v), "mad max");
    }

    #[test]
    fn token_merging_joins_in_vocabulary_pair() {
        let v = vocab_with(&[("database", 5)]);
        let merged = merge_adjacent_tokens(
            &["data".to_string(), "base".to_string(), "server".to_string()],
            &v,
        );
        assert_eq!(merged, vec!["database".to_string(), "server".to_string()]);
    }
}
