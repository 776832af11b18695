//! Small text-normalization helpers used by the distillation pipeline's
//! query matching and chunking.
//!
//! `aho-corasick` drives the multi-phrase matching: a single pass scans for
//! every phrase in a query at once rather than scanning once per phrase.

use aho_corasick::AhoCorasick;

/// ASCII-lowercase, collapse whitespace/`-`/`_`/`/` runs into a single
/// space, drop other punctuation.
pub fn scrub(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut last_was_space = true;
    for ch in s.chars() {
        let lower = ch.to_ascii_lowercase();
        if lower.is_ascii_alphanumeric() {
            out.push(lower);
            last_was_space = false;
        } else if lower == '-' || lower == '_' || lower == '/' || lower.is_whitespace() {
            if !last_was_space {
                out.push(' ');
                last_was_space = true;
            }
        }
        // other punctuation dropped entirely
    }
    out.trim_end().to_string()
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "from", "has", "have", "he",
    "her", "his", "how", "i", "if", "in", "into", "is", "it", "its", "of", "on", "or", "our",
    "she", "that", "the", "their", "them", "then", "there", "these", "they", "this", "to", "was",
    "we", "were", "what", "when", "where", "which", "who", "why", "will", "with", "you", "your",
];

pub fn is_english_stopword(tok: &str) -> bool {
    STOPWORDS.binary_search(&tok).is_ok() || STOPWORDS.contains(&tok)
}

fn is_query_noise_token(tok: &str) -> bool {
    if tok == "http" || tok == "https" || tok == "www" {
        return true;
    }
    if tok.len() <= 2 && tok.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    // version/release markers like v2, rc1
    if tok.len() >= 2 {
        let mut chars = tok.chars();
        let first = chars.next().unwrap();
        if (first == 'v' || first == 'r') && chars.clone().all(|c| c.is_ascii_digit()) {
            return true;
        }
        if tok.starts_with("rc") && tok[2..].chars().all(|c| c.is_ascii_digit()) {
            return true;
        }
    }
    false
}

/// Tokenize a user query into alnum runs for match-strength scoring,
/// dropping stopwords/noise tokens unless doing so would leave nothing.
pub fn tokenize_query_for_match(query: &str) -> Vec<String> {
    let scrubbed = scrub(query);
    let all: Vec<String> = scrubbed
        .split_whitespace()
        .map(|s| s.to_string())
        .filter(|t| !t.is_empty())
        .collect();
    let filtered: Vec<String> = all
        .iter()
        .filter(|t| !is_english_stopword(t) && !is_query_noise_token(t))
        .cloned()
        .collect();
    if filtered.is_empty() {
        all
    } else {
        filtered
    }
}

/// Tokenize a query into the phrase candidates (bigrams/trigrams) used for
/// phrase-match bonuses.
pub fn tokenize_query_for_phrases(query: &str) -> Vec<String> {
    let toks = tokenize_query_for_match(query);
    let mut phrases = Vec::new();
    for w in toks.windows(2) {
        phrases.push(format!("{} {}", w[0], w[1]));
    }
    for w in toks.windows(3) {
        phrases.push(format!("{} {} {}", w[0], w[1], w[2]));
    }
    phrases
}

/// Match strength of a single query token against a candidate token:
/// exact=2, prefix=1, none=0. Numeric/very-short tokens require an exact
/// match to avoid spurious prefix hits (e.g. query `"5"` matching `"50"`).
pub fn query_tok_match_strength(query_tok: &str, candidate_tok: &str) -> u8 {
    if query_tok == candidate_tok {
        return 2;
    }
    let numeric_or_short = query_tok.len() <= 2 || query_tok.chars().all(|c| c.is_ascii_digit());
    if numeric_or_short {
        return 0;
    }
    if candidate_tok.starts_with(query_tok) {
        1
    } else {
        0
    }
}

/// A phrase matcher built once per query and reused across every candidate
/// block: an Aho-Corasick automaton scans for every phrase in a single
/// pass.
pub struct PhraseMatcher {
    ac: Option<AhoCorasick>,
    weights: Vec<u32>,
}

/// Per-phrase weight: bigrams score lower than trigrams since longer exact
/// phrase hits are stronger relevance signals.
fn phrase_weight(phrase: &str) -> u32 {
    match phrase.split_whitespace().count() {
        0 | 1 => 0,
        2 => 120,
        3 => 200,
        _ => 150,
    }
}

pub fn build_query_phrase_matcher(query: &str) -> PhraseMatcher {
    let phrases = tokenize_query_for_phrases(query);
    if phrases.is_empty() {
        return PhraseMatcher { ac: None, weights: Vec::new() };
    }
    let weights = phrases.iter().map(|p| phrase_weight(p)).collect();
    let ac = AhoCorasick::builder()
        .ascii_case_insensitive(true)
        .build(&phrases)
        .ok();
    PhraseMatcher { ac, weights }
}

impl PhraseMatcher {
    /// Sum of weights for every distinct phrase that appears in `text`.
    pub fn phrase_bonus_for_text(&self, text: &str) -> u32 {
        let Some(ac) = &self.ac else { return 0 };
        let scrubbed = scrub(text);
        let mut seen = std::collections::HashSet::new();
        let mut bonus = 0;
        for m in ac.find_iter(&scrubbed) {
            if seen.insert(m.pattern()) {
                bonus += self.weights.get(m.pattern().as_usize()).copied().unwrap_or(0);
            }
        }
        bonus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrub_collapses_punctuation_and_case() {
        assert_eq!(scrub("Hello---World_Foo/Bar"), "hello world foo bar");
        assert_eq!(scrub("Don't Panic!"), "dont panic");
    }

    #[test]
    fn stopwords_and_noise_filtered_unless_all_noise() {
        let toks = tokenize_query_for_match("how to fix the bug");
        assert!(toks.contains(&"fix".to_string()));
        assert!(toks.contains(&"bug".to_string()));
        assert!(!toks.contains(&"the".to_string()));

        let all_stop = tokenize_query_for_match("the a an");
        assert!(!all_stop.is_empty());
    }

    #[test]
    fn match_strength_exact_beats_prefix_beats_none() {
        assert_eq!(query_tok_match_strength("render", "render"), 2);
        assert_eq!(query_tok_match_strength("rend", "render"), 1);
        assert_eq!(query_tok_match_strength("zzz", "render"), 0);
    }

    #[test]
    fn numeric_tokens_require_exact_match() {
        assert_eq!(query_tok_match_strength("5", "50"), 0);
    }

    #[test]
    fn phrase_matcher_scores_multi_word_hits() {
        let pm = build_query_phrase_matcher("rust error handling patterns");
        let bonus_hit = pm.phrase_bonus_for_text("this covers rust error handling in depth");
        let bonus_miss = pm.phrase_bonus_for_text("unrelated content about gardening");
        assert!(bonus_hit > bonus_miss);
    }
}
