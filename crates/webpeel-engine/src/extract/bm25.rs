//! Question-guided block scoring, used by both free-text `question`
//! answers and schema-template field extraction.
//!
//! A genuine BM25 scorer over paragraph-boundary blocks, combined with the
//! phrase-bonus approach from `textprep.rs`. Uses a mean-centered
//! threshold with a never-empty fallback, scored with the standard BM25
//! formula since `textprep.rs` already gives real tokenization to build an
//! index from.

use super::parse::Block;
use crate::textprep::{build_query_phrase_matcher, query_tok_match_strength, scrub, tokenize_query_for_match};
use std::collections::HashMap;

const K1: f64 = 1.2;
const B: f64 = 0.75;
/// Fallback block count when every score falls under the mean*0.5 cutoff
/// but the document is non-empty (never return zero content for a
/// non-empty document just because nothing scored well).
const MIN_FALLBACK_BLOCKS: usize = 3;
/// Threshold multiplier against the mean score: blocks scoring above half
/// the mean survive the cutoff.
const MEAN_THRESHOLD_MULTIPLIER: f64 = 0.5;

#[derive(Debug, Clone)]
pub struct ScoredBlock<'a> {
    pub block: &'a Block,
    pub index: usize,
    pub score: f64,
}

fn term_frequencies(tokens: &[String]) -> HashMap<&str, u32> {
    let mut tf = HashMap::new();
    for t in tokens {
        *tf.entry(t.as_str()).or_insert(0) += 1;
    }
    tf
}

/// Score every block against `query`'s tokens using BM25, with document
/// blocks as the corpus and the query's own terms as the vocabulary.
/// Returns blocks sorted descending by score, pre-filtered to the subset
/// that clears the mean*0.5 threshold (or the top `MIN_FALLBACK_BLOCKS`
/// if none clear it and the document is non-empty).
pub fn select_relevant_blocks<'a>(blocks: &'a [Block], query: &str) -> Vec<ScoredBlock<'a>> {
    if blocks.is_empty() {
        return Vec::new();
    }

    let query_tokens = tokenize_query_for_match(query);
    if query_tokens.is_empty() {
        return blocks
            .iter()
            .enumerate()
            .map(|(index, block)| ScoredBlock { block, index, score: 0.0 })
            .collect();
    }

    let doc_tokens: Vec<Vec<String>> = blocks
        .iter()
        .map(|b| scrub(&b.text).split_whitespace().map(|s| s.to_string()).collect())
        .collect();
    let doc_lens: Vec<usize> = doc_tokens.iter().map(|t| t.len()).collect();
    let avg_len = doc_lens.iter().sum::<usize>() as f64 / doc_lens.len().max(1) as f64;
    let n = blocks.len() as f64;

    // document frequency per query term
    let mut df: HashMap<&str, u32> = HashMap::new();
    for qt in &query_tokens {
        let qt = qt.as_str();
        let count = doc_tokens
            .iter()
            .filter(|toks| toks.iter().any(|t| query_tok_match_strength(qt, t) > 0))
            .count() as u32;
        df.insert(qt, count);
    }

    let phrase_matcher = build_query_phrase_matcher(query);

    let mut scored: Vec<ScoredBlock> = blocks
        .iter()
        .enumerate()
        .map(|(index, block)| {
            let toks = &doc_tokens[index];
            let len = doc_lens[index] as f64;
            let tf = term_frequencies(toks);

            let mut score = 0.0f64;
            for qt in &query_tokens {
                let qt_str = qt.as_str();
                let df_t = *df.get(qt_str).unwrap_or(&0) as f64;
                if df_t == 0.0 {
                    continue;
                }
                let idf = ((n - df_t + 0.5) / (df_t + 0.5) + 1.0).ln();
                // best matching term frequency in this block (exact or prefix)
                let freq: f64 = tf
                    .iter()
                    .filter(|(tok, _)| query_tok_match_strength(qt_str, tok) > 0)
                    .map(|(_, &c)| c as f64)
                    .sum();
                if freq == 0.0 {
                    continue;
                }
                let numer = freq * (K1 + 1.0);
                let denom = freq + K1 * (1.0 - B + B * (len / avg_len.max(1.0)));
                score += idf * (numer / denom);
            }

            score += phrase_matcher.phrase_bonus_for_text(&block.text) as f64 / 100.0;
            ScoredBlock { block, index, score }
        })
        .collect();

    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mean = scored.iter().map(|s| s.score).sum::<f64>() / scored.len() as f64;
    let threshold = mean * MEAN_THRESHOLD_MULTIPLIER;
    let mut above: Vec<ScoredBlock> = scored.iter().filter(|s| s.score > threshold).cloned().collect();

    if above.is_empty() {
        above = scored.into_iter().take(MIN_FALLBACK_BLOCKS).collect();
    }

    above.sort_by_key(|s| s.index);
    above
}

/// Pick the single best-matching block for one schema field question.
/// Returns `None` only when the document has no blocks at
/// all; otherwise always returns the best-available candidate even if its
/// score is low, since a schema field either has an answer in the document
/// or it doesn't — there's no "fallback to top 3" concept at field
/// granularity.
pub fn best_block_for_question<'a>(blocks: &'a [Block], question: &str) -> Option<&'a Block> {
    if blocks.is_empty() {
        return None;
    }
    let scored = select_relevant_blocks(blocks, question);
    scored
        .into_iter()
        .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
        .map(|s| s.block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse::BlockKind;

    fn block(text: &str) -> Block {
        Block { kind: BlockKind::Paragraph, text: text.to_string() }
    }

    #[test]
    fn ranks_relevant_block_above_irrelevant() {
        let blocks = vec![
            block("This paragraph discusses rust memory safety guarantees in depth."),
            block("This paragraph is about gardening tips for tomatoes."),
            block("Another rust systems programming paragraph about ownership and borrowing."),
        ];
        let selected = select_relevant_blocks(&blocks, "rust memory safety");
        assert!(selected.iter().any(|s| s.block.text.contains("memory safety")));
    }

    #[test]
    fn empty_document_returns_empty() {
        let blocks: Vec<Block> = Vec::new();
        assert!(select_relevant_blocks(&blocks, "anything").is_empty());
    }

    #[test]
    fn non_empty_document_never_returns_empty_selection() {
        let blocks = vec![block("totally unrelated content about cooking pasta")];
        let selected = select_relevant_blocks(&blocks, "quantum computing");
        assert!(!selected.is_empty());
    }

    #[test]
    fn best_block_for_question_picks_highest_scoring() {
        let blocks = vec![
            block("The price is $49.99 per unit."),
            block("Shipping takes 3-5 business days."),
        ];
        let best = best_block_for_question(&blocks, "What is the price?").unwrap();
        assert!(best.text.contains("price"));
    }
}
