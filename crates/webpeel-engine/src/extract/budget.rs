//! Token-budget enforcement: trim rendered content down to a token budget
//! by dropping the lowest-value blocks first, never splitting a block
//! mid-sentence.
//!
//! Value-ordered block pruning rather than a flat character cutoff, since
//! the distilled output here is block-structured rather than a single
//! opaque string.

use super::parse::{Block, BlockKind};

/// ~4 characters per token, a common tokenizer-agnostic estimate used
/// elsewhere for budget planning.
pub fn estimate_tokens(text: &str) -> u64 {
    ((text.chars().count() as f64) / 4.0).ceil() as u64
}

/// Heuristic value weight for a block kind when deciding what to drop
/// first under budget pressure: headings anchor structure and survive
/// longest, code/table rows are the most disposable filler.
fn block_priority(kind: &BlockKind) -> u32 {
    match kind {
        BlockKind::Heading(_) => 100,
        BlockKind::Paragraph => 80,
        BlockKind::Blockquote => 60,
        BlockKind::ListItem => 50,
        BlockKind::TableRow => 30,
        BlockKind::Code => 20,
    }
}

/// Drop the lowest-priority blocks (ties broken by later document
/// position first, since earlier content is more likely to carry the lede)
/// until the remaining blocks' rendered text fits within `budget_tokens`.
/// Always keeps at least one block if the input is non-empty.
pub fn prune_to_budget(blocks: Vec<Block>, budget_tokens: u64) -> Vec<Block> {
    if blocks.is_empty() {
        return blocks;
    }

    fn joined_tokens(items: &[Block]) -> u64 {
        estimate_tokens(&items.iter().map(|b| b.text.as_str()).collect::<Vec<_>>().join("\n\n"))
    }

    let original_order: Vec<Block> = blocks.clone();
    if joined_tokens(&original_order) <= budget_tokens {
        return original_order;
    }

    // Drop order: lowest priority first, then latest document position
    // first, so among equally disposable blocks we keep the earlier one.
    let mut drop_order: Vec<usize> = (0..blocks.len()).collect();
    drop_order.sort_by(|&a, &b| {
        let pa = block_priority(&blocks[a].kind);
        let pb = block_priority(&blocks[b].kind);
        pa.cmp(&pb).then_with(|| b.cmp(&a))
    });

    let mut alive = vec![true; blocks.len()];
    for idx in drop_order {
        if alive.iter().filter(|&&a| a).count() <= 1 {
            break;
        }
        alive[idx] = false;
        let remaining: Vec<Block> = blocks
            .iter()
            .zip(alive.iter())
            .filter(|(_, &a)| a)
            .map(|(b, _)| b.clone())
            .collect();
        if joined_tokens(&remaining) <= budget_tokens {
            break;
        }
    }

    blocks.into_iter().zip(alive).filter(|(_, a)| *a).map(|(b, _)| b).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(kind: BlockKind, text: &str) -> Block {
        Block { kind, text: text.to_string() }
    }

    #[test]
    fn estimate_tokens_roughly_quarters_char_count() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn under_budget_keeps_everything() {
        let blocks = vec![block(BlockKind::Paragraph, "short text")];
        let pruned = prune_to_budget(blocks.clone(), 1000);
        assert_eq!(pruned.len(), blocks.len());
    }

    #[test]
    fn over_budget_drops_code_before_headings() {
        let blocks = vec![
            block(BlockKind::Heading(1), "Important Title"),
            block(BlockKind::Code, &"x".repeat(400)),
        ];
        let pruned = prune_to_budget(blocks, 5);
        assert!(pruned.iter().any(|b| matches!(b.kind, BlockKind::Heading(_))));
    }

    #[test]
    fn never_empties_non_empty_input() {
        let blocks = vec![block(BlockKind::Paragraph, &"word ".repeat(1000))];
        let pruned = prune_to_budget(blocks, 1);
        assert_eq!(pruned.len(), 1);
    }
}
