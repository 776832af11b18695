//! Schema-template field extraction: answer a fixed set of field questions
//! against the document's blocks and assemble a flat JSON object.
//!
//! Reuses this module's own `bm25::best_block_for_question` rather than a
//! second separate scorer.

use super::bm25::best_block_for_question;
use super::parse::Block;
use std::collections::BTreeMap;
use webpeel_core::SchemaSelector;

/// Resolve a `SchemaSelector` (named template or custom field->question
/// map) into the ordered list of (field, question) pairs to answer.
fn field_questions(selector: &SchemaSelector) -> Vec<(String, String)> {
    match selector {
        SchemaSelector::Named(template) => template
            .field_questions()
            .iter()
            .map(|(f, q)| (f.to_string(), q.to_string()))
            .collect(),
        SchemaSelector::Custom(map) => map.iter().map(|(f, q)| (f.clone(), q.clone())).collect(),
    }
}

/// Extract one answer per schema field by selecting the best-matching
/// block for that field's question. Fields whose document is empty get no
/// entry at all rather than an empty-string placeholder.
pub fn extract_schema(blocks: &[Block], selector: &SchemaSelector) -> serde_json::Value {
    let mut out = BTreeMap::new();
    for (field, question) in field_questions(selector) {
        if let Some(block) = best_block_for_question(blocks, &question) {
            out.insert(field, serde_json::Value::String(block.text.clone()));
        }
    }
    serde_json::to_value(out).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse::BlockKind;
    use webpeel_core::SchemaTemplate;

    #[test]
    fn product_template_fills_known_fields() {
        let blocks = vec![
            Block { kind: BlockKind::Heading(1), text: "Wireless Mouse".into() },
            Block { kind: BlockKind::Paragraph, text: "The price is $29.99 and it is in stock.".into() },
        ];
        let result = extract_schema(&blocks, &SchemaSelector::Named(SchemaTemplate::Product));
        assert!(result.get("price").is_some());
    }

    #[test]
    fn custom_selector_uses_caller_supplied_questions() {
        let mut map = BTreeMap::new();
        map.insert("color".to_string(), "What color is it?".to_string());
        let blocks = vec![Block { kind: BlockKind::Paragraph, text: "Available in matte black.".into() }];
        let result = extract_schema(&blocks, &SchemaSelector::Custom(map));
        assert!(result.get("color").is_some());
    }

    #[test]
    fn empty_document_yields_empty_object() {
        let blocks: Vec<Block> = Vec::new();
        let result = extract_schema(&blocks, &SchemaSelector::Named(SchemaTemplate::Article));
        assert_eq!(result, serde_json::json!({}));
    }
}
