//! Plain-text projections of a stored document.
//!
//! Both walks run over raw JSON so they also cope with node types this crate
//! never produces. `encryptedBlock` nodes contribute nothing to either.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::html_utils::{html_to_searchable_text, strip_tags};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub characters: usize,
    pub lines: usize,
}

fn node_type(node: &Value) -> &str {
    node.get("type").and_then(Value::as_str).unwrap_or("")
}

fn children(node: &Value) -> impl Iterator<Item = &Value> {
    node.get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter(|child| node_type(child) != "encryptedBlock")
}

/// Flatten stored note content into a single search string.
///
/// Content that is not JSON at all is treated as legacy HTML and
/// tag-stripped. Never fails.
pub fn extract_text_from_json(content: Option<&str>) -> String {
    let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
        return String::new();
    };

    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => collapse(&flatten(&value)),
        Ok(_) => String::new(),
        Err(_) => strip_tags(content),
    }
}

fn flatten(node: &Value) -> String {
    match node_type(node) {
        "encryptedBlock" => String::new(),
        "text" => node
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => children(node).map(flatten).collect::<Vec<_>>().join(" "),
    }
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Character and line counts that follow block semantics.
///
/// `lines` is one more than the number of newlines in a structured
/// rendering where table rows are single tab-separated lines, code blocks
/// keep their newlines and every other container puts each child on its own
/// line. Blank or missing content counts as zero lines.
pub fn count_document_stats(content: Option<&str>) -> DocumentStats {
    let Some(content) = content.filter(|c| !c.trim().is_empty()) else {
        return DocumentStats::default();
    };

    match serde_json::from_str::<Value>(content) {
        Ok(value @ Value::Object(_)) => {
            let characters = count_characters(&value);
            let rendered = render(&value);
            stats_for(characters, &rendered)
        }
        Ok(_) => DocumentStats::default(),
        Err(_) => {
            // Legacy raw HTML stored before documents were trees
            let text = html_to_searchable_text(content);
            stats_for(text.chars().filter(|c| *c != '\n').count(), &text)
        }
    }
}

fn stats_for(characters: usize, rendered: &str) -> DocumentStats {
    let lines = if rendered.is_empty() {
        0
    } else {
        1 + rendered.matches('\n').count()
    };
    DocumentStats { characters, lines }
}

fn count_characters(node: &Value) -> usize {
    match node_type(node) {
        "encryptedBlock" => 0,
        "text" => node
            .get("text")
            .and_then(Value::as_str)
            .map_or(0, |t| t.chars().count()),
        _ => children(node).map(count_characters).sum(),
    }
}

fn render(node: &Value) -> String {
    match node_type(node) {
        "text" => node
            .get("text")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        "hardBreak" => "\n".to_string(),
        "encryptedBlock" => String::new(),
        "paragraph" | "heading" | "codeBlock" => children(node).map(render).collect(),
        "tableRow" => children(node)
            .map(|cell| render(cell).replace('\n', " "))
            .collect::<Vec<_>>()
            .join("\t"),
        _ => children(node).map(render).collect::<Vec<_>>().join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn text(t: &str) -> Value {
        json!({"type": "text", "text": t})
    }

    fn paragraph(t: &str) -> Value {
        json!({"type": "paragraph", "content": [text(t)]})
    }

    fn table(rows: usize, cols: usize) -> Value {
        let rows: Vec<Value> = (0..rows)
            .map(|r| {
                let cells: Vec<Value> = (0..cols)
                    .map(|c| json!({"type": "tableCell", "content": [paragraph(&format!("r{}c{}", r, c))]}))
                    .collect();
                json!({"type": "tableRow", "content": cells})
            })
            .collect();
        json!({"type": "table", "content": rows})
    }

    fn doc(content: Vec<Value>) -> String {
        json!({"type": "doc", "content": content}).to_string()
    }

    #[test]
    fn test_extract_text_joins_and_collapses() {
        let content = doc(vec![
            paragraph("  Hello   world "),
            json!({"type": "bulletList", "content": [
                {"type": "listItem", "content": [paragraph("item")]}
            ]}),
        ]);
        assert_eq!(extract_text_from_json(Some(&content)), "Hello world item");
    }

    #[test]
    fn test_extract_text_excludes_encrypted_blocks() {
        let content = doc(vec![
            paragraph("Public content"),
            json!({"type": "encryptedBlock", "attrs": {"ciphertext": "c2VjcmV0"}}),
            paragraph("More public content"),
        ]);
        assert_eq!(
            extract_text_from_json(Some(&content)),
            "Public content More public content"
        );
    }

    #[test]
    fn test_extract_text_never_fails() {
        assert_eq!(extract_text_from_json(None), "");
        assert_eq!(extract_text_from_json(Some("")), "");
        assert_eq!(extract_text_from_json(Some("42")), "");
        assert_eq!(extract_text_from_json(Some("true")), "");
        assert_eq!(extract_text_from_json(Some("null")), "");
        assert_eq!(
            extract_text_from_json(Some("<p>Legacy <b>html</b></p>")),
            "Legacy html"
        );
        assert_eq!(extract_text_from_json(Some("{not json")), "{not json");
    }

    #[test]
    fn test_stats_table_rows_are_lines() {
        let content = doc(vec![table(3, 2)]);
        let stats = count_document_stats(Some(&content));
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.characters, 6 * 4);
    }

    #[test]
    fn test_stats_mixed_blocks() {
        let content = doc(vec![
            json!({"type": "heading", "attrs": {"level": 1}, "content": [text("Title")]}),
            paragraph("Intro"),
            table(2, 2),
            paragraph("Outro"),
        ]);
        assert_eq!(count_document_stats(Some(&content)).lines, 5);
    }

    #[test]
    fn test_stats_code_block_keeps_newlines() {
        let source = "fn main() {\n    run();\n}";
        let content = doc(vec![json!({"type": "codeBlock", "content": [text(source)]})]);
        let stats = count_document_stats(Some(&content));
        assert_eq!(stats.lines, 3);
        assert_eq!(stats.characters, source.chars().count());
    }

    #[test]
    fn test_stats_hard_break() {
        let content = doc(vec![json!({"type": "paragraph", "content": [
            text("first"),
            {"type": "hardBreak"},
            text("second")
        ]})]);
        let stats = count_document_stats(Some(&content));
        assert_eq!(stats.lines, 2);
        assert_eq!(stats.characters, 11);
    }

    #[test]
    fn test_stats_cell_newlines_flattened() {
        let content = doc(vec![json!({"type": "table", "content": [
            {"type": "tableRow", "content": [
                {"type": "tableCell", "content": [paragraph("a"), paragraph("b")]},
                {"type": "tableCell", "content": [paragraph("c")]}
            ]}
        ]})]);
        assert_eq!(count_document_stats(Some(&content)).lines, 1);
    }

    #[test]
    fn test_stats_exclude_encrypted_blocks() {
        let content = doc(vec![
            paragraph("abc"),
            json!({"type": "encryptedBlock", "attrs": {"ciphertext": "c2VjcmV0"}}),
        ]);
        assert_eq!(
            count_document_stats(Some(&content)),
            DocumentStats { characters: 3, lines: 1 }
        );
    }

    #[test]
    fn test_stats_empty() {
        assert_eq!(count_document_stats(None), DocumentStats::default());
        assert_eq!(count_document_stats(Some("")), DocumentStats::default());
        assert_eq!(
            count_document_stats(Some(r#"{"type":"doc","content":[{"type":"paragraph"}]}"#)),
            DocumentStats { characters: 0, lines: 0 }
        );
    }

    #[test]
    fn test_stats_legacy_html() {
        let stats = count_document_stats(Some("<p>one</p><p>two</p>"));
        assert_eq!(stats, DocumentStats { characters: 6, lines: 2 });
    }
}
