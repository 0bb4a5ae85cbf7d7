//! Normalized HTML → canonical document tree.

use thiserror::Error;

use super::dom::{self, DomNode, Element};
use super::node::{DocNode, Mark, MarkKind, NodeKind};
use crate::storage::html_utils::strip_tags;

#[derive(Error, Debug)]
pub enum ConversionError {
    #[error("Markup nested deeper than {0} levels")]
    TooDeep(usize),

    #[error("Conversion failed: {0}")]
    Failed(String),
}

/// An HTML → tree capability bound to the editor's node vocabulary.
pub trait HtmlToTree {
    fn convert(&self, html: &str) -> Result<DocNode, ConversionError>;
}

/// Default converter built on [`dom::parse_fragment`].
#[derive(Debug, Clone)]
pub struct DomConverter {
    max_depth: usize,
}

impl DomConverter {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }
}

impl Default for DomConverter {
    fn default() -> Self {
        Self::new(512)
    }
}

impl HtmlToTree for DomConverter {
    fn convert(&self, html: &str) -> Result<DocNode, ConversionError> {
        let root = dom::parse_fragment(html, self.max_depth)?;
        let blocks = blocks_of(&root.children);
        Ok(DocNode::doc(non_empty_blocks(blocks)))
    }
}

/// Convert with `converter`, never failing.
///
/// Blank input yields a single empty paragraph; a conversion error yields a
/// single paragraph holding the tag-stripped text of `html`.
pub fn convert_or_fallback(converter: &dyn HtmlToTree, html: &str) -> DocNode {
    if html.trim().is_empty() {
        return DocNode::empty_doc();
    }

    match converter.convert(html) {
        Ok(doc) => doc,
        Err(e) => {
            log::warn!("Falling back to plain text document: {}", e);
            fallback_document(html)
        }
    }
}

/// Single-paragraph document with the tag-stripped text of `html`
pub fn fallback_document(html: &str) -> DocNode {
    let text = strip_tags(html);
    if text.is_empty() {
        DocNode::empty_doc()
    } else {
        DocNode::doc(vec![DocNode::paragraph(vec![DocNode::text(text, Vec::new())])])
    }
}

fn non_empty_blocks(blocks: Vec<DocNode>) -> Vec<DocNode> {
    if blocks.is_empty() {
        vec![DocNode::paragraph(Vec::new())]
    } else {
        blocks
    }
}

fn blocks_of(children: &[DomNode]) -> Vec<DocNode> {
    let mut sink = BlockSink::default();
    sink.walk_all(children, &[]);
    sink.finish()
}

/// Inline content waiting to be wrapped in a text block
enum Inline {
    Node(DocNode),
    Checkbox(bool),
}

/// Collects blocks from a mixed block/inline child list.
///
/// Inline content accumulates until a block element shows up, at which point
/// it is flushed as a paragraph (or heading). Blocks found inside inline
/// elements are hoisted out the same way.
#[derive(Default)]
struct BlockSink {
    blocks: Vec<DocNode>,
    inline: Vec<Inline>,
    heading: Option<u64>,
}

impl BlockSink {
    fn finish(mut self) -> Vec<DocNode> {
        self.flush(false);
        self.blocks
    }

    fn walk_all(&mut self, children: &[DomNode], marks: &[Mark]) {
        for child in children {
            self.walk(child, marks);
        }
    }

    fn walk(&mut self, node: &DomNode, marks: &[Mark]) {
        match node {
            DomNode::Text(text) => self.push_text(text, marks),
            DomNode::Element(el) => self.element(el, marks),
        }
    }

    fn element(&mut self, el: &Element, marks: &[Mark]) {
        match el.name.as_str() {
            "p" => self.textblock(el, marks, self.heading),
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = u64::from(el.name.as_bytes()[1] - b'0');
                self.textblock(el, marks, Some(level));
            }
            "ul" | "ol" => {
                let list = list_node(el);
                if let Some(list) = list {
                    self.push_block(list);
                }
            }
            "table" => {
                if let Some(table) = table_node(el) {
                    self.push_block(table);
                }
            }
            "blockquote" => {
                let content = non_empty_blocks(blocks_of(&el.children));
                self.push_block(DocNode::new(NodeKind::Blockquote).with_content(content));
            }
            "pre" => self.push_block(code_block(el)),
            "hr" => self.push_block(DocNode::new(NodeKind::HorizontalRule)),
            "img" => {
                if let Some(image) = image_node(el) {
                    self.push_block(image);
                }
            }
            "encrypted-block" => self.push_block(encrypted_block(el)),
            "br" => self.inline.push(Inline::Node(DocNode::new(NodeKind::HardBreak))),
            "input" => {
                if el.attr("type").is_some_and(|t| t.eq_ignore_ascii_case("checkbox")) {
                    self.inline.push(Inline::Checkbox(el.has_attr("checked")));
                }
            }
            "script" | "style" | "head" | "title" | "template" | "iframe" | "object" | "embed" => {}
            // Block containers without their own node kind
            "div" | "section" | "article" | "header" | "footer" | "main" | "aside" | "nav"
            | "figure" | "figcaption" | "address" | "center" | "dl" | "dt" | "dd" | "li" | "tr"
            | "td" | "th" | "tbody" | "thead" | "tfoot" | "form" | "fieldset" | "details"
            | "summary" => {
                self.flush(false);
                self.walk_all(&el.children, marks);
                self.flush(false);
            }
            name => match inline_mark(name, el) {
                Some(mark) => {
                    let mut marks = marks.to_vec();
                    if !marks.iter().any(|m| m.kind == mark.kind) {
                        marks.push(mark);
                    }
                    self.walk_all(&el.children, &marks);
                }
                None => self.walk_all(&el.children, marks),
            },
        }
    }

    /// Walk a paragraph-like element; blocks inside it split it in two
    fn textblock(&mut self, el: &Element, marks: &[Mark], heading: Option<u64>) {
        self.flush(false);
        let previous = std::mem::replace(&mut self.heading, heading);
        let before = self.blocks.len();

        self.walk_all(&el.children, marks);
        // An explicitly empty <p></p> still becomes a paragraph
        let force = self.blocks.len() == before;
        self.flush(force);

        self.heading = previous;
    }

    fn push_text(&mut self, text: &str, marks: &[Mark]) {
        let collapsed = collapse_whitespace(text);
        if collapsed.is_empty() {
            return;
        }

        if let Some(Inline::Node(prev)) = self.inline.last_mut() {
            if prev.is_text() && prev.marks == marks {
                if let Some(prev_text) = prev.text.as_mut() {
                    prev_text.push_str(&collapsed);
                    return;
                }
            }
        }
        self.inline
            .push(Inline::Node(DocNode::text(collapsed, marks.to_vec())));
    }

    fn push_block(&mut self, block: DocNode) {
        self.flush(false);

        if block.kind == NodeKind::TaskList {
            if let Some(last) = self.blocks.last_mut() {
                if last.kind == NodeKind::TaskList {
                    last.content.extend(block.content);
                    return;
                }
            }
        }
        self.blocks.push(block);
    }

    /// Emit pending inline content as a text block.
    ///
    /// Whitespace-only runs are dropped unless `force` is set.
    fn flush(&mut self, force: bool) {
        let mut pending = std::mem::take(&mut self.inline);
        while matches!(pending.first(), Some(Inline::Node(node)) if is_blank_text(node)) {
            pending.remove(0);
        }
        let checkbox = match pending.first() {
            Some(Inline::Checkbox(checked)) => Some(*checked),
            _ => None,
        };

        let skip = usize::from(checkbox.is_some());
        let mut content: Vec<DocNode> = pending
            .into_iter()
            .skip(skip)
            .map(|item| match item {
                Inline::Node(node) => node,
                Inline::Checkbox(checked) => {
                    DocNode::text(if checked { "[x] " } else { "[ ] " }, Vec::new())
                }
            })
            .collect();
        trim_inline(&mut content);

        if content.is_empty() && !force && checkbox.is_none() {
            return;
        }

        let block = match self.heading {
            Some(level) => DocNode::new(NodeKind::Heading)
                .with_attr("level", level)
                .with_content(content),
            None => DocNode::paragraph(content),
        };

        match checkbox {
            Some(checked) => {
                let item = DocNode::new(NodeKind::TaskItem)
                    .with_attr("checked", checked)
                    .with_content(vec![block]);
                self.push_block(DocNode::new(NodeKind::TaskList).with_content(vec![item]));
            }
            None => self.blocks.push(block),
        }
    }
}

fn is_blank_text(node: &DocNode) -> bool {
    node.is_text() && node.text.as_deref().map_or(true, |t| t.trim().is_empty())
}

/// Trim leading/trailing whitespace of a text block
fn trim_inline(content: &mut Vec<DocNode>) {
    // A trailing <br> only keeps an otherwise empty block open
    while content
        .last()
        .is_some_and(|node| node.kind == NodeKind::HardBreak || is_blank_text(node))
    {
        content.pop();
    }

    if let Some(first) = content.first_mut() {
        if let Some(text) = first.text.as_mut() {
            *text = text.trim_start().to_string();
        }
    }
    if let Some(last) = content.last_mut() {
        if let Some(text) = last.text.as_mut() {
            *text = text.trim_end().to_string();
        }
    }
    // Whitespace next to a hard break is not significant either
    for i in 0..content.len() {
        let before_break = content
            .get(i + 1)
            .is_some_and(|next| next.kind == NodeKind::HardBreak);
        let after_break = i > 0 && content[i - 1].kind == NodeKind::HardBreak;
        if let Some(text) = content[i].text.as_mut() {
            if before_break {
                *text = text.trim_end().to_string();
            }
            if after_break {
                *text = text.trim_start().to_string();
            }
        }
    }
    content.retain(|node| !node.is_text() || node.text.as_deref().is_some_and(|t| !t.is_empty()));
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for c in text.chars() {
        if c.is_whitespace() && c != '\u{a0}' {
            if !in_space {
                out.push(' ');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}

fn inline_mark(name: &str, el: &Element) -> Option<Mark> {
    let kind = match name {
        "strong" | "b" => MarkKind::Bold,
        "em" | "i" => MarkKind::Italic,
        "s" | "strike" | "del" => MarkKind::Strike,
        "u" | "ins" => MarkKind::Underline,
        "code" | "tt" | "kbd" | "samp" => MarkKind::Code,
        "sub" => MarkKind::Subscript,
        "sup" => MarkKind::Superscript,
        "mark" => MarkKind::Highlight,
        "a" => {
            let href = el.attr("href").filter(|h| !h.trim().is_empty())?;
            return Some(Mark::link(href.trim()));
        }
        _ => return None,
    };
    Some(Mark::new(kind))
}

fn list_node(el: &Element) -> Option<DocNode> {
    let kind = if el.name == "ol" {
        NodeKind::OrderedList
    } else {
        NodeKind::BulletList
    };

    let mut items: Vec<DocNode> = Vec::new();
    let mut stray: Vec<DomNode> = Vec::new();

    let flush_stray = |items: &mut Vec<DocNode>, stray: &mut Vec<DomNode>| {
        if stray.is_empty() {
            return;
        }
        let blocks = blocks_of(stray);
        stray.clear();
        if !blocks.is_empty() {
            items.push(DocNode::new(NodeKind::ListItem).with_content(blocks));
        }
    };

    for child in &el.children {
        match child {
            DomNode::Element(li) if li.name == "li" => {
                flush_stray(&mut items, &mut stray);
                let content = non_empty_blocks(blocks_of(&li.children));
                items.push(DocNode::new(NodeKind::ListItem).with_content(content));
            }
            // Legacy exporters nest lists directly inside lists
            DomNode::Element(nested) if nested.name == "ul" || nested.name == "ol" => {
                flush_stray(&mut items, &mut stray);
                if let Some(list) = list_node(nested) {
                    match items.last_mut() {
                        Some(item) => item.content.push(list),
                        None => items.push(DocNode::new(NodeKind::ListItem).with_content(vec![
                            DocNode::paragraph(Vec::new()),
                            list,
                        ])),
                    }
                }
            }
            other => stray.push(other.clone()),
        }
    }
    flush_stray(&mut items, &mut stray);

    if items.is_empty() {
        return None;
    }

    let mut list = DocNode::new(kind).with_content(items);
    if el.name == "ol" {
        let start = el
            .attr("start")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .unwrap_or(1);
        list = list.with_attr("start", start);
    }
    Some(list)
}

fn table_node(el: &Element) -> Option<DocNode> {
    let mut rows = Vec::new();
    collect_rows(&el.children, &mut rows);

    if rows.is_empty() {
        None
    } else {
        Some(DocNode::new(NodeKind::Table).with_content(rows))
    }
}

fn collect_rows(children: &[DomNode], rows: &mut Vec<DocNode>) {
    for child in children {
        let DomNode::Element(el) = child else {
            continue;
        };
        match el.name.as_str() {
            "tr" => {
                let cells: Vec<DocNode> = el
                    .children
                    .iter()
                    .filter_map(|c| match c {
                        DomNode::Element(cell) if cell.name == "td" || cell.name == "th" => {
                            Some(cell_node(cell))
                        }
                        _ => None,
                    })
                    .collect();
                if !cells.is_empty() {
                    rows.push(DocNode::new(NodeKind::TableRow).with_content(cells));
                }
            }
            "tbody" | "thead" | "tfoot" => collect_rows(&el.children, rows),
            _ => {}
        }
    }
}

fn cell_node(cell: &Element) -> DocNode {
    let kind = if cell.name == "th" {
        NodeKind::TableHeader
    } else {
        NodeKind::TableCell
    };

    let span = |name: &str| {
        cell.attr(name)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(1)
    };

    // Cell content must be blocks; stray inline runs were already wrapped
    let content = non_empty_blocks(blocks_of(&cell.children));

    DocNode::new(kind)
        .with_attr("colspan", span("colspan"))
        .with_attr("rowspan", span("rowspan"))
        .with_content(content)
}

fn code_block(el: &Element) -> DocNode {
    let raw = el.raw_text();
    // Browsers drop a single newline right after <pre>
    let text = raw.strip_prefix('\n').unwrap_or(&raw);
    let text = text.strip_suffix('\n').unwrap_or(text);

    let mut node = DocNode::new(NodeKind::CodeBlock).with_attr("language", serde_json::Value::Null);
    if !text.is_empty() {
        node.content = vec![DocNode::text(text, Vec::new())];
    }
    node
}

fn image_node(el: &Element) -> Option<DocNode> {
    let src = el.attr("src").filter(|s| !s.trim().is_empty())?;
    let mut image = DocNode::new(NodeKind::Image).with_attr("src", src.trim());
    if let Some(alt) = el.attr("alt") {
        image = image.with_attr("alt", alt);
    }
    if let Some(title) = el.attr("title") {
        image = image.with_attr("title", title);
    }
    Some(image)
}

fn encrypted_block(el: &Element) -> DocNode {
    let mut node = DocNode::new(NodeKind::EncryptedBlock);
    for (attr, key) in [
        ("data-ciphertext", "ciphertext"),
        ("data-cipher", "cipher"),
        ("data-length", "length"),
        ("data-hint", "hint"),
    ] {
        if let Some(value) = el.attr(attr) {
            node = node.with_attr(key, value);
        }
    }
    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn convert(html: &str) -> serde_json::Value {
        let doc = DomConverter::default().convert(html).unwrap();
        serde_json::to_value(doc).unwrap()
    }

    #[test]
    fn test_paragraphs_and_marks() {
        let value = convert("<p>Hello <strong>bold</strong> and <em>it</em></p><h2>Title</h2>");
        assert_eq!(
            value,
            json!({
                "type": "doc",
                "content": [
                    {"type": "paragraph", "content": [
                        {"type": "text", "text": "Hello "},
                        {"type": "text", "text": "bold", "marks": [{"type": "bold"}]},
                        {"type": "text", "text": " and "},
                        {"type": "text", "text": "it", "marks": [{"type": "italic"}]}
                    ]},
                    {"type": "heading", "attrs": {"level": 2}, "content": [
                        {"type": "text", "text": "Title"}
                    ]}
                ]
            })
        );
    }

    #[test]
    fn test_bare_text_is_wrapped() {
        let value = convert("loose text<p>para</p>tail");
        let content = value["content"].as_array().unwrap();
        assert_eq!(content.len(), 3);
        assert!(content.iter().all(|n| n["type"] == "paragraph"));
    }

    #[test]
    fn test_links_and_hard_breaks() {
        let value = convert(r#"<p><a href="https://x.test">x</a><br/>next</p>"#);
        let para = &value["content"][0]["content"];
        assert_eq!(para[0]["marks"][0], json!({"type": "link", "attrs": {"href": "https://x.test"}}));
        assert_eq!(para[1]["type"], "hardBreak");
        assert_eq!(para[2]["text"], "next");
    }

    #[test]
    fn test_table_cells_hold_blocks() {
        let value = convert("<table><tbody><tr><td><p>a</p></td><td></td></tr></tbody></table>");
        let row = &value["content"][0]["content"][0];
        assert_eq!(row["type"], "tableRow");
        assert_eq!(row["content"][0]["type"], "tableCell");
        assert_eq!(row["content"][0]["content"][0]["type"], "paragraph");
        assert_eq!(row["content"][1]["content"][0]["type"], "paragraph");
        assert_eq!(row["content"][0]["attrs"], json!({"colspan": 1, "rowspan": 1}));
    }

    #[test]
    fn test_lists_with_nested_list() {
        let value = convert("<ul><li>one</li><ul><li>inner</li></ul><li>two</li></ul><ol start=\"3\"><li>x</li></ol>");
        let bullet = &value["content"][0];
        assert_eq!(bullet["type"], "bulletList");
        assert_eq!(bullet["content"].as_array().unwrap().len(), 2);
        assert_eq!(bullet["content"][0]["content"][1]["type"], "bulletList");

        let ordered = &value["content"][1];
        assert_eq!(ordered["type"], "orderedList");
        assert_eq!(ordered["attrs"]["start"], 3);
    }

    #[test]
    fn test_block_inside_paragraph_is_hoisted() {
        let value = convert(r#"<p>before<img src="/a.png">after</p>"#);
        let types: Vec<&str> = value["content"]
            .as_array()
            .unwrap()
            .iter()
            .map(|n| n["type"].as_str().unwrap())
            .collect();
        assert_eq!(types, vec!["paragraph", "image", "paragraph"]);
    }

    #[test]
    fn test_code_block_keeps_newlines() {
        let value = convert("<pre>line1\nline2</pre>");
        assert_eq!(value["content"][0]["type"], "codeBlock");
        assert_eq!(value["content"][0]["content"][0]["text"], "line1\nline2");
    }

    #[test]
    fn test_checkbox_paragraphs_become_task_list() {
        let value = convert(
            r#"<p><input type="checkbox" disabled checked>Done</p><p><input type="checkbox" disabled>Todo</p>"#,
        );
        let list = &value["content"][0];
        assert_eq!(list["type"], "taskList");
        assert_eq!(list["content"].as_array().unwrap().len(), 2);
        assert_eq!(list["content"][0]["attrs"]["checked"], true);
        assert_eq!(list["content"][1]["attrs"]["checked"], false);
        assert_eq!(list["content"][1]["content"][0]["content"][0]["text"], "Todo");
    }

    #[test]
    fn test_encrypted_block_has_attrs_only() {
        let value = convert(r#"<encrypted-block data-cipher="AES" data-ciphertext="Zm9v"></encrypted-block>"#);
        let block = &value["content"][0];
        assert_eq!(block["type"], "encryptedBlock");
        assert_eq!(block["attrs"]["ciphertext"], "Zm9v");
        assert!(block.get("content").is_none());
    }

    #[test]
    fn test_empty_input_gives_empty_paragraph() {
        assert_eq!(convert(""), json!({"type": "doc", "content": [{"type": "paragraph"}]}));
    }

    struct Failing;

    impl HtmlToTree for Failing {
        fn convert(&self, _html: &str) -> Result<DocNode, ConversionError> {
            Err(ConversionError::Failed("no DOM".to_string()))
        }
    }

    #[test]
    fn test_convert_or_fallback_recovers() {
        let doc = convert_or_fallback(&Failing, "<p>Hello <b>there</b></p>");
        assert_eq!(
            serde_json::to_value(doc).unwrap(),
            json!({"type": "doc", "content": [{"type": "paragraph", "content": [
                {"type": "text", "text": "Hello there"}
            ]}]})
        );

        let deep = "<div>".repeat(40);
        let doc = convert_or_fallback(&DomConverter::new(8), &format!("{}text", deep));
        assert_eq!(doc.content[0].content[0].text.as_deref(), Some("text"));
    }

    #[test]
    fn test_convert_or_fallback_blank() {
        assert_eq!(convert_or_fallback(&Failing, "   "), DocNode::empty_doc());
    }
}
