//! Legacy HTML → strict HTML the tree converter can rely on.
//!
//! Phases run in a fixed order and each one assumes the output shape of the
//! ones before it:
//!
//! 1. strip document boilerplate
//! 2. resolve resource references
//! 3. convert inline widgets (checkboxes, encrypted text)
//! 4. strip presentation attributes and wrapper tags
//! 5. turn `<div>` into `<p>` outside tables and into `<br/>` inside cells
//! 6. canonicalize table structure
//! 7. make every table cell start with a block
//! 8. collapse whitespace between tags

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::error::Result;
use super::record::{ParsedNoteRecord, SourceFlavor};
use super::resources::{PendingResource, ResourceResolver};
use super::settings::ImportSettings;
use crate::document::dom::parse_attrs;
use crate::document::{
    convert_or_fallback, count_document_stats, extract_text_from_json, DocNode, DocumentStats,
    HtmlToTree,
};

// Phase 1
static XML_DECL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<\?xml.*?\?>").unwrap());
static DOCTYPE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<!DOCTYPE[^>]*>").unwrap());
static HEAD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<head\b.*?</head\s*>").unwrap());
static HTML_BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?(?:html|body)\b[^>]*>").unwrap());
static META_LINK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<(?:meta|link)\b[^>]*>").unwrap());
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static EN_NOTE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?en-note\b[^>]*>").unwrap());
static STYLE_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style\b.*?</style\s*>").unwrap());
static SCRIPT_BLOCK_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").unwrap());
static XML_ISLAND_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<xml\b.*?</xml\s*>").unwrap());
static DOWNLEVEL_IF_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<!\[(?:end)?if[^\]]*\]>").unwrap());

// Phase 3
static EN_TODO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<en-todo\b([^>]*?)/?>(?:\s*</en-todo\s*>)?").unwrap());
static EN_CRYPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<en-crypt\b([^>]*)>(.*?)</en-crypt\s*>").unwrap());
static INPUT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<input\b([^>]*?)/?>").unwrap());

// Phase 4
static OPEN_TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[A-Za-z][^>]*>").unwrap());
static PRESENTATION_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\s(?:style|class|rev)\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).unwrap()
});
static WRAPPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:span|font|center|small|big)\b[^>]*>").unwrap());
static ENEX_WRAPPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:abbr|acronym|bdo|cite|dfn|q|var)\b[^>]*>").unwrap());
static ONENOTE_WRAPPER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:o:p|nobr|wbr)\b[^>]*>").unwrap());

// Phase 5
static DIV_CONTEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(/?)(div|table|tr|td|th|ul|ol|li|blockquote|p|h[1-6]|pre|hr)\b[^>]*>").unwrap()
});
static EMPTY_P_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<p>\s*</p>").unwrap());

// Phase 6
static TABLE_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)</?(?:thead|tbody|tfoot)\b[^>]*>").unwrap());
static TABLE_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<table\b[^>]*>").unwrap());
static TABLE_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</table\s*>").unwrap());
static TR_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<tr\b[^>]*>").unwrap());
static TH_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<th\b([^>]*)>").unwrap());
static TH_CLOSE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</th\s*>").unwrap());
static COLGROUP_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<colgroup\b[^>]*>.*?</colgroup\s*>").unwrap());
static COL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)</?col(?:group)?\b[^>]*>").unwrap());

// Phase 7
static CELL_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<(/?)(td|tr|table|p|h[1-6]|ul|ol|blockquote|pre)\b[^>]*>").unwrap()
});
static BR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<br\s*/?>").unwrap());

// Phase 8
static INTER_TAG_WS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r">\s+<").unwrap());

/// Run every phase over one note's HTML.
///
/// Resource references are rewritten through `resolver`, which keeps the
/// writes the caller still owes.
pub fn normalize_html(
    html: &str,
    flavor: SourceFlavor,
    resolver: &mut ResourceResolver<'_>,
) -> Result<String> {
    let html = strip_boilerplate(html, flavor);
    let html = resolve_resources(&html, flavor, resolver)?;
    let html = convert_widgets(&html, flavor);
    let html = strip_presentation(&html, flavor);
    let html = convert_divs(&html);
    let html = canonicalize_tables(&html);
    let html = wrap_cell_blocks(&html);
    Ok(collapse_whitespace(&html).trim().to_string())
}

fn strip_boilerplate(html: &str, flavor: SourceFlavor) -> String {
    let mut html = XML_DECL_RE.replace_all(html, "").into_owned();
    for re in [&DOCTYPE_RE, &HEAD_RE, &HTML_BODY_RE, &META_LINK_RE, &COMMENT_RE] {
        html = re.replace_all(&html, "").into_owned();
    }

    let extra: Vec<&Regex> = match flavor {
        SourceFlavor::Enex => vec![&*EN_NOTE_RE],
        SourceFlavor::OneNote => vec![
            &*STYLE_BLOCK_RE,
            &*SCRIPT_BLOCK_RE,
            &*XML_ISLAND_RE,
            &*DOWNLEVEL_IF_RE,
        ],
    };
    for re in extra {
        html = re.replace_all(&html, "").into_owned();
    }
    html
}

fn resolve_resources(
    html: &str,
    flavor: SourceFlavor,
    resolver: &mut ResourceResolver<'_>,
) -> Result<String> {
    match flavor {
        SourceFlavor::Enex => Ok(resolver.resolve_hash_media(html)),
        SourceFlavor::OneNote => {
            let html = resolver.resolve_data_uris(html)?;
            Ok(resolver.resolve_locations(&html))
        }
    }
}

fn checkbox(checked: bool) -> &'static str {
    if checked {
        r#"<input type="checkbox" disabled checked>"#
    } else {
        r#"<input type="checkbox" disabled>"#
    }
}

fn attr_value<'a>(attrs: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

fn convert_widgets(html: &str, flavor: SourceFlavor) -> String {
    match flavor {
        SourceFlavor::Enex => {
            let html = EN_TODO_RE.replace_all(html, |caps: &Captures| {
                let attrs = parse_attrs(&caps[1]);
                let checked = attr_value(&attrs, "checked")
                    .is_some_and(|v| v.trim().eq_ignore_ascii_case("true"));
                checkbox(checked).to_string()
            });
            EN_CRYPT_RE
                .replace_all(&html, |caps: &Captures| encrypted_block(&caps[1], &caps[2]))
                .into_owned()
        }
        SourceFlavor::OneNote => INPUT_RE
            .replace_all(html, |caps: &Captures| {
                let attrs = parse_attrs(&caps[1]);
                let is_checkbox = attr_value(&attrs, "type")
                    .is_some_and(|t| t.trim().eq_ignore_ascii_case("checkbox"));
                if is_checkbox {
                    checkbox(attr_value(&attrs, "checked").is_some()).to_string()
                } else {
                    String::new()
                }
            })
            .into_owned(),
    }
}

fn encrypted_block(attr_source: &str, body: &str) -> String {
    let attrs = parse_attrs(attr_source);
    let ciphertext: String = html_escape::decode_html_entities(body)
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();

    let mut out = String::from("<encrypted-block");
    for (name, key) in [("cipher", "data-cipher"), ("length", "data-length"), ("hint", "data-hint")] {
        if let Some(value) = attr_value(&attrs, name) {
            out.push_str(&format!(
                r#" {}="{}""#,
                key,
                html_escape::encode_double_quoted_attribute(value)
            ));
        }
    }
    out.push_str(&format!(
        r#" data-ciphertext="{}"></encrypted-block>"#,
        html_escape::encode_double_quoted_attribute(&ciphertext)
    ));
    out
}

fn strip_presentation(html: &str, flavor: SourceFlavor) -> String {
    let html = OPEN_TAG_RE.replace_all(html, |caps: &Captures| {
        PRESENTATION_ATTR_RE.replace_all(&caps[0], "").into_owned()
    });
    let html = WRAPPER_RE.replace_all(&html, "");
    let extra = match flavor {
        SourceFlavor::Enex => &ENEX_WRAPPER_RE,
        SourceFlavor::OneNote => &ONENOTE_WRAPPER_RE,
    };
    extra.replace_all(&html, "").into_owned()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Context {
    Flow,
    Table,
    Cell,
}

/// Tracks where a `<div>` sits while scanning tags in order
struct DivScanner {
    // Open contexts with the number of div-paragraphs open in each
    stack: Vec<(Context, usize)>,
    // Cells on the stack
    cells: usize,
}

impl DivScanner {
    fn new() -> Self {
        Self {
            stack: vec![(Context::Flow, 0)],
            cells: 0,
        }
    }

    fn in_cell(&self) -> bool {
        self.cells > 0
    }

    fn push(&mut self, ctx: Context) {
        if ctx == Context::Cell {
            self.cells += 1;
        }
        self.stack.push((ctx, 0));
    }

    fn pop(&mut self) -> Option<Context> {
        let (ctx, _) = self.stack.pop()?;
        if ctx == Context::Cell {
            self.cells -= 1;
        }
        Some(ctx)
    }

    fn top(&mut self) -> &mut (Context, usize) {
        if self.stack.is_empty() {
            self.stack.push((Context::Flow, 0));
        }
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn open_divs(&mut self) -> usize {
        if self.in_cell() {
            return 0;
        }
        match *self.top() {
            (Context::Flow, open) => open,
            _ => 0,
        }
    }

    fn pop_to(&mut self, ctx: Context) {
        while self.stack.len() > 1 {
            if let Some(popped) = self.pop() {
                if popped == ctx {
                    break;
                }
            }
        }
    }

    fn pop_cell(&mut self) {
        if self.top().0 == Context::Cell {
            self.pop();
        }
    }

    fn pop_flow(&mut self) {
        if self.stack.len() > 1 && self.top().0 == Context::Flow {
            self.pop();
        }
    }

    /// Replacement for one matched tag
    fn rewrite(&mut self, tag: &str, closing: bool, name: &str) -> String {
        match (name, closing) {
            ("div", false) => {
                if self.in_cell() || self.top().0 == Context::Table {
                    return String::new();
                }
                let top = self.top();
                top.1 += 1;
                if top.1 > 1 { "</p><p>" } else { "<p>" }.to_string()
            }
            ("div", true) => {
                if self.in_cell() {
                    return "<br/>".to_string();
                }
                let top = self.top();
                if top.0 == Context::Table || top.1 == 0 {
                    return String::new();
                }
                top.1 -= 1;
                if top.1 > 0 { "</p><p>" } else { "</p>" }.to_string()
            }
            ("table", false) => {
                let prefix = self.break_paragraph();
                self.push(Context::Table);
                format!("{}{}", prefix, tag)
            }
            ("table", true) => {
                self.pop_to(Context::Table);
                format!("{}{}", tag, self.resume_paragraph())
            }
            ("td" | "th", false) => {
                self.pop_cell();
                self.push(Context::Cell);
                tag.to_string()
            }
            ("td" | "th" | "tr", _) => {
                self.pop_cell();
                tag.to_string()
            }
            ("ul" | "ol" | "blockquote" | "li", false) => {
                let prefix = self.break_paragraph();
                self.push(Context::Flow);
                format!("{}{}", prefix, tag)
            }
            ("ul" | "ol" | "blockquote" | "li", true) => {
                self.pop_flow();
                format!("{}{}", tag, self.resume_paragraph())
            }
            ("hr", _) => format!("{}{}{}", self.break_paragraph(), tag, self.resume_paragraph()),
            (_, false) => format!("{}{}", self.break_paragraph(), tag),
            (_, true) => format!("{}{}", tag, self.resume_paragraph()),
        }
    }

    /// Close the div-paragraph a block is about to interrupt
    fn break_paragraph(&mut self) -> &'static str {
        if self.open_divs() > 0 { "</p>" } else { "" }
    }

    /// Reopen the div-paragraph after the interrupting block
    fn resume_paragraph(&mut self) -> &'static str {
        if self.open_divs() > 0 { "<p>" } else { "" }
    }
}

/// `<div>` becomes `<p>` outside tables. Inside a cell its start vanishes
/// and its end becomes `<br/>` so the cell splits cleanly in phase 7.
fn convert_divs(html: &str) -> String {
    let mut scanner = DivScanner::new();
    let converted = DIV_CONTEXT_RE.replace_all(html, |caps: &Captures| {
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        scanner.rewrite(&caps[0], closing, &name)
    });
    EMPTY_P_RE.replace_all(&converted, "").into_owned()
}

fn canonicalize_tables(html: &str) -> String {
    let html = COLGROUP_BLOCK_RE.replace_all(html, "");
    let html = COL_RE.replace_all(&html, "");
    let html = TABLE_SECTION_RE.replace_all(&html, "");
    let html = TABLE_OPEN_RE.replace_all(&html, "<table><tbody>");
    let html = TABLE_CLOSE_RE.replace_all(&html, "</tbody></table>");
    let html = TR_OPEN_RE.replace_all(&html, "<tr>");
    let html = TH_OPEN_RE.replace_all(&html, "<td$1>");
    TH_CLOSE_RE.replace_all(&html, "</td>").into_owned()
}

/// An open `<table>` or `<td>` while wrapping cells
enum CellFrame {
    Table,
    Cell {
        /// Blocks open at the cell's own level
        depth: usize,
        /// Top-level inline content waiting for the next block or the cell end
        inline: String,
        wrote: bool,
    },
}

/// Keeps top-level blocks of every cell as they are and wraps each
/// `<br>`-separated inline run between them in its own paragraph, in one
/// pass over the cell and block tags.
struct CellWrapper {
    out: String,
    stack: Vec<CellFrame>,
}

impl CellWrapper {
    fn new(capacity: usize) -> Self {
        Self {
            out: String::with_capacity(capacity),
            stack: Vec::new(),
        }
    }

    /// Text or markup that leaves the structure alone
    fn write(&mut self, text: &str) {
        match self.stack.last_mut() {
            Some(CellFrame::Cell { depth: 0, inline, .. }) => inline.push_str(text),
            _ => self.out.push_str(text),
        }
    }

    fn tag(&mut self, tag: &str, name: &str, closing: bool) {
        match (name, closing) {
            ("td", false) => {
                self.close_cell();
                self.write(tag);
                self.stack.push(CellFrame::Cell {
                    depth: 0,
                    inline: String::new(),
                    wrote: false,
                });
            }
            ("td", true) => {
                if !self.close_cell() {
                    self.write(tag);
                }
            }
            ("tr", _) => {
                self.close_cell();
                self.write(tag);
            }
            ("table", false) => {
                self.open_block();
                self.write(tag);
                self.stack.push(CellFrame::Table);
            }
            ("table", true) => {
                self.close_cell();
                if matches!(self.stack.last(), Some(CellFrame::Table)) {
                    self.stack.pop();
                }
                self.close_block(tag);
            }
            (_, false) => {
                self.open_block();
                self.write(tag);
            }
            (_, true) => self.close_block(tag),
        }
    }

    fn open_block(&mut self) {
        if let Some(CellFrame::Cell { depth, inline, wrote }) = self.stack.last_mut() {
            if *depth == 0 {
                self.out.push_str(&wrap_inline(inline.as_str()));
                inline.clear();
                *wrote = true;
            }
            *depth += 1;
        }
    }

    fn close_block(&mut self, tag: &str) {
        if let Some(CellFrame::Cell { depth, .. }) = self.stack.last_mut() {
            if *depth > 0 {
                *depth -= 1;
                self.out.push_str(tag);
                return;
            }
        }
        // Stray close tags stay part of the inline run
        self.write(tag);
    }

    /// Finish the innermost cell if it is the top frame
    fn close_cell(&mut self) -> bool {
        if !matches!(self.stack.last(), Some(CellFrame::Cell { .. })) {
            return false;
        }
        if let Some(CellFrame::Cell { depth, inline, mut wrote }) = self.stack.pop() {
            if depth == 0 {
                let wrapped = wrap_inline(&inline);
                wrote |= !wrapped.is_empty();
                self.out.push_str(&wrapped);
            }
            if !wrote {
                self.out.push_str("<p></p>");
            }
            self.write("</td>");
        }
        true
    }

    fn finish(mut self) -> String {
        while !self.stack.is_empty() {
            if !self.close_cell() {
                self.stack.pop();
            }
        }
        self.out
    }
}

/// Wrap the content of every `<td>`, nested tables included. A cell may
/// end implicitly at the next cell, row or table end.
fn wrap_cell_blocks(html: &str) -> String {
    let mut wrapper = CellWrapper::new(html.len());
    let mut pos = 0;

    for caps in CELL_TOKEN_RE.captures_iter(html) {
        let Some(tag) = caps.get(0) else { continue };
        wrapper.write(&html[pos..tag.start()]);
        pos = tag.end();
        let closing = !caps[1].is_empty();
        let name = caps[2].to_ascii_lowercase();
        wrapper.tag(tag.as_str(), &name, closing);
    }

    wrapper.write(&html[pos..]);
    wrapper.finish()
}

fn wrap_inline(fragment: &str) -> String {
    BR_RE
        .split(fragment)
        .filter(|part| !part.trim().is_empty())
        .map(|part| format!("<p>{}</p>", part.trim()))
        .collect()
}

fn collapse_whitespace(html: &str) -> String {
    INTER_TAG_WS_RE.replace_all(html, "><").into_owned()
}

/// A note ready to persist
#[derive(Debug)]
pub struct PreparedNote<'a> {
    pub document: DocNode,
    /// Serialized `document`
    pub content: String,
    pub search_text: String,
    pub stats: DocumentStats,
    pub resources: Vec<PendingResource<'a>>,
}

/// Normalize, resolve and convert one record.
///
/// Fails only when a resource cannot be decoded; a conversion failure
/// degrades to a plain-text document instead.
pub fn prepare_note<'a>(
    record: &'a ParsedNoteRecord,
    settings: &'a ImportSettings,
    converter: &dyn HtmlToTree,
) -> Result<PreparedNote<'a>> {
    let mut resolver = ResourceResolver::new(&record.resources, &settings.attachment_url_prefix)
        .with_base_dir(record.base_dir.as_deref());
    let html = normalize_html(&record.html, record.flavor, &mut resolver)?;

    let document = convert_or_fallback(converter, &html);
    let content = document.to_json()?;
    let search_text = extract_text_from_json(Some(&content));
    let stats = count_document_stats(Some(&content));

    Ok(PreparedNote {
        document,
        content,
        search_text,
        stats,
        resources: resolver.finish(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::document::{ConversionError, DomConverter};
    use crate::import::resources::{ResourceEntry, ResourceMap};

    static CELL_OPEN_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<td\b[^>]*>").unwrap());
    static BLOCK_TAG_RE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r"(?i)<(/?)(?:p|h[1-6]|ul|ol|blockquote|pre|table)\b[^>]*>").unwrap()
    });

    fn normalize(html: &str, flavor: SourceFlavor) -> String {
        let map = ResourceMap::new();
        let mut resolver = ResourceResolver::new(&map, "/attachments/");
        normalize_html(html, flavor, &mut resolver).unwrap()
    }

    /// Every `<td>` must open with a block tag
    fn assert_cells_start_with_blocks(html: &str) {
        for cell in CELL_OPEN_RE.find_iter(html) {
            let rest = &html[cell.end()..];
            let starts_with_block = BLOCK_TAG_RE
                .find(rest)
                .is_some_and(|m| m.start() == 0 && !m.as_str().starts_with("</"));
            assert!(
                starts_with_block,
                "cell does not start with a block: {}",
                &rest[..rest.len().min(40)]
            );
        }
    }

    #[test]
    fn test_enex_note() {
        let html = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE en-note SYSTEM "http://xml.evernote.com/pub/enml2.dtd">
<en-note style="word-wrap: break-word;">
  <div><span style="font-weight: bold;">Shopping</span></div>
  <div><en-todo checked="true"/>Milk</div>
  <div><en-todo/>Eggs</div>
</en-note>"#;
        assert_eq!(
            normalize(html, SourceFlavor::Enex),
            concat!(
                "<p>Shopping</p>",
                r#"<p><input type="checkbox" disabled checked>Milk</p>"#,
                r#"<p><input type="checkbox" disabled>Eggs</p>"#,
            )
        );
    }

    #[test]
    fn test_encrypted_text() {
        let html = r#"<en-note><en-crypt hint="dogs name" cipher="AES" length="128">RU5DMI1m
ZWQ=</en-crypt></en-note>"#;
        assert_eq!(
            normalize(html, SourceFlavor::Enex),
            r#"<encrypted-block data-cipher="AES" data-length="128" data-hint="dogs name" data-ciphertext="RU5DMI1mZWQ="></encrypted-block>"#
        );
    }

    #[test]
    fn test_onenote_boilerplate() {
        let html = r#"<html xmlns:o="urn:schemas-microsoft-com:office:office"><head><title>T</title><style>p {margin:0}</style></head>
<body lang=EN-US style='tab-interval:.5in'><!--[if gte mso 9]><xml><o:DocumentProperties/></xml><![endif]-->
<p class=MsoNormal><![if !supportLists]>1.<![endif]>Item<o:p></o:p></p>
<script>alert(1)</script></body></html>"#;
        assert_eq!(normalize(html, SourceFlavor::OneNote), "<p>1.Item</p>");
    }

    #[test]
    fn test_onenote_inputs() {
        let html = r#"<p><input type=checkbox checked>Done <input type="text" value="x"></p>"#;
        assert_eq!(
            normalize(html, SourceFlavor::OneNote),
            r#"<p><input type="checkbox" disabled checked>Done </p>"#
        );
    }

    #[test]
    fn test_semantic_tags_survive() {
        let html = r#"<h1 class="t">T</h1><p><b>b</b><em>e</em><a href="https://x.org" rev="x">l</a><code>c</code></p><pre>x</pre><blockquote>q</blockquote><hr><img src="/attachments/k.png">"#;
        assert_eq!(
            normalize(html, SourceFlavor::Enex),
            r#"<h1>T</h1><p><b>b</b><em>e</em><a href="https://x.org">l</a><code>c</code></p><pre>x</pre><blockquote>q</blockquote><hr><img src="/attachments/k.png">"#
        );
    }

    #[test]
    fn test_nested_divs_become_flat_paragraphs() {
        assert_eq!(
            convert_divs("<div><div>a</div><div>b</div></div>"),
            "<p>a</p><p>b</p>"
        );
        assert_eq!(
            convert_divs("<div>Intro<ul><li><div>x</div></li></ul></div>"),
            "<p>Intro</p><ul><li><p>x</p></li></ul>"
        );
        assert_eq!(convert_divs("<div>a<hr>b</div>"), "<p>a</p><hr><p>b</p>");
    }

    #[test]
    fn test_divs_in_cells_become_breaks() {
        let html = "<div>before</div><table><tr><td><div>a</div><div>b</div></td></tr></table><div>after</div>";
        let out = normalize(html, SourceFlavor::Enex);
        assert_eq!(
            out,
            "<p>before</p><table><tbody><tr><td><p>a</p><p>b</p></td></tr></tbody></table><p>after</p>"
        );
        assert!(!out.contains("<div"));
    }

    #[test]
    fn test_table_canonicalization() {
        let html = r#"<table border="1" style="x"><colgroup><col width="10"></colgroup><thead><tr class="h"><th colspan="2">Head</th></tr></thead><tbody><tr><td></td><td>x<br>y</td></tr></tbody></table>"#;
        let out = normalize(html, SourceFlavor::OneNote);
        assert_eq!(
            out,
            r#"<table><tbody><tr><td colspan="2"><p>Head</p></td></tr><tr><td><p></p></td><td><p>x</p><p>y</p></td></tr></tbody></table>"#
        );
        assert_cells_start_with_blocks(&out);
    }

    #[test]
    fn test_cells_with_blocks_are_left_alone() {
        let out = normalize("<table><tr><td> <ul><li>x</li></ul></td></tr></table>", SourceFlavor::Enex);
        assert_eq!(out, "<table><tbody><tr><td><ul><li>x</li></ul></td></tr></tbody></table>");
    }

    #[test]
    fn test_cell_invariant_on_messy_tables() {
        let cases = [
            "<table><tr><td>a<td>b<tr><td><br/></td></table>",
            "<table><tr><td><table><tr><td>inner</td></tr></table>outer</td></tr></table>",
            "<div><table><tr><td><div><div>x</div></div><br></td></tr></table></div>",
            "<table><tr><th><span>h</span></th></tr><tr><td>  </td></tr></table>",
            "<table><tr><td><br><br>text</td></tr></table>",
        ];
        for case in cases {
            for flavor in [SourceFlavor::Enex, SourceFlavor::OneNote] {
                let out = normalize(case, flavor);
                assert_cells_start_with_blocks(&out);
                assert!(!out.contains("<div"), "div left in {}", out);
            }
        }
    }

    #[test]
    fn test_deeply_nested_tables_normalize_in_linear_time() {
        let html = format!("{}x", "<table><tr><td>".repeat(2000));
        let started = std::time::Instant::now();
        let out = normalize(&html, SourceFlavor::OneNote);
        let elapsed = started.elapsed();

        assert!(elapsed < std::time::Duration::from_secs(5), "took {:?}", elapsed);
        assert_cells_start_with_blocks(&out);
        assert!(out.contains("<td><p>x</p></td>"));
        assert_eq!(out.matches("<td>").count(), 2000);
        assert_eq!(out.matches("</td>").count(), 2000);
        assert!(out.ends_with("</td></td>"));
    }

    #[test]
    fn test_unclosed_cells_and_stray_closers() {
        let out = normalize("<table><tr><td>a</p>b<td><p>c", SourceFlavor::Enex);
        assert_eq!(out, "<table><tbody><tr><td><p>a</p>b</p></td><td><p>c</td>");
    }

    #[test]
    fn test_whitespace_between_tags_collapses() {
        assert_eq!(
            normalize("<p>a</p>\n   <p>b  c</p>", SourceFlavor::Enex),
            "<p>a</p><p>b  c</p>"
        );
    }

    #[test]
    fn test_en_media_resolution_in_pipeline() {
        let mut map = ResourceMap::new();
        map.insert("abc", ResourceEntry::new("image/png", b"png".to_vec(), None));
        let mut resolver = ResourceResolver::new(&map, "/attachments/");
        let out = normalize_html(
            r#"<en-note><div><en-media hash="abc" type="image/png" style="width:10px"/></div><div><en-media hash="gone"/></div></en-note>"#,
            SourceFlavor::Enex,
            &mut resolver,
        )
        .unwrap();
        let pending = resolver.finish();

        assert_eq!(pending.len(), 1);
        assert_eq!(
            out,
            format!(r#"<p><img src="/attachments/{}" alt="attachment"/></p>"#, pending[0].storage_key)
        );
    }

    fn record(html: &str, flavor: SourceFlavor) -> ParsedNoteRecord {
        ParsedNoteRecord {
            flavor,
            ..ParsedNoteRecord::onenote("Note", html.to_string(), Arc::new(ResourceMap::new()))
        }
    }

    #[test]
    fn test_prepare_note() {
        let settings = ImportSettings::default();
        let record = record(
            "<en-note><div>Hello <b>world</b></div><table><tr><td>a</td><td>b</td></tr></table></en-note>",
            SourceFlavor::Enex,
        );
        let prepared = prepare_note(&record, &settings, &DomConverter::default()).unwrap();

        assert_eq!(prepared.search_text, "Hello world a b");
        assert_eq!(prepared.stats.lines, 2);
        assert!(prepared.resources.is_empty());
        assert_eq!(prepared.document.content[1].kind.as_str(), "table");
    }

    #[test]
    fn test_prepare_empty_note() {
        let settings = ImportSettings::default();
        let record = record("<en-note>  <div> </div> </en-note>", SourceFlavor::Enex);
        let prepared = prepare_note(&record, &settings, &DomConverter::default()).unwrap();

        assert_eq!(prepared.document, DocNode::empty_doc());
        assert_eq!(prepared.stats, DocumentStats::default());
    }

    struct Exploding;

    impl HtmlToTree for Exploding {
        fn convert(&self, _html: &str) -> std::result::Result<DocNode, ConversionError> {
            Err(ConversionError::Failed("no DOM available".to_string()))
        }
    }

    #[test]
    fn test_prepare_note_survives_conversion_failure() {
        let settings = ImportSettings::default();
        let record = record("<p>Still <i>here</i></p>", SourceFlavor::OneNote);
        let prepared = prepare_note(&record, &settings, &Exploding).unwrap();
        assert_eq!(prepared.search_text, "Still here");
        assert_eq!(prepared.stats.lines, 1);
    }

    #[test]
    fn test_prepare_note_fails_on_corrupt_data_uri() {
        let settings = ImportSettings::default();
        let record = record(r#"<img src="data:image/png;base64,%%%">"#, SourceFlavor::OneNote);
        assert!(prepare_note(&record, &settings, &DomConverter::default()).is_err());
    }
}
