//! Minimal HTML tokenizer and tree builder.
//!
//! Good enough for the normalized HTML the import pipeline produces and for
//! reasonably sloppy legacy markup: void elements, implicit closing of
//! `p`/`li`/`td`/`tr`, and stray end tags are handled. Anything fancier
//! (foster parenting, adoption agency) is deliberately absent.

use once_cell::sync::Lazy;
use regex::Regex;

use super::converter::ConversionError;

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)<!--.*?-->|<![^>]*>|<\?[^>]*>|<(/?)([a-zA-Z][a-zA-Z0-9:_-]*)([^>]*)>").unwrap()
});
static ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"([^\s="'/>]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'>]+)))?"#).unwrap()
});

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// Elements whose content is kept verbatim (no tag parsing inside)
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

#[derive(Debug, Clone, PartialEq)]
pub enum DomNode {
    Element(Element),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<DomNode>,
}

impl Element {
    fn new(name: &str, attrs: Vec<(String, String)>) -> Self {
        Self {
            name: name.to_string(),
            attrs,
            children: Vec::new(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(key, _)| key == name)
    }

    /// Concatenated descendant text, with `<br>` rendered as `\n`
    pub fn raw_text(&self) -> String {
        let mut out = String::new();
        collect_raw_text(&self.children, &mut out);
        out
    }
}

fn collect_raw_text(nodes: &[DomNode], out: &mut String) {
    for node in nodes {
        match node {
            DomNode::Text(text) => out.push_str(text),
            DomNode::Element(el) if el.name == "br" => out.push('\n'),
            DomNode::Element(el) => collect_raw_text(&el.children, out),
        }
    }
}

/// Parse attribute source text (`href="x" checked`) into decoded pairs.
/// Names are lowercased; valueless attributes get an empty value.
pub fn parse_attrs(source: &str) -> Vec<(String, String)> {
    ATTR_RE
        .captures_iter(source)
        .map(|caps| {
            let name = caps[1].to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| html_escape::decode_html_entities(m.as_str()).into_owned())
                .unwrap_or_default();
            (name, value)
        })
        .collect()
}

/// Parse an HTML fragment into a synthetic root element.
///
/// Fails only when nesting exceeds `max_depth`.
pub fn parse_fragment(html: &str, max_depth: usize) -> Result<Element, ConversionError> {
    let mut builder = TreeBuilder::new(max_depth);
    let mut cursor = 0;

    while cursor < html.len() {
        let Some(caps) = TOKEN_RE.captures_at(html, cursor) else {
            builder.text(&html[cursor..]);
            break;
        };
        let whole = caps.get(0).map_or(cursor..cursor, |m| m.range());

        if whole.start > cursor {
            builder.text(&html[cursor..whole.start]);
        }
        cursor = whole.end;

        // Comments, doctypes and processing instructions
        let Some(name) = caps.get(2) else {
            continue;
        };
        let name = name.as_str().to_ascii_lowercase();
        let closing = caps.get(1).is_some_and(|m| !m.as_str().is_empty());
        let attr_source = caps.get(3).map_or("", |m| m.as_str());

        if closing {
            builder.close(&name);
            continue;
        }

        let self_closing = attr_source.trim_end().ends_with('/');
        let attrs = parse_attrs(attr_source.trim_end().trim_end_matches('/'));
        builder.open(&name, attrs, self_closing)?;

        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) && !self_closing {
            let end_tag = format!("</{}", name);
            let rest = &html[cursor..];
            let end = rest.to_ascii_lowercase().find(&end_tag).unwrap_or(rest.len());
            builder.raw(&rest[..end]);
            builder.close(&name);
            cursor += end;
            // Skip the end tag itself
            if let Some(gt) = html[cursor..].find('>') {
                cursor += gt + 1;
            } else {
                cursor = html.len();
            }
        }
    }

    Ok(builder.finish())
}

struct TreeBuilder {
    stack: Vec<Element>,
    max_depth: usize,
}

impl TreeBuilder {
    fn new(max_depth: usize) -> Self {
        Self {
            stack: vec![Element::new("#root", Vec::new())],
            max_depth,
        }
    }

    fn current(&mut self) -> &mut Element {
        let last = self.stack.len() - 1;
        &mut self.stack[last]
    }

    fn text(&mut self, raw: &str) {
        if raw.is_empty() {
            return;
        }
        let decoded = html_escape::decode_html_entities(raw).into_owned();
        self.push_text(decoded);
    }

    fn raw(&mut self, raw: &str) {
        if !raw.is_empty() {
            self.push_text(raw.to_string());
        }
    }

    fn push_text(&mut self, text: String) {
        let current = self.current();
        if let Some(DomNode::Text(prev)) = current.children.last_mut() {
            prev.push_str(&text);
        } else {
            current.children.push(DomNode::Text(text));
        }
    }

    fn open(
        &mut self,
        name: &str,
        attrs: Vec<(String, String)>,
        self_closing: bool,
    ) -> Result<(), ConversionError> {
        self.close_implied_by(name);

        let element = Element::new(name, attrs);
        if self_closing || VOID_ELEMENTS.contains(&name) {
            self.current().children.push(DomNode::Element(element));
            return Ok(());
        }

        if self.stack.len() > self.max_depth {
            return Err(ConversionError::TooDeep(self.max_depth));
        }
        self.stack.push(element);
        Ok(())
    }

    /// Close elements that the opening of `name` ends implicitly
    fn close_implied_by(&mut self, name: &str) {
        let (closes, boundary): (&[&str], &[&str]) = match name {
            "p" => (&["p"], &["td", "th", "li", "blockquote", "table"]),
            "li" => (&["li"], &["ul", "ol"]),
            "td" | "th" => (&["td", "th"], &["tr", "table"]),
            "tr" => (&["tr", "td", "th"], &["table", "tbody", "thead", "tfoot"]),
            "tbody" | "thead" | "tfoot" => (&["tbody", "thead", "tfoot", "tr", "td", "th"], &["table"]),
            _ => return,
        };

        let mut target = None;
        for (index, el) in self.stack.iter().enumerate().skip(1).rev() {
            if boundary.contains(&el.name.as_str()) {
                break;
            }
            if closes.contains(&el.name.as_str()) {
                target = Some(index);
            }
        }

        if let Some(index) = target {
            self.pop_to(index);
        }
    }

    fn close(&mut self, name: &str) {
        let found = self
            .stack
            .iter()
            .enumerate()
            .skip(1)
            .rev()
            .find(|(_, el)| el.name == name)
            .map(|(index, _)| index);

        match found {
            Some(index) => self.pop_to(index),
            // A stray </p> still produces an empty paragraph in browsers
            None if name == "p" => self.current().children.push(DomNode::Element(Element::new("p", Vec::new()))),
            None => {}
        }
    }

    /// Pop the stack down to and including `index`
    fn pop_to(&mut self, index: usize) {
        while self.stack.len() > index {
            if let Some(el) = self.stack.pop() {
                self.current().children.push(DomNode::Element(el));
            }
        }
    }

    fn finish(mut self) -> Element {
        self.pop_to(1);
        self.stack.pop().unwrap_or_default()
    }
}
