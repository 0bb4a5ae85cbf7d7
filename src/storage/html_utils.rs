//! Plain-text helpers for HTML that never made it into a document tree.

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());
static COMMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<!--.*?-->").unwrap());
static BLOCK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)</?(div|p|br|h[1-6]|li|tr|blockquote|pre|table|ul|ol|section|article|header|footer)(\s[^>]*)?/?>",
    )
    .unwrap()
});
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]*>").unwrap());
static SPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t\u{a0}]+").unwrap());
static NEWLINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\n\s*").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TITLE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());

/// Remove every tag, decode entities and collapse all whitespace to single
/// spaces.
pub fn strip_tags(html: &str) -> String {
    let text = COMMENT_RE.replace_all(html, "");
    let text = TAG_RE.replace_all(&text, " ");
    let text = html_escape::decode_html_entities(&text);
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Extract readable plain text from HTML, keeping block boundaries as
/// single newlines.
///
/// Strips `<script>`, `<style>`, comments and all remaining tags, decodes
/// entities and normalizes whitespace.
pub fn html_to_searchable_text(html: &str) -> String {
    let text = SCRIPT_RE.replace_all(html, "");
    let text = STYLE_RE.replace_all(&text, "");
    let text = COMMENT_RE.replace_all(&text, "");
    let text = BLOCK_RE.replace_all(&text, "\n");
    let text = TAG_RE.replace_all(&text, "");
    let text = html_escape::decode_html_entities(&text);
    let text = SPACE_RE.replace_all(&text, " ");
    let text = NEWLINE_RE.replace_all(&text, "\n");
    text.trim().to_string()
}

/// Extract the `<title>` content from an HTML document.
pub fn extract_html_title(html: &str) -> Option<String> {
    let caps = TITLE_RE.captures(html)?;
    let title = strip_tags(&caps[1]);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}
