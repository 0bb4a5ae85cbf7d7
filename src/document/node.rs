//! Canonical rich-document tree.
//!
//! Serializes to the editor's JSON shape:
//! `{"type": "doc", "content": [{"type": "paragraph", "content": [...]}]}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeKind {
    Doc,
    Paragraph,
    Heading,
    BulletList,
    OrderedList,
    ListItem,
    TaskList,
    TaskItem,
    Table,
    TableRow,
    TableCell,
    TableHeader,
    Blockquote,
    CodeBlock,
    Image,
    Text,
    HardBreak,
    EncryptedBlock,
    HorizontalRule,
    Other(String),
}

impl NodeKind {
    pub fn as_str(&self) -> &str {
        match self {
            NodeKind::Doc => "doc",
            NodeKind::Paragraph => "paragraph",
            NodeKind::Heading => "heading",
            NodeKind::BulletList => "bulletList",
            NodeKind::OrderedList => "orderedList",
            NodeKind::ListItem => "listItem",
            NodeKind::TaskList => "taskList",
            NodeKind::TaskItem => "taskItem",
            NodeKind::Table => "table",
            NodeKind::TableRow => "tableRow",
            NodeKind::TableCell => "tableCell",
            NodeKind::TableHeader => "tableHeader",
            NodeKind::Blockquote => "blockquote",
            NodeKind::CodeBlock => "codeBlock",
            NodeKind::Image => "image",
            NodeKind::Text => "text",
            NodeKind::HardBreak => "hardBreak",
            NodeKind::EncryptedBlock => "encryptedBlock",
            NodeKind::HorizontalRule => "horizontalRule",
            NodeKind::Other(name) => name,
        }
    }
}

impl From<String> for NodeKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "doc" => NodeKind::Doc,
            "paragraph" => NodeKind::Paragraph,
            "heading" => NodeKind::Heading,
            "bulletList" => NodeKind::BulletList,
            "orderedList" => NodeKind::OrderedList,
            "listItem" => NodeKind::ListItem,
            "taskList" => NodeKind::TaskList,
            "taskItem" => NodeKind::TaskItem,
            "table" => NodeKind::Table,
            "tableRow" => NodeKind::TableRow,
            "tableCell" => NodeKind::TableCell,
            "tableHeader" => NodeKind::TableHeader,
            "blockquote" => NodeKind::Blockquote,
            "codeBlock" => NodeKind::CodeBlock,
            "image" => NodeKind::Image,
            "text" => NodeKind::Text,
            "hardBreak" => NodeKind::HardBreak,
            "encryptedBlock" => NodeKind::EncryptedBlock,
            "horizontalRule" => NodeKind::HorizontalRule,
            _ => NodeKind::Other(name),
        }
    }
}

impl From<NodeKind> for String {
    fn from(kind: NodeKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MarkKind {
    Bold,
    Italic,
    Strike,
    Underline,
    Code,
    Link,
    Subscript,
    Superscript,
    Highlight,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mark {
    #[serde(rename = "type")]
    pub kind: MarkKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
}

impl Mark {
    pub fn new(kind: MarkKind) -> Self {
        Self { kind, attrs: None }
    }

    pub fn link(href: &str) -> Self {
        let mut attrs = Map::new();
        attrs.insert("href".to_string(), Value::String(href.to_string()));
        Self {
            kind: MarkKind::Link,
            attrs: Some(attrs),
        }
    }
}

/// One node of the canonical tree.
///
/// `encryptedBlock` nodes only ever carry `attrs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocNode {
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attrs: Option<Map<String, Value>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub content: Vec<DocNode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub marks: Vec<Mark>,
}

impl DocNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            kind,
            attrs: None,
            content: Vec::new(),
            text: None,
            marks: Vec::new(),
        }
    }

    pub fn with_content(mut self, content: Vec<DocNode>) -> Self {
        self.content = content;
        self
    }

    pub fn with_attr(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.attrs
            .get_or_insert_with(Map::new)
            .insert(key.to_string(), value.into());
        self
    }

    pub fn text(text: impl Into<String>, marks: Vec<Mark>) -> Self {
        Self {
            text: Some(text.into()),
            marks,
            ..Self::new(NodeKind::Text)
        }
    }

    pub fn paragraph(content: Vec<DocNode>) -> Self {
        Self::new(NodeKind::Paragraph).with_content(content)
    }

    pub fn doc(content: Vec<DocNode>) -> Self {
        Self::new(NodeKind::Doc).with_content(content)
    }

    /// A document holding a single empty paragraph
    pub fn empty_doc() -> Self {
        Self::doc(vec![Self::paragraph(Vec::new())])
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.as_ref().and_then(|attrs| attrs.get(key))
    }

    pub fn is_text(&self) -> bool {
        self.kind == NodeKind::Text
    }

    /// Block-level node kinds, as allowed directly under `doc` or a table cell
    pub fn is_block(&self) -> bool {
        matches!(
            self.kind,
            NodeKind::Paragraph
                | NodeKind::Heading
                | NodeKind::BulletList
                | NodeKind::OrderedList
                | NodeKind::TaskList
                | NodeKind::Table
                | NodeKind::Blockquote
                | NodeKind::CodeBlock
                | NodeKind::Image
                | NodeKind::EncryptedBlock
                | NodeKind::HorizontalRule
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serializes_editor_shape() {
        let doc = DocNode::doc(vec![DocNode::paragraph(vec![DocNode::text(
            "Hi",
            vec![Mark::new(MarkKind::Bold)],
        )])]);

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "doc",
                "content": [{
                    "type": "paragraph",
                    "content": [{"type": "text", "text": "Hi", "marks": [{"type": "bold"}]}]
                }]
            })
        );
    }

    #[test]
    fn test_unknown_kind_survives_round_trip() {
        let json = r#"{"type":"mention","attrs":{"id":"x"}}"#;
        let node: DocNode = serde_json::from_str(json).unwrap();
        assert_eq!(node.kind, NodeKind::Other("mention".to_string()));
        assert_eq!(node.to_json().unwrap(), json);
    }

    #[test]
    fn test_empty_doc() {
        let doc = DocNode::empty_doc();
        assert_eq!(doc.to_json().unwrap(), r#"{"type":"doc","content":[{"type":"paragraph"}]}"#);
    }
}
