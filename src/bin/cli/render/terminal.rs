use nous_import::document::{DocNode, MarkKind, NodeKind};

/// ANSI color codes
#[allow(dead_code)]
pub struct Color;

#[allow(dead_code)]
impl Color {
    pub const RESET: &str = "\x1b[0m";
    pub const BOLD: &str = "\x1b[1m";
    pub const DIM: &str = "\x1b[2m";
    pub const ITALIC: &str = "\x1b[3m";
    pub const UNDERLINE: &str = "\x1b[4m";
    pub const STRIKETHROUGH: &str = "\x1b[9m";
    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
}

/// Render a document tree to terminal text
pub fn render_document(doc: &DocNode, use_color: bool) -> String {
    let mut lines = Vec::new();

    for block in &doc.content {
        let block_lines = render_block(block, use_color, "");
        if !block_lines.is_empty() {
            lines.extend(block_lines);
            lines.push(String::new()); // blank line between blocks
        }
    }

    while lines.last().is_some_and(|l| l.is_empty()) {
        lines.pop();
    }

    lines.join("\n")
}

fn render_block(node: &DocNode, use_color: bool, prefix: &str) -> Vec<String> {
    match &node.kind {
        NodeKind::Paragraph => render_inline(&node.content, use_color)
            .lines()
            .map(|line| format!("{}{}", prefix, line))
            .collect(),
        NodeKind::Heading => {
            let level = node.attr("level").and_then(|v| v.as_u64()).unwrap_or(1);
            let text = format!("{} {}", "#".repeat(level as usize), plain_text(node));
            if use_color {
                vec![format!("{}{}{}{}", prefix, Color::BOLD, text, Color::RESET)]
            } else {
                vec![format!("{}{}", prefix, text)]
            }
        }
        NodeKind::BulletList | NodeKind::OrderedList | NodeKind::TaskList => {
            render_list(node, use_color, prefix)
        }
        NodeKind::Blockquote => node
            .content
            .iter()
            .flat_map(|child| render_block(child, use_color, &format!("{}\u{2502} ", prefix)))
            .collect(),
        NodeKind::CodeBlock => plain_text(node)
            .lines()
            .map(|line| format!("{}    {}", prefix, line))
            .collect(),
        NodeKind::Table => render_table(node, prefix),
        NodeKind::Image => {
            let src = node.attr("src").and_then(|v| v.as_str()).unwrap_or("");
            vec![format!("{}[image: {}]", prefix, src)]
        }
        NodeKind::EncryptedBlock => {
            let hint = node
                .attr("hint")
                .and_then(|v| v.as_str())
                .filter(|h| !h.is_empty())
                .map(|h| format!(" (hint: {})", h))
                .unwrap_or_default();
            vec![format!("{}[encrypted]{}", prefix, hint)]
        }
        NodeKind::HorizontalRule => vec![format!("{}{}", prefix, "\u{2500}".repeat(20))],
        _ => {
            let text = plain_text(node);
            if text.is_empty() {
                Vec::new()
            } else {
                vec![format!("{}{}", prefix, text)]
            }
        }
    }
}

fn render_list(list: &DocNode, use_color: bool, prefix: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let start = list.attr("start").and_then(|v| v.as_u64()).unwrap_or(1);

    for (i, item) in list.content.iter().enumerate() {
        let marker = match list.kind {
            NodeKind::OrderedList => format!("{}. ", start + i as u64),
            NodeKind::TaskList => {
                let checked = item.attr("checked").and_then(|v| v.as_bool()).unwrap_or(false);
                if checked { "[x] ".to_string() } else { "[ ] ".to_string() }
            }
            _ => "\u{2022} ".to_string(),
        };
        let continuation = format!("{}{}", prefix, " ".repeat(marker.chars().count()));

        let mut first = true;
        for child in &item.content {
            for line in render_block(child, use_color, &continuation) {
                if first {
                    lines.push(format!("{}{}{}", prefix, marker, line.trim_start()));
                    first = false;
                } else {
                    lines.push(line);
                }
            }
        }
        if first {
            lines.push(format!("{}{}", prefix, marker.trim_end()));
        }
    }

    lines
}

fn render_table(table: &DocNode, prefix: &str) -> Vec<String> {
    let rows: Vec<Vec<String>> = table
        .content
        .iter()
        .map(|row| row.content.iter().map(plain_text).collect())
        .collect();

    let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
    let mut widths = vec![0; columns];
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    rows.iter()
        .map(|row| {
            let cells: Vec<String> = widths
                .iter()
                .enumerate()
                .map(|(i, width)| {
                    let cell = row.get(i).map(String::as_str).unwrap_or("");
                    format!("{:<width$}", cell, width = width)
                })
                .collect();
            format!("{}| {} |", prefix, cells.join(" | "))
        })
        .collect()
}

fn render_inline(nodes: &[DocNode], use_color: bool) -> String {
    let mut out = String::new();

    for node in nodes {
        match node.kind {
            NodeKind::HardBreak => out.push('\n'),
            NodeKind::Image => {
                let src = node.attr("src").and_then(|v| v.as_str()).unwrap_or("");
                out.push_str(&format!("[image: {}]", src));
            }
            NodeKind::Text => {
                let text = node.text.as_deref().unwrap_or("");
                if !use_color || node.marks.is_empty() {
                    out.push_str(text);
                    if let Some(href) = link_href(node).filter(|_| !use_color) {
                        out.push_str(&format!(" <{}>", href));
                    }
                    continue;
                }
                for mark in &node.marks {
                    out.push_str(match mark.kind {
                        MarkKind::Bold => Color::BOLD,
                        MarkKind::Italic => Color::ITALIC,
                        MarkKind::Underline | MarkKind::Link => Color::UNDERLINE,
                        MarkKind::Strike => Color::STRIKETHROUGH,
                        MarkKind::Code => Color::CYAN,
                        MarkKind::Highlight => Color::YELLOW,
                        MarkKind::Subscript | MarkKind::Superscript => "",
                    });
                }
                out.push_str(text);
                out.push_str(Color::RESET);
            }
            _ => out.push_str(&plain_text(node)),
        }
    }

    out
}

fn link_href(node: &DocNode) -> Option<&str> {
    node.marks
        .iter()
        .find(|m| m.kind == MarkKind::Link)
        .and_then(|m| m.attrs.as_ref())
        .and_then(|attrs| attrs.get("href"))
        .and_then(|v| v.as_str())
}

fn plain_text(node: &DocNode) -> String {
    if let Some(text) = &node.text {
        return text.clone();
    }
    let parts: Vec<String> = node
        .content
        .iter()
        .map(plain_text)
        .filter(|t| !t.is_empty())
        .collect();
    let separator = if node.is_block() && node.content.iter().any(DocNode::is_block) {
        " "
    } else {
        ""
    };
    parts.join(separator)
}
