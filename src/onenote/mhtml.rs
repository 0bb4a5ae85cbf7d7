//! MIME / MHT reader
//!
//! Pulls the HTML payload and embedded images out of a single-file web
//! archive. Never fails: a message with no usable HTML part yields an
//! empty payload.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::import::decode::{decode_base64, decode_quoted_printable_bytes};
use crate::import::resources::basename;
use crate::import::{ResourceEntry, ResourceMap};

static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\r?\n[ \t]*\r?\n").unwrap());
static HEADER_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*:").unwrap());
static PARAM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#";\s*([A-Za-z0-9_*.-]+)\s*=\s*(?:"([^"]*)"|([^;\s]+))"#).unwrap()
});

/// Nested multipart levels walked before giving up
const MAX_NESTING: usize = 8;

/// The useful content of an MHT archive
#[derive(Debug, Default)]
pub struct MhtDocument {
    pub html: String,
    pub resources: ResourceMap,
}

/// Header fields with lowercased names, continuation lines unfolded
#[derive(Debug, Default)]
struct Headers(Vec<(String, String)>);

impl Headers {
    fn parse(block: &str) -> Self {
        let mut fields: Vec<(String, String)> = Vec::new();
        for line in block.lines() {
            if line.starts_with([' ', '\t']) {
                if let Some((_, value)) = fields.last_mut() {
                    value.push(' ');
                    value.push_str(line.trim());
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                fields.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
            }
        }
        Headers(fields)
    }

    fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Lowercased media type plus its parameters
    fn content_type(&self) -> (String, HashMap<String, String>) {
        let Some(raw) = self.get("content-type") else {
            return (String::new(), HashMap::new());
        };
        let media_type = raw.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        let params = PARAM_RE
            .captures_iter(raw)
            .map(|caps| {
                let value = caps.get(2).or_else(|| caps.get(3)).map_or("", |m| m.as_str());
                (caps[1].to_ascii_lowercase(), value.to_string())
            })
            .collect();
        (media_type, params)
    }

    fn transfer_encoding(&self) -> String {
        self.get("content-transfer-encoding")
            .unwrap_or("")
            .trim()
            .to_ascii_lowercase()
    }
}

/// Split an entity into its header block and body at the first blank line.
///
/// Text that does not open with a header line is all body.
fn split_entity(text: &str) -> (Headers, &str) {
    let trimmed = text.trim_start_matches(['\r', '\n']);
    if !HEADER_LINE_RE.is_match(trimmed) {
        return (Headers::default(), text);
    }
    match BLANK_LINE_RE.find(trimmed) {
        Some(m) => (Headers::parse(&trimmed[..m.start()]), &trimmed[m.end()..]),
        None => (Headers::parse(trimmed), ""),
    }
}

/// Parse an MHT/MHTML archive
pub fn parse_mht(raw: &str) -> MhtDocument {
    let mut doc = MhtDocument::default();
    let (headers, body) = split_entity(raw);
    let (media_type, params) = headers.content_type();

    match params.get("boundary").filter(|_| media_type.starts_with("multipart/")) {
        Some(boundary) => {
            let mut html = None;
            walk_multipart(body, boundary, 0, &mut html, &mut doc.resources);
            doc.html = html.unwrap_or_default();
        }
        None => doc.html = decode_text(body, &headers),
    }

    doc
}

fn walk_multipart(
    body: &str,
    boundary: &str,
    depth: usize,
    html: &mut Option<String>,
    resources: &mut ResourceMap,
) {
    if depth >= MAX_NESTING {
        log::debug!("Ignoring multipart nested {} levels deep", depth);
        return;
    }

    let delimiter = format!("--{}", boundary);
    // The first segment is the preamble
    for segment in body.split(delimiter.as_str()).skip(1) {
        if segment.starts_with("--") || segment.trim().is_empty() {
            continue;
        }
        let segment = segment
            .strip_prefix("\r\n")
            .or_else(|| segment.strip_prefix('\n'))
            .unwrap_or(segment);

        let (headers, part_body) = split_entity(segment);
        let (media_type, params) = headers.content_type();

        if media_type.starts_with("multipart/") {
            if let Some(inner) = params.get("boundary") {
                walk_multipart(part_body, inner, depth + 1, html, resources);
            }
        } else if media_type.starts_with("text/html") {
            if html.is_none() {
                *html = Some(decode_text(part_body, &headers));
            }
        } else if media_type.starts_with("image/") {
            add_image_part(part_body, &headers, media_type, resources);
        }
    }
}

/// Decode a text body per its transfer encoding. Non-UTF-8 bytes are
/// replaced lossily.
fn decode_text(body: &str, headers: &Headers) -> String {
    let body = body.trim_end_matches(['\r', '\n']);
    match headers.transfer_encoding().as_str() {
        "quoted-printable" => {
            String::from_utf8_lossy(&decode_quoted_printable_bytes(body.as_bytes())).into_owned()
        }
        "base64" => match decode_base64(body) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                log::debug!("Undecodable base64 HTML part: {}", e);
                String::new()
            }
        },
        _ => body.to_string(),
    }
}

fn add_image_part(body: &str, headers: &Headers, media_type: String, resources: &mut ResourceMap) {
    let bytes = match headers.transfer_encoding().as_str() {
        "base64" => match decode_base64(body) {
            Ok(bytes) => bytes,
            Err(e) => {
                log::debug!("Skipping image part with bad base64: {}", e);
                return;
            }
        },
        "quoted-printable" => decode_quoted_printable_bytes(body.as_bytes()),
        _ => body.as_bytes().to_vec(),
    };

    let location = headers
        .get("content-location")
        .map(str::trim)
        .filter(|l| !l.is_empty());
    let content_id = headers
        .get("content-id")
        .map(|id| id.trim().trim_start_matches('<').trim_end_matches('>'))
        .filter(|id| !id.is_empty());

    let Some(primary) = location
        .map(str::to_string)
        .or_else(|| content_id.map(|id| format!("cid:{}", id)))
    else {
        log::debug!("Skipping image part with neither location nor id");
        return;
    };

    let filename = location.map(|l| {
        let name = basename(l);
        urlencoding::decode(name).map_or_else(|_| name.to_string(), |d| d.into_owned())
    });
    let slot = resources.insert(primary, ResourceEntry::new(media_type, bytes, filename));

    if let Some(location) = location {
        resources.alias(basename(location), slot);
    }
    if let Some(id) = content_id {
        resources.alias(format!("cid:{}", id), slot);
    }
}
