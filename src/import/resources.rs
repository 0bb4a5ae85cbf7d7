//! Binary resources carried by a legacy export and the three ways note HTML
//! refers to them: by content hash (`<en-media>`), by inline data URI, and by
//! location or archive path.
//!
//! Resolution is pure. It rewrites the HTML to point at freshly allocated
//! storage keys and returns the writes still to be done, which the importer
//! performs before creating the note.

use std::borrow::Cow;
use std::collections::HashMap;
use std::convert::Infallible;
use std::ops::Range;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use uuid::Uuid;

use super::decode::decode_base64;
use super::error::{ImportError, Result};
use crate::document::dom::parse_attrs;
use crate::storage::StoredResource;

static EN_MEDIA_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<en-media\b([^>]*?)/?>(?:\s*</en-media\s*>)?").unwrap());
static IMG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<img\b[^>]*>").unwrap());
static SRC_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)\ssrc\s*=\s*("([^"]*)"|'([^']*)'|([^\s"'>]+))"#).unwrap()
});

/// One binary asset found in an export
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceEntry {
    pub mime: String,
    pub bytes: Vec<u8>,
    /// Original file name, kept for display only
    pub filename: Option<String>,
}

impl ResourceEntry {
    pub fn new(mime: impl Into<String>, bytes: Vec<u8>, filename: Option<String>) -> Self {
        Self {
            mime: mime.into(),
            bytes,
            filename,
        }
    }

    pub fn is_image(&self) -> bool {
        self.mime.to_ascii_lowercase().starts_with("image/")
    }

    pub fn display_name(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or("attachment")
    }
}

/// Resources of one export, reachable under any number of keys.
///
/// Several keys (a raw archive path and its URL-decoded form, a location and
/// its basename) may name the same entry; the entry is stored once.
#[derive(Debug, Default)]
pub struct ResourceMap {
    entries: Vec<ResourceEntry>,
    keys: HashMap<String, usize>,
}

impl ResourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entry` under `key` and return its slot. A key that is
    /// already taken keeps its first entry.
    pub fn insert(&mut self, key: impl Into<String>, entry: ResourceEntry) -> usize {
        let key = key.into();
        if let Some(&slot) = self.keys.get(&key) {
            return slot;
        }
        let slot = self.entries.len();
        self.entries.push(entry);
        self.keys.insert(key, slot);
        slot
    }

    /// Make `key` resolve to `slot` too, unless it already names something.
    pub fn alias(&mut self, key: impl Into<String>, slot: usize) {
        if slot < self.entries.len() {
            self.keys.entry(key.into()).or_insert(slot);
        }
    }

    pub fn slot(&self, key: &str) -> Option<usize> {
        self.keys.get(key).copied()
    }

    pub fn get(&self, key: &str) -> Option<&ResourceEntry> {
        self.slot(key).map(|slot| &self.entries[slot])
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.keys.contains_key(key)
    }

    pub fn entries(&self) -> &[ResourceEntry] {
        &self.entries
    }

    /// Number of distinct entries, not keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A resource write the importer still has to perform
#[derive(Debug, Clone)]
pub struct PendingResource<'a> {
    pub storage_key: String,
    pub mime_type: String,
    pub filename: Option<String>,
    pub bytes: Cow<'a, [u8]>,
}

impl PendingResource<'_> {
    pub fn to_stored(&self) -> StoredResource {
        StoredResource {
            storage_key: self.storage_key.clone(),
            mime_type: self.mime_type.clone(),
            size: self.bytes.len() as u64,
            filename: self.filename.clone(),
        }
    }
}

/// Rewrites resource references in one note's HTML.
///
/// Each map entry is allocated at most one storage key per note, however
/// many times the note refers to it.
pub struct ResourceResolver<'a> {
    resources: &'a ResourceMap,
    url_prefix: &'a str,
    base_dir: Option<&'a str>,
    allocated: HashMap<usize, String>,
    pending: Vec<PendingResource<'a>>,
}

impl<'a> ResourceResolver<'a> {
    pub fn new(resources: &'a ResourceMap, url_prefix: &'a str) -> Self {
        Self {
            resources,
            url_prefix,
            base_dir: None,
            allocated: HashMap::new(),
            pending: Vec::new(),
        }
    }

    /// Resolve relative image paths against `base_dir` before falling back
    /// to bare file names.
    pub fn with_base_dir(mut self, base_dir: Option<&'a str>) -> Self {
        self.base_dir = base_dir;
        self
    }

    /// Replace `<en-media hash="…">` placeholders.
    ///
    /// Images become `<img>`, other files become a link named after the
    /// file. A hash with no matching resource drops the placeholder.
    pub fn resolve_hash_media(&mut self, html: &str) -> String {
        EN_MEDIA_RE
            .replace_all(html, |caps: &Captures| {
                let attrs = parse_attrs(&caps[1]);
                let attr = |name: &str| {
                    attrs
                        .iter()
                        .find(|(key, _)| key == name)
                        .map(|(_, value)| value.trim().to_string())
                };

                let hash = attr("hash").unwrap_or_default().to_ascii_lowercase();
                let Some(slot) = self.resources.slot(&hash) else {
                    log::debug!("Dropping en-media with unknown hash {:?}", hash);
                    return String::new();
                };

                let resources = self.resources;
                let entry = &resources.entries[slot];
                let url = self.allocate(slot);
                let is_image = entry.is_image()
                    || (entry.mime.is_empty()
                        && attr("type").is_some_and(|t| t.to_ascii_lowercase().starts_with("image/")));

                if is_image {
                    format!(
                        r#"<img src="{}" alt="{}"/>"#,
                        html_escape::encode_double_quoted_attribute(&url),
                        html_escape::encode_double_quoted_attribute(entry.display_name()),
                    )
                } else {
                    format!(
                        r#"<a href="{}">{}</a>"#,
                        html_escape::encode_double_quoted_attribute(&url),
                        html_escape::encode_text(entry.display_name()),
                    )
                }
            })
            .into_owned()
    }

    /// Persist every `<img src="data:…">` as a new resource.
    ///
    /// A data URI that cannot be decoded fails the note.
    pub fn resolve_data_uris(&mut self, html: &str) -> Result<String> {
        rewrite_img_srcs::<ImportError>(html, |src| {
            if !is_data_uri(src) {
                return Ok(None);
            }
            let (mime, bytes) = decode_data_uri(src)?;
            let storage_key = storage_key_for(&mime, None);
            let url = attachment_url(self.url_prefix, &storage_key);
            self.pending.push(PendingResource {
                storage_key,
                mime_type: mime,
                filename: None,
                bytes: Cow::Owned(bytes),
            });
            Ok(Some(url))
        })
    }

    /// Point `<img src="path">` at persisted copies of map entries.
    ///
    /// Tries the exact path, its URL-decoded form, then the bare file name,
    /// each relative to the base directory first when one is set. A path
    /// that matches nothing is left as it is.
    pub fn resolve_locations(&mut self, html: &str) -> String {
        let rewritten = rewrite_img_srcs(html, |src| -> std::result::Result<_, Infallible> {
            if src.starts_with(self.url_prefix) || is_data_uri(src) {
                return Ok(None);
            }
            match self.lookup_location(src) {
                Some(slot) => Ok(Some(self.allocate(slot))),
                None => {
                    log::debug!("No resource for image path {:?}", src);
                    Ok(None)
                }
            }
        });
        match rewritten {
            Ok(html) => html,
            Err(never) => match never {},
        }
    }

    fn lookup_location(&self, src: &str) -> Option<usize> {
        let decoded = urlencoding::decode(src).ok();
        let mut candidates = vec![src];
        candidates.extend(decoded.as_deref());

        for candidate in candidates {
            if let Some(base) = self.base_dir {
                if let Some(slot) = self.resources.slot(&join_relative(base, candidate)) {
                    return Some(slot);
                }
            }
            if let Some(slot) = self.resources.slot(candidate) {
                return Some(slot);
            }
        }

        let path = decoded.as_deref().unwrap_or(src);
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.resources.slot(basename(path))
    }

    fn allocate(&mut self, slot: usize) -> String {
        if let Some(key) = self.allocated.get(&slot) {
            return attachment_url(self.url_prefix, key);
        }

        let resources: &'a ResourceMap = self.resources;
        let entry = &resources.entries[slot];
        let storage_key = storage_key_for(&entry.mime, entry.filename.as_deref());
        self.pending.push(PendingResource {
            storage_key: storage_key.clone(),
            mime_type: entry.mime.clone(),
            filename: entry.filename.clone(),
            bytes: Cow::Borrowed(&entry.bytes),
        });
        let url = attachment_url(self.url_prefix, &storage_key);
        self.allocated.insert(slot, storage_key);
        url
    }

    /// Writes collected so far, in the order they were allocated
    pub fn finish(self) -> Vec<PendingResource<'a>> {
        self.pending
    }
}

/// Apply `rewrite` to the decoded `src` of every `<img>`. `Ok(Some(url))`
/// replaces the attribute value, `Ok(None)` keeps the tag untouched.
fn rewrite_img_srcs<E>(
    html: &str,
    mut rewrite: impl FnMut(&str) -> std::result::Result<Option<String>, E>,
) -> std::result::Result<String, E> {
    let mut out = String::with_capacity(html.len());
    let mut last = 0;

    for tag in IMG_RE.find_iter(html) {
        let Some((range, src)) = img_src(tag.as_str()) else {
            continue;
        };
        if let Some(url) = rewrite(&src)? {
            out.push_str(&html[last..tag.start()]);
            out.push_str(&tag.as_str()[..range.start]);
            out.push('"');
            out.push_str(&html_escape::encode_double_quoted_attribute(&url));
            out.push('"');
            out.push_str(&tag.as_str()[range.end..]);
            last = tag.end();
        }
    }

    out.push_str(&html[last..]);
    Ok(out)
}

/// Byte range of the quoted `src` value inside `tag`, and the decoded value
fn img_src(tag: &str) -> Option<(Range<usize>, String)> {
    let caps = SRC_RE.captures(tag)?;
    let whole = caps.get(1)?;
    let raw = caps
        .get(2)
        .or_else(|| caps.get(3))
        .or_else(|| caps.get(4))
        .map_or("", |m| m.as_str());
    let value = html_escape::decode_html_entities(raw.trim()).into_owned();
    Some((whole.range(), value))
}

fn is_data_uri(src: &str) -> bool {
    src.get(..5).is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Split a `data:` URI into its MIME type and payload bytes
pub fn decode_data_uri(uri: &str) -> Result<(String, Vec<u8>)> {
    let rest = uri
        .get(5..)
        .filter(|_| is_data_uri(uri))
        .ok_or_else(|| ImportError::ResourceWrite("not a data URI".to_string()))?;
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| ImportError::ResourceWrite("data URI has no payload".to_string()))?;

    let mut params = meta.split(';');
    let mime = params
        .next()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_ascii_lowercase();
    let is_base64 = params.any(|p| p.trim().eq_ignore_ascii_case("base64"));

    let bytes = if is_base64 {
        decode_base64(payload)
            .map_err(|e| ImportError::ResourceWrite(format!("invalid base64 in data URI: {}", e)))?
    } else {
        urlencoding::decode_binary(payload.as_bytes()).into_owned()
    };
    Ok((mime, bytes))
}

/// Join a relative reference onto an archive directory, folding `.` and
/// `..` segments. Absolute references and URLs come back unchanged.
pub fn join_relative(base_dir: &str, reference: &str) -> String {
    if reference.starts_with('/') || reference.contains(':') {
        return reference.to_string();
    }

    let mut segments: Vec<&str> = base_dir.split(['/', '\\']).filter(|s| !s.is_empty()).collect();
    for segment in reference.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    segments.join("/")
}

/// Last path segment, accepting both separators
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Best MIME type for an archive entry, from its extension
pub fn mime_for_path(path: &str) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// URL under which an attachment stored as `storage_key` is served
pub fn attachment_url(prefix: &str, storage_key: &str) -> String {
    format!("{}{}", prefix, storage_key)
}

/// A fresh, collision-free storage key such as `<uuid>.png`
pub fn storage_key_for(mime: &str, filename: Option<&str>) -> String {
    format!("{}.{}", Uuid::new_v4(), extension_for(mime, filename))
}

fn extension_for(mime: &str, filename: Option<&str>) -> String {
    let mime = mime.trim().to_ascii_lowercase();
    let known = match mime.as_str() {
        "image/jpeg" | "image/jpg" | "image/pjpeg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/gif" => Some("gif"),
        "image/webp" => Some("webp"),
        "image/svg+xml" => Some("svg"),
        "image/bmp" | "image/x-ms-bmp" => Some("bmp"),
        "image/tiff" => Some("tiff"),
        "application/pdf" => Some("pdf"),
        "text/plain" => Some("txt"),
        _ => None,
    };
    if let Some(ext) = known {
        return ext.to_string();
    }

    let from_name = filename
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty() && ext.len() <= 8 && ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(str::to_ascii_lowercase);
    if let Some(ext) = from_name {
        return ext;
    }

    mime_guess::get_mime_extensions_str(&mime)
        .and_then(|exts| exts.first())
        .map(|ext| ext.to_string())
        .unwrap_or_else(|| "bin".to_string())
}
