//! OneNote export readers: single HTML pages, MHT archives and ZIP bundles
//! of either.

use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;

use zip::ZipArchive;

use super::mhtml::parse_mht;
use crate::import::resources::mime_for_path;
use crate::import::{ImportError, ParsedNoteRecord, ResourceEntry, ResourceMap, Result};
use crate::storage::html_utils::extract_html_title;

/// Notes and resources found in a ZIP export
#[derive(Debug, Default)]
pub struct ZipExport {
    pub records: Vec<ParsedNoteRecord>,
    pub resource_count: usize,
    pub warnings: Vec<String>,
}

enum PageKind {
    Html,
    Mht,
}

/// File name without directory or extension
pub fn file_stem(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().to_string())
        .filter(|stem| !stem.is_empty())
        .unwrap_or_else(|| "Untitled".to_string())
}

/// A standalone `.html`/`.htm` page, titled by its `<title>` when present
pub fn parse_html_file(bytes: &[u8], filename: &str) -> ParsedNoteRecord {
    let html = String::from_utf8_lossy(bytes).into_owned();
    let title = extract_html_title(&html).unwrap_or_else(|| file_stem(filename));
    ParsedNoteRecord::onenote(title, html, Arc::new(ResourceMap::new()))
}

/// A standalone `.mht`/`.mhtml` archive, titled like an HTML page
pub fn parse_mht_file(bytes: &[u8], filename: &str) -> ParsedNoteRecord {
    let doc = parse_mht(&String::from_utf8_lossy(bytes));
    let title = extract_html_title(&doc.html).unwrap_or_else(|| file_stem(filename));
    ParsedNoteRecord::onenote(title, doc.html, Arc::new(doc.resources))
}

fn is_ignored_entry(name: &str) -> bool {
    name.starts_with("__MACOSX/")
        || name
            .split('/')
            .any(|segment| segment.starts_with('.') && segment != "." && segment != "..")
}

fn page_kind(name: &str) -> Option<PageKind> {
    let extension = Path::new(name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())?;
    match extension.as_str() {
        "html" | "htm" => Some(PageKind::Html),
        "mht" | "mhtml" => Some(PageKind::Mht),
        _ => None,
    }
}

/// Read a zip entry, refusing to inflate more than `max_bytes`
fn read_entry_bounded(entry: impl Read, name: &str, max_bytes: u64) -> std::result::Result<Vec<u8>, String> {
    let mut out = Vec::new();
    entry
        .take(max_bytes.saturating_add(1))
        .read_to_end(&mut out)
        .map_err(|e| format!("Could not read {}: {}", name, e))?;
    if out.len() as u64 > max_bytes {
        return Err(format!(
            "Skipped {}: larger than {} bytes once decompressed",
            name, max_bytes
        ));
    }
    Ok(out)
}

/// Walk a ZIP export.
///
/// HTML pages and MHT archives each become one note titled after the entry.
/// Every other entry joins a resource pool shared by the HTML pages, keyed by
/// its raw path and by the URL-decoded path. Unreadable or oversized entries
/// are skipped with a warning.
pub fn parse_zip(bytes: &[u8], max_entry_bytes: u64) -> Result<ZipExport> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| ImportError::InvalidFormat(format!("Unreadable ZIP archive: {}", e)))?;

    let mut export = ZipExport::default();
    let mut pages: Vec<(String, PageKind, Vec<u8>)> = Vec::new();
    let mut pool = ResourceMap::new();

    for i in 0..archive.len() {
        let entry = match archive.by_index(i) {
            Ok(entry) => entry,
            Err(e) => {
                export.warnings.push(format!("Could not open ZIP entry {}: {}", i, e));
                continue;
            }
        };
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        if is_ignored_entry(&name) {
            continue;
        }

        let data = match read_entry_bounded(entry, &name, max_entry_bytes) {
            Ok(data) => data,
            Err(warning) => {
                log::warn!("{}", warning);
                export.warnings.push(warning);
                continue;
            }
        };

        match page_kind(&name) {
            Some(kind) => pages.push((name, kind, data)),
            None => {
                let filename = Path::new(&name)
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string());
                let entry = ResourceEntry::new(mime_for_path(&name), data, filename);
                let slot = pool.insert(name.clone(), entry);
                if let Ok(decoded) = urlencoding::decode(&name) {
                    pool.alias(decoded.into_owned(), slot);
                }
            }
        }
    }

    export.resource_count = pool.len();
    let pool = Arc::new(pool);

    for (name, kind, data) in pages {
        let title = file_stem(&name);
        let record = match kind {
            PageKind::Html => {
                let base_dir = Path::new(&name)
                    .parent()
                    .map(|dir| dir.to_string_lossy().to_string());
                ParsedNoteRecord::onenote(title, String::from_utf8_lossy(&data).into_owned(), pool.clone())
                    .with_base_dir(base_dir)
            }
            PageKind::Mht => {
                let doc = parse_mht(&String::from_utf8_lossy(&data));
                export.resource_count += doc.resources.len();
                ParsedNoteRecord::onenote(title, doc.html, Arc::new(doc.resources))
            }
        };
        export.records.push(record);
    }

    if export.records.is_empty() {
        export
            .warnings
            .push("No HTML or MHT pages found in ZIP archive".to_string());
    }

    Ok(export)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;
    use zip::ZipWriter;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                writer.add_directory(*name, options).unwrap();
            } else {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_html_file_title() {
        let record = parse_html_file(b"<html><head><title>Plan</title></head><body>x</body></html>", "page.htm");
        assert_eq!(record.title, "Plan");

        let record = parse_html_file(b"<p>x</p>", "Weekly Notes.html");
        assert_eq!(record.title, "Weekly Notes");
        assert!(record.resources.is_empty());
    }

    #[test]
    fn test_zip_pages_and_pool() {
        let mht = b"Content-Type: text/html\r\n\r\n<p>from mht</p>";
        let bytes = build_zip(&[
            ("Section/", b""),
            ("Section/Page One.htm", b"<p>one</p><img src=\"Page%20One_files/a.png\">"),
            ("Section/Page One_files/a.png", b"PNG"),
            ("Section/Page%20Two.png", b"PNG2"),
            ("Other.mht", mht),
            ("__MACOSX/Section/._Page One.htm", b"junk"),
            (".DS_Store", b"junk"),
        ]);

        let export = parse_zip(&bytes, 1024).unwrap();
        let titles: Vec<&str> = export.records.iter().map(|r| r.title.as_str()).collect();
        assert_eq!(titles, vec!["Page One", "Other"]);
        assert_eq!(export.resource_count, 2);
        assert!(export.warnings.is_empty());

        let page = &export.records[0];
        assert_eq!(page.base_dir.as_deref(), Some("Section"));
        assert!(page.resources.contains_key("Section/Page One_files/a.png"));
        assert!(page.resources.contains_key("Section/Page%20Two.png"));
        assert!(page.resources.contains_key("Section/Page Two.png"));
        assert_eq!(page.resources.get("Section/Page One_files/a.png").unwrap().mime, "image/png");

        assert_eq!(export.records[1].html, "<p>from mht</p>");
    }

    #[test]
    fn test_zip_entry_size_guard() {
        let big = vec![b'a'; 2048];
        let bytes = build_zip(&[("big.htm", &big), ("small.htm", b"<p>ok</p>")]);

        let export = parse_zip(&bytes, 1024).unwrap();
        assert_eq!(export.records.len(), 1);
        assert_eq!(export.records[0].title, "small");
        assert_eq!(export.warnings.len(), 1);
    }

    #[test]
    fn test_not_a_zip_is_invalid_format() {
        assert!(matches!(
            parse_zip(b"definitely not a zip", 1024),
            Err(ImportError::InvalidFormat(_))
        ));
    }
}
