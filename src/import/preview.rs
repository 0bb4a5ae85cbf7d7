use serde::Serialize;

use super::container::parse_container;
use super::error::Result;
use super::record::ImportFormat;
use super::settings::ImportSettings;

/// How many notes a preview lists individually
const PREVIEW_NOTES: usize = 10;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotePreview {
    pub title: String,
    pub tags: Vec<String>,
    pub has_attachments: bool,
    pub created: Option<String>,
}

/// What an import would bring in, without writing anything
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportPreview {
    pub format: ImportFormat,
    pub note_count: usize,
    pub resource_count: usize,
    pub notes: Vec<NotePreview>,
    pub suggested_name: String,
    pub warnings: Vec<String>,
}

/// Parse a container and summarize it. Resources are counted but not
/// decoded, so a preview can succeed where a full import of a note fails.
pub fn preview(bytes: &[u8], filename: &str, settings: &ImportSettings) -> Result<ImportPreview> {
    let container = parse_container(bytes, filename, settings)?;

    let notes = container
        .seeds
        .iter()
        .take(PREVIEW_NOTES)
        .map(|seed| NotePreview {
            title: seed.title().to_string(),
            tags: seed.tags().to_vec(),
            has_attachments: seed.has_attachments(),
            created: seed.created_at().map(|at| at.to_rfc3339()),
        })
        .collect();

    let mut warnings = container.warnings;
    if container.seeds.is_empty() {
        warnings.push(format!("No notes found in {}", filename));
    }

    Ok(ImportPreview {
        format: container.format,
        note_count: container.seeds.len(),
        resource_count: container.resource_count,
        notes,
        suggested_name: container.suggested_name,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::ImportError;

    fn enex_with(count: usize) -> Vec<u8> {
        let notes: String = (0..count)
            .map(|i| {
                format!(
                    "<note><title>Note {}</title><content><![CDATA[<en-note>x</en-note>]]></content>\
                     <created>20230301T120000Z</created><tag>t{}</tag>\
                     <resource><data>AAAA</data><mime>image/png</mime></resource></note>",
                    i, i
                )
            })
            .collect();
        format!("<en-export>{}</en-export>", notes).into_bytes()
    }

    #[test]
    fn test_preview_lists_at_most_ten_notes() {
        let preview = preview(&enex_with(12), "Travel.enex", &ImportSettings::default()).unwrap();

        assert_eq!(preview.format, ImportFormat::Enex);
        assert_eq!(preview.note_count, 12);
        assert_eq!(preview.resource_count, 12);
        assert_eq!(preview.notes.len(), 10);
        assert_eq!(preview.suggested_name, "Travel");
        assert!(preview.warnings.is_empty());

        let first = &preview.notes[0];
        assert_eq!(first.title, "Note 0");
        assert_eq!(first.tags, vec!["t0".to_string()]);
        assert!(first.has_attachments);
        assert_eq!(first.created.as_deref(), Some("2023-03-01T12:00:00+00:00"));
    }

    #[test]
    fn test_preview_html_page() {
        let preview = preview(
            b"<html><head><title>Page</title></head><body><p>x</p></body></html>",
            "export.html",
            &ImportSettings::default(),
        )
        .unwrap();

        assert_eq!(preview.note_count, 1);
        assert_eq!(preview.notes[0].title, "Page");
        assert!(!preview.notes[0].has_attachments);
        assert!(preview.notes[0].created.is_none());
    }

    #[test]
    fn test_preview_rejects_what_import_rejects() {
        assert!(matches!(
            preview(b"x", "notes.pdf", &ImportSettings::default()),
            Err(ImportError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_preview_serializes_camel_case() {
        let preview = preview(&enex_with(1), "a.enex", &ImportSettings::default()).unwrap();
        let json = serde_json::to_value(&preview).unwrap();

        assert_eq!(json["format"], "enex");
        assert_eq!(json["noteCount"], 1);
        assert_eq!(json["notes"][0]["hasAttachments"], true);
    }
}
