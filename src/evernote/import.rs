//! Evernote .enex parsing
//!
//! Reads the export XML into [`EnexNote`]s. Resources stay base64 until
//! [`EnexNote::into_record`] runs, which is done per note so one corrupt
//! attachment cannot sink the rest of the file.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::import::decode::decode_base64;
use crate::import::{
    ImportError, ParsedNoteRecord, ResourceEntry, ResourceMap, Result, SourceFlavor,
};

/// A parsed Evernote note
#[derive(Debug, Clone, Default)]
pub struct EnexNote {
    pub title: String,
    /// ENML content, still wrapped in `<en-note>`
    pub content: String,
    pub tags: Vec<String>,
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub resources: Vec<EnexResource>,
}

/// A note resource/attachment, not yet decoded
#[derive(Debug, Clone, Default)]
pub struct EnexResource {
    /// Base64 payload exactly as exported, line breaks included
    pub data: String,
    pub mime: String,
    pub filename: Option<String>,
}

/// Parse Evernote date format (YYYYMMDDTHHmmssZ)
pub fn parse_evernote_date(date_str: &str) -> Option<DateTime<Utc>> {
    // Format: 20231231T235959Z
    let clean = date_str.trim();
    if clean.len() < 15 {
        return None;
    }

    let without_z = clean.trim_end_matches('Z');
    NaiveDateTime::parse_from_str(without_z, "%Y%m%dT%H%M%S")
        .ok()
        .map(|dt| dt.and_utc())
}

/// Parse ENEX file and extract notes.
///
/// The document must have an `en-export` root with at least one `note`
/// child; anything else is rejected as a whole. DTD entities are never
/// expanded.
pub fn parse_enex(content: &str) -> Result<Vec<EnexNote>> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut notes = Vec::new();
    let mut buf = Vec::new();

    // Open element names from the root down
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut saw_root = false;
    let mut current_note: Option<EnexNote> = None;
    let mut current_resource: Option<EnexResource> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();

                if path.is_empty() {
                    if name != "en-export" {
                        return Err(ImportError::InvalidFormat(format!(
                            "expected an en-export root, found <{}>",
                            name
                        )));
                    }
                    saw_root = true;
                }

                match name.as_str() {
                    "note" if path.len() == 1 => current_note = Some(EnexNote::default()),
                    "resource" if current_note.is_some() => {
                        current_resource = Some(EnexResource::default())
                    }
                    _ => {}
                }

                path.push(name);
                text.clear();
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).to_string();
                let parent = path.len().checked_sub(2).and_then(|i| path.get(i)).map(String::as_str);
                let value = std::mem::take(&mut text);

                match (name.as_str(), parent) {
                    ("note", Some("en-export")) => {
                        if let Some(note) = current_note.take() {
                            notes.push(note);
                        }
                    }
                    ("resource", Some("note")) => {
                        if let (Some(note), Some(resource)) =
                            (current_note.as_mut(), current_resource.take())
                        {
                            note.resources.push(resource);
                        }
                    }
                    ("data", Some("resource")) => {
                        if let Some(resource) = current_resource.as_mut() {
                            resource.data = value;
                        }
                    }
                    ("mime", Some("resource")) => {
                        if let Some(resource) = current_resource.as_mut() {
                            resource.mime = value.trim().to_string();
                        }
                    }
                    ("file-name", Some("resource-attributes")) => {
                        if let Some(resource) = current_resource.as_mut() {
                            let filename = value.trim();
                            if !filename.is_empty() {
                                resource.filename = Some(filename.to_string());
                            }
                        }
                    }
                    (field, Some("note")) => {
                        if let Some(note) = current_note.as_mut() {
                            match field {
                                "title" => note.title = value.trim().to_string(),
                                "content" => note.content = value,
                                "tag" => {
                                    let tag = value.trim();
                                    if !tag.is_empty() {
                                        note.tags.push(tag.to_string());
                                    }
                                }
                                "created" => note.created = parse_evernote_date(&value),
                                "updated" => note.updated = parse_evernote_date(&value),
                                _ => {}
                            }
                        }
                    }
                    _ => {}
                }

                path.pop();
            }
            Ok(Event::Text(e)) => {
                // Unknown entities are kept literally rather than expanded
                match e.unescape() {
                    Ok(unescaped) => text.push_str(&unescaped),
                    Err(_) => text.push_str(&String::from_utf8_lossy(&e)),
                }
            }
            Ok(Event::CData(e)) => {
                // Content is typically in CDATA
                text.push_str(&String::from_utf8_lossy(&e));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ImportError::InvalidFormat(format!(
                    "XML parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    if !saw_root {
        return Err(ImportError::InvalidFormat(
            "missing en-export root element".to_string(),
        ));
    }
    if notes.is_empty() {
        return Err(ImportError::InvalidFormat(
            "en-export contains no note elements".to_string(),
        ));
    }

    Ok(notes)
}

impl EnexNote {
    /// Decode resources and key each one by the MD5 of its bytes, the
    /// address `<en-media hash="…">` uses.
    pub fn into_record(self) -> Result<ParsedNoteRecord> {
        let mut resources = ResourceMap::new();
        for resource in self.resources {
            let bytes = decode_base64(&resource.data).map_err(|e| {
                ImportError::ResourceWrite(format!(
                    "resource {:?} is not valid base64: {}",
                    resource.filename.as_deref().unwrap_or("attachment"),
                    e
                ))
            })?;
            let hash = format!("{:x}", md5::compute(&bytes));
            resources.insert(hash, ResourceEntry::new(resource.mime, bytes, resource.filename));
        }

        Ok(ParsedNoteRecord {
            title: self.title,
            html: self.content,
            tags: self.tags,
            created_at: self.created,
            updated_at: self.updated,
            resources: Arc::new(resources),
            base_dir: None,
            flavor: SourceFlavor::Enex,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE en-export SYSTEM "http://xml.evernote.com/pub/evernote-export3.dtd">
<en-export export-date="20240101T000000Z" application="Evernote" version="10">
  <note>
    <title>Groceries &amp; more</title>
    <content><![CDATA[<?xml version="1.0" encoding="UTF-8"?><en-note><div>Milk</div><en-media hash="5d41402abc4b2a76b9719d911017c592" type="image/png"/></en-note>]]></content>
    <created>20231231T235959Z</created>
    <updated>garbage</updated>
    <tag>home</tag>
    <tag>  </tag>
    <tag>errands</tag>
    <resource>
      <data encoding="base64">aGVs
bG8=</data>
      <mime>image/png</mime>
      <resource-attributes><file-name>hello.png</file-name></resource-attributes>
    </resource>
  </note>
  <note>
    <title>Second</title>
    <content>&lt;en-note&gt;plain&lt;/en-note&gt;</content>
  </note>
</en-export>"#;

    #[test]
    fn test_parse_evernote_date() {
        let date = parse_evernote_date("20231231T235959Z").unwrap();
        assert_eq!((date.year(), date.month(), date.day()), (2023, 12, 31));
        assert_eq!((date.hour(), date.minute(), date.second()), (23, 59, 59));
        assert!(parse_evernote_date("2023").is_none());
        assert!(parse_evernote_date("not a date at all").is_none());
    }

    #[test]
    fn test_parse_enex_notes() {
        let notes = parse_enex(SAMPLE).unwrap();
        assert_eq!(notes.len(), 2);

        let first = &notes[0];
        assert_eq!(first.title, "Groceries & more");
        assert_eq!(first.tags, vec!["home", "errands"]);
        assert!(first.created.is_some());
        assert!(first.updated.is_none());
        assert!(first.content.contains("<en-media"));
        assert_eq!(first.resources.len(), 1);
        assert_eq!(first.resources[0].mime, "image/png");
        assert_eq!(first.resources[0].filename.as_deref(), Some("hello.png"));

        let second = &notes[1];
        assert_eq!(second.content, "<en-note>plain</en-note>");
        assert!(second.tags.is_empty());
        assert!(second.resources.is_empty());
    }

    #[test]
    fn test_resources_keyed_by_md5() {
        let notes = parse_enex(SAMPLE).unwrap();
        let record = notes[0].clone().into_record().unwrap();
        let entry = record.resources.get("5d41402abc4b2a76b9719d911017c592").unwrap();
        assert_eq!(entry.bytes, b"hello");
        assert_eq!(record.flavor, SourceFlavor::Enex);
    }

    #[test]
    fn test_corrupt_resource_fails_into_record() {
        let note = EnexNote {
            title: "Broken".to_string(),
            resources: vec![EnexResource {
                data: "***".to_string(),
                mime: "image/png".to_string(),
                filename: None,
            }],
            ..EnexNote::default()
        };
        assert!(matches!(note.into_record(), Err(ImportError::ResourceWrite(_))));
    }

    #[test]
    fn test_missing_root_is_invalid_format() {
        let result = parse_enex("<notes><note><title>x</title></note></notes>");
        assert!(matches!(result, Err(ImportError::InvalidFormat(_))));
    }

    #[test]
    fn test_no_notes_is_invalid_format() {
        let result = parse_enex(r#"<?xml version="1.0"?><en-export></en-export>"#);
        assert!(matches!(result, Err(ImportError::InvalidFormat(_))));

        // A note nested below the top level does not count
        let result = parse_enex("<en-export><wrapper><note><title>x</title></note></wrapper></en-export>");
        assert!(matches!(result, Err(ImportError::InvalidFormat(_))));
    }

    #[test]
    fn test_malformed_xml_is_invalid_format() {
        let result = parse_enex("<en-export><note><title>x</note></en-export>");
        assert!(matches!(result, Err(ImportError::InvalidFormat(_))));
        assert!(matches!(parse_enex(""), Err(ImportError::InvalidFormat(_))));
    }

    #[test]
    fn test_internal_entities_are_not_expanded() {
        let xml = r#"<?xml version="1.0"?>
<!DOCTYPE en-export [<!ENTITY boom "EXPANDED">]>
<en-export><note><title>&boom;</title><content>x</content></note></en-export>"#;
        let notes = parse_enex(xml).unwrap();
        assert!(!notes[0].title.contains("EXPANDED"));
    }
}
