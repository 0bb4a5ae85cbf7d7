//! Upload classification and dispatch to the per-format readers.

use std::path::Path;

use super::error::{ImportError, Result};
use super::record::{ImportFormat, NoteSeed};
use super::settings::ImportSettings;
use crate::evernote::parse_enex;
use crate::onenote::{file_stem, parse_html_file, parse_mht_file, parse_zip};

/// Everything a container yielded, in source order
#[derive(Debug)]
pub struct ParsedContainer {
    pub format: ImportFormat,
    pub seeds: Vec<NoteSeed>,
    /// Distinct resources across the whole file
    pub resource_count: usize,
    pub suggested_name: String,
    pub warnings: Vec<String>,
}

/// Pick the container format from the file extension alone
pub fn classify(filename: &str) -> Result<ImportFormat> {
    let extension = Path::new(filename)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "enex" | "xml" => Ok(ImportFormat::Enex),
        "mht" | "mhtml" => Ok(ImportFormat::Mht),
        "html" | "htm" => Ok(ImportFormat::Html),
        "zip" => Ok(ImportFormat::Zip),
        "" => Err(ImportError::InvalidFormat(format!(
            "{} has no file extension",
            filename
        ))),
        other => Err(ImportError::InvalidFormat(format!(
            "Unsupported file type .{}",
            other
        ))),
    }
}

/// Maximum upload size for `format`
pub fn size_limit(format: ImportFormat, settings: &ImportSettings) -> u64 {
    match format {
        ImportFormat::Enex => settings.enex_size_limit,
        ImportFormat::Mht | ImportFormat::Html | ImportFormat::Zip => settings.onenote_size_limit,
    }
}

/// Classify and size-check an upload
pub fn validate(bytes: &[u8], filename: &str, settings: &ImportSettings) -> Result<ImportFormat> {
    let format = classify(filename)?;
    let limit = size_limit(format, settings);
    let size = bytes.len() as u64;
    if size > limit {
        return Err(ImportError::SizeLimitExceeded { size, limit });
    }
    Ok(format)
}

/// Validate an upload and read every note seed out of it
pub fn parse_container(bytes: &[u8], filename: &str, settings: &ImportSettings) -> Result<ParsedContainer> {
    let format = validate(bytes, filename, settings)?;
    let stem = file_stem(filename);

    let container = match format {
        ImportFormat::Enex => {
            let notes = parse_enex(&String::from_utf8_lossy(bytes))?;
            let resource_count = notes.iter().map(|note| note.resources.len()).sum();
            ParsedContainer {
                format,
                seeds: notes.into_iter().map(NoteSeed::Enex).collect(),
                resource_count,
                suggested_name: stem,
                warnings: Vec::new(),
            }
        }
        ImportFormat::Mht => {
            let record = parse_mht_file(bytes, filename);
            let mut warnings = Vec::new();
            if record.html.trim().is_empty() {
                warnings.push("No HTML content found in MHT file".to_string());
            }
            ParsedContainer {
                format,
                resource_count: record.resources.len(),
                seeds: vec![NoteSeed::Parsed(record)],
                suggested_name: stem,
                warnings,
            }
        }
        ImportFormat::Html => ParsedContainer {
            format,
            seeds: vec![NoteSeed::Parsed(parse_html_file(bytes, filename))],
            resource_count: 0,
            suggested_name: stem,
            warnings: Vec::new(),
        },
        ImportFormat::Zip => {
            let export = parse_zip(bytes, settings.max_zip_entry_bytes)?;
            ParsedContainer {
                format,
                seeds: export.records.into_iter().map(NoteSeed::Parsed).collect(),
                resource_count: export.resource_count,
                suggested_name: stem,
                warnings: export.warnings,
            }
        }
    };

    Ok(container)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(classify("My Notes.ENEX").unwrap(), ImportFormat::Enex);
        assert_eq!(classify("page.MHTML").unwrap(), ImportFormat::Mht);
        assert_eq!(classify("page.Htm").unwrap(), ImportFormat::Html);
        assert_eq!(classify("export.zip").unwrap(), ImportFormat::Zip);
    }

    #[test]
    fn test_classify_rejects_unknown() {
        assert!(matches!(classify("notes.docx"), Err(ImportError::InvalidFormat(_))));
        assert!(matches!(classify("README"), Err(ImportError::InvalidFormat(_))));
    }

    #[test]
    fn test_size_limits_per_format() {
        let settings = ImportSettings {
            enex_size_limit: 4,
            onenote_size_limit: 8,
            ..ImportSettings::default()
        };

        assert!(matches!(
            validate(b"12345", "a.enex", &settings),
            Err(ImportError::SizeLimitExceeded { size: 5, limit: 4 })
        ));
        assert_eq!(validate(b"12345", "a.html", &settings).unwrap(), ImportFormat::Html);
        assert!(validate(b"123456789", "a.mht", &settings).is_err());
    }

    #[test]
    fn test_enex_without_root_fails_before_any_note() {
        let result = parse_container(b"<notes/>", "broken.enex", &ImportSettings::default());
        assert!(matches!(result, Err(ImportError::InvalidFormat(_))));
    }

    #[test]
    fn test_html_container() {
        let container = parse_container(b"<p>Hello</p>", "hello.html", &ImportSettings::default()).unwrap();
        assert_eq!(container.format, ImportFormat::Html);
        assert_eq!(container.seeds.len(), 1);
        assert_eq!(container.seeds[0].title(), "hello");
        assert_eq!(container.suggested_name, "hello");
    }
}
