use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum ImportError {
    /// The upload exceeds the cap for its format. Aborts the whole request.
    #[error("File is {size} bytes, larger than the {limit} byte limit")]
    SizeLimitExceeded { size: u64, limit: u64 },

    /// Unrecognized extension or a missing top-level structure. Aborts the
    /// whole request.
    #[error("Invalid import file: {0}")]
    InvalidFormat(String),

    /// A resource could not be decoded or written. Fails only its note.
    #[error("Failed to store resource: {0}")]
    ResourceWrite(String),

    /// Any failure while importing a single note
    #[error("Failed to import note \"{title}\": {source}")]
    Note {
        title: String,
        #[source]
        source: Box<ImportError>,
    },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ImportError {
    pub(crate) fn for_note(title: &str, source: ImportError) -> Self {
        ImportError::Note {
            title: title.to_string(),
            source: Box::new(source),
        }
    }

    /// Whether this error rejects the whole request rather than one note
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ImportError::SizeLimitExceeded { .. } | ImportError::InvalidFormat(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ImportError>;
