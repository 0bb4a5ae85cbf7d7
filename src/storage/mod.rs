mod file_storage;
pub mod html_utils;
mod models;
mod traits;

pub use file_storage::{FileStorage, Result, StorageError};
pub use models::*;
pub use traits::{BlobStore, NoteStore, NotebookStore, TagStore};
