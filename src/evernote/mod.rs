//! Evernote import module
//!
//! Reads Evernote .enex export files into note records.
//! Supports:
//! - Note content (ENML, normalized later like any other HTML)
//! - Tags
//! - Attachments/resources, addressed by the MD5 of their bytes
//! - Created/updated timestamps

mod import;

pub use import::*;
