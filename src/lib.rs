//! Legacy note import for Nous.
//!
//! Reads Evernote ENEX exports and OneNote web exports (MHT, HTML, ZIP),
//! normalizes their HTML, stores their resources and creates notes holding
//! the editor's document tree.

pub mod document;
pub mod evernote;
pub mod import;
pub mod onenote;
pub mod storage;
