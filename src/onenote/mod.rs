//! OneNote import module
//!
//! OneNote's web exports: `.mht`/`.mhtml` archives, plain `.html` pages, and
//! `.zip` bundles holding any mix of the two plus their image folders.

mod import;
pub mod mhtml;

pub use import::*;
pub use mhtml::{parse_mht, MhtDocument};
