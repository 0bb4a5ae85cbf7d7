pub mod import;
pub mod list;
pub mod preview;
pub mod settings;
pub mod show;
