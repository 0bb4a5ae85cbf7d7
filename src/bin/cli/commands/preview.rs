use std::path::Path;

use anyhow::{Context, Result};

use nous_import::import::preview;

use crate::app::App;
use crate::render::terminal::Color;
use crate::OutputFormat;

pub fn run(app: &App, file: &Path, format: &OutputFormat, use_color: bool) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .context("Preview path has no file name")?;

    let preview = preview(&bytes, &filename, &app.settings)?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&preview)?),
        OutputFormat::Plain => {
            if use_color {
                println!("{}{}{}", Color::BOLD, preview.suggested_name, Color::RESET);
            } else {
                println!("{}", preview.suggested_name);
            }
            println!(
                "{:?} export: {} notes, {} resources",
                preview.format, preview.note_count, preview.resource_count
            );
            println!();

            for note in &preview.notes {
                let created = note.created.as_deref().unwrap_or("-");
                let clip = if note.has_attachments { " [attachments]" } else { "" };
                println!("  {}  {}{}", created, note.title, clip);
                if !note.tags.is_empty() {
                    let tags = note.tags.iter().map(|t| format!("#{}", t)).collect::<Vec<_>>();
                    if use_color {
                        println!("    {}{}{}", Color::DIM, tags.join(" "), Color::RESET);
                    } else {
                        println!("    {}", tags.join(" "));
                    }
                }
            }
            if preview.note_count > preview.notes.len() {
                println!("  ... and {} more", preview.note_count - preview.notes.len());
            }

            for warning in &preview.warnings {
                if use_color {
                    eprintln!("{}warning:{} {}", Color::YELLOW, Color::RESET, warning);
                } else {
                    eprintln!("warning: {}", warning);
                }
            }
        }
    }

    Ok(())
}
