use anyhow::{Context, Result};

use nous_import::document::DocNode;

use crate::app::App;
use crate::render::terminal::{self, Color};
use crate::OutputFormat;

pub async fn run(
    app: &App,
    notebook_name: &str,
    note_title: &str,
    format: &OutputFormat,
    use_color: bool,
) -> Result<()> {
    let notebook = app.find_notebook(notebook_name).await?;
    let note = app.find_note(&notebook, note_title).await?;

    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(&note)?);
        return Ok(());
    }

    if use_color {
        println!("{}{}{}", Color::BOLD, note.title, Color::RESET);
    } else {
        println!("{}", note.title);
    }

    let meta = format!(
        "{} | {} characters | {} attachments",
        note.created_at.format("%Y-%m-%d %H:%M"),
        note.stats.characters,
        note.attachments.len()
    );
    if use_color {
        println!("{}{}{}", Color::DIM, meta, Color::RESET);
    } else {
        println!("{}", meta);
    }

    let document: DocNode = serde_json::from_str(&note.content)
        .with_context(|| format!("Note {} has unreadable content", note.id))?;
    println!();
    println!("{}", terminal::render_document(&document, use_color));

    Ok(())
}
