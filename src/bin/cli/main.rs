mod app;
mod commands;
mod render;

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "nous-import", about = "Import Evernote and OneNote exports into Nous notebooks", version)]
struct Cli {
    /// Data directory (default: the platform data dir)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Owner of imported notes (default: the local user)
    #[arg(long, global = true)]
    user: Option<Uuid>,

    /// Output format
    #[arg(long, global = true, default_value = "plain")]
    format: OutputFormat,

    /// Disable ANSI colors
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Plain,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Import an .enex, .mht, .mhtml, .html or .zip export
    Import {
        file: PathBuf,
        /// Target notebook name or id (default: the import notebook)
        #[arg(long)]
        notebook: Option<String>,
        /// Import into the vault
        #[arg(long)]
        vault: bool,
    },

    /// Show what an import would bring in without writing anything
    Preview { file: PathBuf },

    /// List notebooks and their note counts
    List,

    /// Show a note as plain text
    Show {
        /// Notebook name (case-insensitive prefix match)
        notebook: String,
        /// Note title (case-insensitive prefix match)
        note: String,
    },

    /// Write the current import settings to disk, creating the file if needed
    Settings,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let use_color = !cli.no_color && std::io::stdout().is_terminal();
    let app = app::App::new(cli.data_dir, cli.user).await?;

    match cli.command {
        Command::Import { file, notebook, vault } => {
            commands::import::run(&app, &file, notebook.as_deref(), vault, &cli.format, use_color)
                .await?;
        }
        Command::Preview { file } => {
            commands::preview::run(&app, &file, &cli.format, use_color)?;
        }
        Command::List => {
            commands::list::run(&app, &cli.format).await?;
        }
        Command::Show { notebook, note } => {
            commands::show::run(&app, &notebook, &note, &cli.format, use_color).await?;
        }
        Command::Settings => {
            commands::settings::run(&app, &cli.format)?;
        }
    }

    Ok(())
}
