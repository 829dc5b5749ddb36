//! # mediadex CLI (`mdx`)
//!
//! The `mdx` binary drives the indexer: database setup, link checks,
//! indexing jobs, and index statistics.
//!
//! ## Usage
//!
//! ```bash
//! mdx --config ./config/mdx.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `mdx init` | Create the SQLite database and schema |
//! | `mdx resolve <link>` | Show the chat and position a link points to |
//! | `mdx index [<link>]` | Run one indexing job against the configured export |
//! | `mdx stats` | Show indexed media counts and unfinished jobs |
//! | `mdx completions <shell>` | Print a shell completion script |
//!
//! Logging goes to stderr and is controlled with `RUST_LOG`
//! (default `info`).

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

use mediadex::progress::ProgressMode;
use mediadex::{config, ingest, links, migrate, stats};

/// mediadex CLI — a single-flight, resumable media indexer for chat
/// message histories.
///
/// All commands except `resolve` and `completions` read the TOML file given
/// by `--config`.
#[derive(Parser)]
#[command(
    name = "mdx",
    about = "mediadex — a single-flight, resumable media indexer for chat message histories",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/mdx.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the media and checkpoints
    /// tables. Idempotent.
    Init,

    /// Resolve a chat link to a chat and starting position.
    Resolve {
        /// A t.me / telegram.me / telegram.dog link, optionally with a message id.
        reference: String,
    },

    /// Index media from the configured chat export.
    ///
    /// Walks the history from the starting message down to the first one,
    /// storing videos, audio files and documents. Press Ctrl-C to cancel
    /// after the current message; `--resume` continues from where a
    /// cancelled or failed job stopped.
    Index {
        /// Chat link naming the chat and, optionally, the starting message.
        reference: Option<String>,

        /// Chat id or @handle, overriding the link's chat.
        #[arg(long)]
        chat: Option<String>,

        /// Starting message id, overriding the link's position.
        #[arg(long)]
        from: Option<i64>,

        /// Continue from the stored resume marker when there is one.
        #[arg(long)]
        resume: bool,

        /// Progress output: `auto`, `human`, `json` or `off`.
        #[arg(long, default_value = "auto")]
        progress: String,
    },

    /// Show indexed media counts and unfinished jobs.
    Stats,

    /// Print a shell completion script.
    Completions {
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    // Commands that don't require config
    match &cli.command {
        Commands::Resolve { reference } => {
            return links::run_resolve(reference);
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(*shell, &mut cmd, "mdx", &mut std::io::stdout());
            return Ok(());
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            migrate::run_migrations(&cfg).await?;
            println!("Database initialized successfully.");
        }
        Commands::Index {
            reference,
            chat,
            from,
            resume,
            progress,
        } => {
            let mode = ProgressMode::from_flag(&progress)?;
            ingest::run_index(&cfg, reference, chat, from, resume, mode).await?;
        }
        Commands::Stats => {
            stats::run_stats(&cfg).await?;
        }
        Commands::Resolve { .. } | Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
