use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use makbuz_core::Settings;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "makbuz")]
#[command(about = "Multi-pass field extraction for Turkish receipts and invoices")]
#[command(version)]
struct Cli {
    /// Config file path (defaults to makbuz.toml in the user config directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Document kind override for transcript fusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    /// Classify from the transcripts
    #[default]
    Auto,
    Receipt,
    Invoice,
}

#[derive(Subcommand)]
enum Commands {
    /// Fuse existing transcripts (one file per recognition pass) into a record
    Fuse {
        #[arg(required = true)]
        transcripts: Vec<PathBuf>,
        #[arg(short, long, value_enum, default_value_t = KindArg::Auto)]
        kind: KindArg,
        /// Take line items from these transcripts instead
        #[arg(long, num_args = 1..)]
        items_from: Vec<PathBuf>,
    },

    /// Run every recognition pass over an image and print the record
    Scan {
        image: PathBuf,
        /// Keep per-pass transcripts under this directory
        #[arg(long)]
        artifacts: Option<PathBuf>,
    },

    /// Process images dropped into a folder
    Watch {
        intake_dir: PathBuf,
        /// Where `<stem>.json` records are written
        #[arg(short, long)]
        out: PathBuf,
    },

    /// Score predictions against hand-labelled expectations
    Evaluate {
        expectations: PathBuf,
        /// One transcript directory or image per labelled document
        samples_dir: PathBuf,
    },
}

fn load_settings(explicit: Option<&PathBuf>) -> anyhow::Result<Settings> {
    if let Some(path) = explicit {
        return Settings::load(path).with_context(|| format!("loading {}", path.display()));
    }
    match directories::ProjectDirs::from("com", "makbuz", "Makbuz") {
        Some(dirs) => {
            let path = dirs.config_dir().join("makbuz.toml");
            Settings::load_or_default(&path).with_context(|| format!("loading {}", path.display()))
        }
        None => Ok(Settings::default()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let mut settings = load_settings(cli.config.as_ref())?;

    match cli.command {
        Commands::Fuse { transcripts, kind, items_from } => {
            commands::fuse(&settings, &transcripts, kind, &items_from)
        }
        Commands::Scan { image, artifacts } => {
            if artifacts.is_some() {
                settings.pipeline.artifacts_dir = artifacts;
            }
            commands::scan(&settings, &image).await
        }
        Commands::Watch { intake_dir, out } => commands::watch(&settings, &intake_dir, &out).await,
        Commands::Evaluate { expectations, samples_dir } => {
            commands::evaluate(&settings, &expectations, &samples_dir).await
        }
    }
}
