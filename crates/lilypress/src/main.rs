//! lilypress - LilyPond engraving service and CLI
//!
//! Subcommands:
//! - `lilypress serve` - Run the HTTP API
//! - `lilypress convert <file.ly>` - Engrave a score to PDF (and MIDI)
//! - `lilypress title <file.ly>` - Print a score's title
//! - `lilypress from-midi <file.mid>` - Re-encode MIDI as LilyPond source
//! - `lilypress locate` - Show where LilyPond was found
//! - `lilypress templates [name]` - List or print starter scores
//! - `lilypress config` - Show the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use lilypress::telemetry;
use pressconf::PressConfig;
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(name = "lilypress")]
#[command(about = "Engrave LilyPond scores to PDF and MIDI")]
#[command(version)]
struct Cli {
    /// Config file to use instead of ./lilypress.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API
    Serve {
        /// HTTP port to bind (default from config)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (default from config)
        #[arg(long)]
        host: Option<String>,
    },

    /// Convert LilyPond source to PDF (and MIDI when the score has a \midi block)
    Convert {
        /// Source file, or - for stdin
        input: PathBuf,

        /// Output base name (default: the score's title, else the file stem)
        #[arg(short, long)]
        output: Option<String>,

        /// Directory to write the artifacts to
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Print the title from a score's \header block
    Title {
        /// Source file, or - for stdin
        input: PathBuf,
    },

    /// Re-encode a MIDI file as LilyPond source
    FromMidi {
        /// MIDI file to read
        input: PathBuf,

        /// Title for the header (default: the file stem)
        #[arg(long)]
        title: Option<String>,

        /// Composer for the header
        #[arg(long, default_value = "Unknown")]
        composer: String,

        /// Skip the clean-up pass and print the plain re-encoding
        #[arg(long)]
        raw: bool,

        /// Write to this file instead of stdout
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Show where LilyPond was found
    Locate,

    /// List starter scores, or print one by name
    Templates {
        /// Template name, e.g. "Piano Solo"
        name: Option<String>,
    },

    /// Print the effective configuration and where it came from
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = PressConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    // OTLP export only for the long-running server
    let otlp_endpoint = config.telemetry.otlp_endpoint.trim();
    if matches!(cli.command, Commands::Serve { .. }) && !otlp_endpoint.is_empty() {
        telemetry::init_otlp(otlp_endpoint, &config.telemetry.log_level)?;
    } else {
        telemetry::init_fmt(&config.telemetry.log_level);
    }

    match cli.command {
        Commands::Serve { port, host } => {
            commands::serve(&config, port, host).await?;
        }
        Commands::Convert {
            input,
            output,
            out_dir,
        } => {
            commands::convert(&config, &input, output.as_deref(), &out_dir).await?;
        }
        Commands::Title { input } => {
            commands::title(&input).await?;
        }
        Commands::FromMidi {
            input,
            title,
            composer,
            raw,
            output,
        } => {
            commands::from_midi(&input, title.as_deref(), &composer, !raw, output.as_deref())
                .await?;
        }
        Commands::Locate => {
            commands::locate(&config)?;
        }
        Commands::Templates { name } => {
            commands::templates(name.as_deref())?;
        }
        Commands::Config => {
            commands::show_config(&config, &sources);
        }
    }

    Ok(())
}
