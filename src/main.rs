use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use quickpeek::Config;

mod dump;
mod peek;

/// Get the config directory path (~/.config/quickpeek/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("quickpeek"))
}

#[derive(Parser, Debug)]
#[command(
    name = "quickpeek",
    about = "Stream and dump media submitted to a community feed"
)]
struct Args {
    /// Config file (default: ~/.config/quickpeek/config.toml)
    #[arg(long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dump resolved submission URLs to a JSON file
    Urls {
        /// Feed source name
        feed: String,
        /// Number of submissions to dump
        #[arg(allow_negative_numbers = true)]
        count: i64,
        /// Output file (default: <feed>.json)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Download submitted media files into a directory
    Media {
        /// Feed source name
        feed: String,
        /// Number of media files to download
        #[arg(allow_negative_numbers = true)]
        count: i64,
        /// Target directory (default: ./<feed>/)
        #[arg(short, long, value_name = "DIR")]
        output: Option<PathBuf>,
    },
    /// Interactively step through a feed's media
    Peek {
        /// Feed source name
        feed: String,
    },
}

/// Rejects a non-positive count before any request is made.
fn validate_count(count: i64) -> Result<usize> {
    if count <= 0 {
        anyhow::bail!("Submissions count must be > 0, given {count}");
    }
    usize::try_from(count).context("Submissions count is too large")
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing for debug logging
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config_path = match args.config {
        Some(path) => path,
        None => get_config_dir()?.join("config.toml"),
    };
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    match args.command {
        Command::Urls {
            feed,
            count,
            output,
        } => {
            let count = validate_count(count)?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{feed}.json")));
            let summary = dump::dump_urls(&config, &feed, count, &output).await?;
            println!(
                "Saved {} submission(s) to {}",
                summary.saved,
                output.display()
            );
        }
        Command::Media {
            feed,
            count,
            output,
        } => {
            let count = validate_count(count)?;
            let output = output.unwrap_or_else(|| PathBuf::from(&feed));
            let summary = dump::download_media(&config, &feed, count, &output).await?;
            println!(
                "Downloaded {} file(s) into {}",
                summary.saved,
                output.display()
            );
        }
        Command::Peek { feed } => {
            peek::run(&config, &feed).await?;
        }
    }

    Ok(())
}
