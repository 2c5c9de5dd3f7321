//! Interactive line-oriented viewer over a [`PrefetchHandle`].
//!
//! Commands, one per line: empty or `n` for the next record, `r <feed>` to
//! switch feeds, `q` to quit.

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use quickpeek::{Config, FeedIterator, MediaRecord, PrefetchHandle, PrefetchQueue};

#[derive(Debug, PartialEq, Eq)]
enum PeekCommand {
    Next,
    Reset(String),
    Quit,
    Unknown(String),
}

fn parse_command(line: &str) -> PeekCommand {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some(("r", feed)) if !feed.trim().is_empty() => PeekCommand::Reset(feed.trim().to_string()),
        _ => match line {
            "" | "n" => PeekCommand::Next,
            "q" => PeekCommand::Quit,
            other => PeekCommand::Unknown(other.to_string()),
        },
    }
}

fn describe(record: &MediaRecord) -> String {
    match record {
        MediaRecord::Image { url, data } => format!("[image] {url} ({} bytes)", data.len()),
        MediaRecord::Video { url, preview } => {
            format!("[video] {url} (preview {} bytes)", preview.len())
        }
        MediaRecord::Exhausted => "No media available".to_string(),
    }
}

async fn show_next(handle: &mut PrefetchHandle) -> bool {
    match handle.recv().await {
        Some(record) => {
            println!("{}", describe(&record));
            true
        }
        None => false,
    }
}

pub async fn run(config: &Config, feed: &str) -> Result<()> {
    let iterator =
        FeedIterator::from_config(config, feed).context("Failed to set up HTTP session")?;
    let mut handle = PrefetchQueue::spawn(iterator, config.cache_capacity);

    println!("Peeking at {feed}. Enter: next, r <feed>: switch, q: quit");
    handle.request_next();
    if !show_next(&mut handle).await {
        anyhow::bail!("Prefetch worker stopped unexpectedly");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        match parse_command(&line) {
            PeekCommand::Next => handle.request_next(),
            PeekCommand::Reset(feed) => {
                println!("Switching to {feed}");
                handle.reset(feed);
            }
            PeekCommand::Quit => break,
            PeekCommand::Unknown(input) => {
                println!("Unknown command: {input}");
                continue;
            }
        }
        if !show_next(&mut handle).await {
            break;
        }
    }

    handle.stop().await;
    Ok(())
}
