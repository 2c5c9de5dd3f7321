//! Batch commands: dump resolved submission URLs or download media files.
//!
//! Both walk the feed with a [`FeedIterator`] whose circuit breaker is fed
//! the run's remaining unresolved budget, `2 × count` in total.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use quickpeek::http::FetchedPage;
use quickpeek::pipeline::ResolvedSubmission;
use quickpeek::{Config, EndOfFeed, FeedIterator, SubmissionRecord};

/// Suffix inserted before the extension when a file name is taken.
const COPY_SUFFIX: &str = "_copy";

/// Outcome of a batch run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub saved: usize,
    pub unresolved: u64,
    pub download_fails: usize,
}

/// Prints an error and every cause beneath it, one per line.
pub fn print_causes(error: &dyn std::error::Error) {
    println!("Error: {error}");
    let mut cause = error.source();
    while let Some(inner) = cause {
        println!("^ {inner}");
        cause = inner.source();
    }
}

/// Pulls the next resolved submission, keeping the breaker within the
/// run-wide unresolved budget. `None` ends the run.
async fn next_within_budget(
    iterator: &mut FeedIterator,
    max_unresolved: u64,
) -> Option<ResolvedSubmission> {
    let spent = iterator.stats().unresolved;
    let left = max_unresolved.saturating_sub(spent).max(1);
    iterator.set_unresolved_ceiling(usize::try_from(left).unwrap_or(usize::MAX));

    match iterator.next_resolved().await {
        Ok(resolved) => Some(resolved),
        Err(EndOfFeed::TooManyUnresolved { .. }) => {
            println!("Break: too many unresolved submissions");
            None
        }
        Err(end) => {
            print_causes(&end);
            None
        }
    }
}

/// Collects `count` resolved submissions and writes them as a JSON array.
pub async fn dump_urls(
    config: &Config,
    feed: &str,
    count: usize,
    output: &Path,
) -> Result<Summary> {
    let mut iterator =
        FeedIterator::from_config(config, feed).context("Failed to set up HTTP session")?;
    let max_unresolved = 2 * count as u64;
    let mut records: Vec<SubmissionRecord> = Vec::with_capacity(count);

    while records.len() < count {
        println!(
            "To go: {} Unresolved: {}",
            count - records.len(),
            iterator.stats().unresolved
        );
        match next_within_budget(&mut iterator, max_unresolved).await {
            Some(resolved) => records.push(resolved.record),
            None => break,
        }
    }

    let json = serde_json::to_string_pretty(&records).context("Failed to serialize submissions")?;
    write_atomic(output, json.as_bytes())
        .with_context(|| format!("Failed to write {}", output.display()))?;

    Ok(Summary {
        saved: records.len(),
        unresolved: iterator.stats().unresolved,
        download_fails: 0,
    })
}

/// Downloads `count` media files into `dir`.
///
/// If the main URL fails and the submission has an extra URL, the extra is
/// tried instead. The run stops after `max(count / 2, 1)` failed downloads.
pub async fn download_media(
    config: &Config,
    feed: &str,
    count: usize,
    dir: &Path,
) -> Result<Summary> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory {}", dir.display()))?;

    let mut iterator =
        FeedIterator::from_config(config, feed).context("Failed to set up HTTP session")?;
    let max_unresolved = 2 * count as u64;
    let max_fails = (count / 2).max(1);
    let mut summary = Summary::default();

    while summary.saved < count {
        println!(
            "To go: {} Unresolved: {} Download fails: {}",
            count - summary.saved,
            iterator.stats().unresolved,
            summary.download_fails
        );
        let Some(resolved) = next_within_budget(&mut iterator, max_unresolved).await else {
            break;
        };

        println!("Try download {}", resolved.record.url);
        match fetch_with_fallback(&mut iterator, &resolved.record).await {
            Some(page) => match save_media(dir, &page) {
                Ok(path) => {
                    println!("->Downloaded {}", path.display());
                    summary.saved += 1;
                    continue;
                }
                Err(e) => println!("Failed to save {}: {e:#}", page.url),
            },
            None => println!("->Failed to download"),
        }

        summary.download_fails += 1;
        if summary.download_fails >= max_fails {
            println!("Too many failed downloads");
            break;
        }
    }

    summary.unresolved = iterator.stats().unresolved;
    Ok(summary)
}

/// Downloads the submission's own URL (an album archive, a video, an image),
/// falling back to its extra URL.
async fn fetch_with_fallback(
    iterator: &mut FeedIterator,
    record: &SubmissionRecord,
) -> Option<FetchedPage> {
    let referer = record.referer.as_deref();
    match iterator.download(&record.url, referer).await {
        Ok(page) => return Some(page),
        Err(e) => println!("Fail: {e}"),
    }

    let extra = record.extra_url.as_deref().filter(|extra| *extra != record.url)?;
    println!("Try download extra {extra}");
    match iterator.download(extra, referer).await {
        Ok(page) => Some(page),
        Err(e) => {
            println!("Extra fail: {e}");
            None
        }
    }
}

/// Where a downloaded body is saved: the response URL's basename, with
/// [`COPY_SUFFIX`] before the extension if that name is taken.
fn target_path(dir: &Path, url: &url::Url) -> PathBuf {
    let basename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|name| !name.is_empty())
        .unwrap_or("media");
    let path = dir.join(basename);
    if !path.exists() {
        return path;
    }

    let name = match basename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}{COPY_SUFFIX}.{ext}"),
        _ => format!("{basename}{COPY_SUFFIX}"),
    };
    dir.join(name)
}

fn save_media(dir: &Path, page: &FetchedPage) -> Result<PathBuf> {
    let path = target_path(dir, &page.url);
    write_atomic(&path, &page.body)?;
    Ok(path)
}

/// Write-to-temp-then-rename so a destination is never left partial.
fn write_atomic(dst: &Path, content: &[u8]) -> Result<()> {
    use std::time::{SystemTime, UNIX_EPOCH};
    let random_suffix = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    let file_name = dst
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp_path = dst.with_file_name(format!(".{file_name}.tmp.{random_suffix:016x}"));

    let mut temp_file = std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .with_context(|| format!("Failed to create temporary file '{}'", temp_path.display()))?;

    temp_file.write_all(content).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to write '{}': disk may be full", temp_path.display())
    })?;
    temp_file.sync_all().with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!("Failed to sync '{}' to disk", temp_path.display())
    })?;
    drop(temp_file);

    std::fs::rename(&temp_path, dst).with_context(|| {
        let _ = std::fs::remove_file(&temp_path);
        format!(
            "Failed to rename '{}' to '{}'",
            temp_path.display(),
            dst.display()
        )
    })?;
    Ok(())
}
