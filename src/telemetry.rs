use std::cmp::Reverse;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt};

use crate::config::TraceSettings;

const TRACE_SUFFIX: &str = ".trace.jsonl";

static TRACE_GUARD: OnceCell<WorkerGuard> = OnceCell::new();
static ACTIVE_TRACE_FILE: OnceCell<PathBuf> = OnceCell::new();
static TRACING_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Snapshot of trace export state for diagnostics.
#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub enabled: bool,
    pub directory: Option<PathBuf>,
    pub active_file: Option<PathBuf>,
    pub recent_files: Vec<PathBuf>,
}

/// Install the global subscriber: human output on stderr plus an optional JSON-L file.
///
/// Calling this more than once is a no-op.
pub fn init_tracing(service: &str, verbose: bool, traces: &TraceSettings) -> Result<()> {
    if TRACING_INITIALIZED.get().is_some() {
        return Ok(());
    }
    let default_level = if verbose {
        "launchgate=debug"
    } else {
        "launchgate=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = if traces.enabled {
        let directory = traces.resolve_directory()?;
        fs::create_dir_all(&directory).with_context(|| {
            format!("Failed to create trace directory {}", directory.display())
        })?;
        let (file, path) = create_trace_file(service, &directory)?;
        prune_old_traces(&directory, traces.max_files, &path)?;
        let (writer, guard) = tracing_appender::non_blocking(file);
        let _ = TRACE_GUARD.set(guard);
        let _ = ACTIVE_TRACE_FILE.set(path);
        Some(
            fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true)
                .with_target(true)
                .with_writer(writer)
                .with_filter(LevelFilter::DEBUG),
        )
    } else {
        None
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(file_layer);
    subscriber::set_global_default(registry).context("Failed to install tracing subscriber")?;
    let _ = TRACING_INITIALIZED.set(());
    Ok(())
}

pub fn trace_report(settings: &TraceSettings) -> Result<TraceReport> {
    let directory = if settings.enabled {
        Some(settings.resolve_directory()?)
    } else {
        settings.resolve_directory().ok()
    };
    let recent_files = match directory.as_deref() {
        Some(dir) => collect_recent_trace_files(dir, settings.max_files.saturating_add(2))?,
        None => Vec::new(),
    };
    Ok(TraceReport {
        enabled: settings.enabled,
        directory,
        active_file: ACTIVE_TRACE_FILE.get().cloned(),
        recent_files,
    })
}

fn create_trace_file(service: &str, directory: &Path) -> Result<(fs::File, PathBuf)> {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let mut candidate = directory.join(format!("{service}-{timestamp}{TRACE_SUFFIX}"));
    let mut counter = 0;
    while candidate.exists() {
        counter += 1;
        candidate = directory.join(format!("{service}-{timestamp}-{counter}{TRACE_SUFFIX}"));
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&candidate)
        .with_context(|| format!("Failed to open trace file {}", candidate.display()))?;
    Ok((file, candidate))
}

/// Trace files in `directory`, newest first.
fn trace_files(directory: &Path) -> Result<Vec<PathBuf>> {
    if !directory.exists() {
        return Ok(Vec::new());
    }
    let mut entries: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(directory)
        .with_context(|| format!("Failed to read trace directory {}", directory.display()))?
    {
        let entry = entry?;
        let path = entry.path();
        let is_trace = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(TRACE_SUFFIX));
        if !is_trace || !path.is_file() {
            continue;
        }
        let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
            continue;
        };
        entries.push((modified, path));
    }
    entries.sort_by_key(|(modified, _)| Reverse(*modified));
    Ok(entries.into_iter().map(|(_, path)| path).collect())
}

/// Keep at most `max_files` traces including `keep`; zero disables pruning.
fn prune_old_traces(directory: &Path, max_files: usize, keep: &Path) -> Result<()> {
    if max_files == 0 {
        return Ok(());
    }
    let retain = max_files.saturating_sub(1);
    for path in trace_files(directory)?
        .into_iter()
        .filter(|path| path != keep)
        .skip(retain)
    {
        let _ = fs::remove_file(&path);
    }
    Ok(())
}

fn collect_recent_trace_files(directory: &Path, limit: usize) -> Result<Vec<PathBuf>> {
    let mut files = trace_files(directory)?;
    files.truncate(limit);
    Ok(files)
}
