//! Time-window extraction - the first and last timestamps in a log
//!
//! Application log lines carry an ISO-like timestamp near the start, e.g.
//!
//! ```text
//! [----] I, [2024-03-01T00:00:02.412345 #1234:2ab4]  INFO -- : MIQ(...)
//! ```
//!
//! The window of a bundle is taken from its primary log: the first and
//! last such timestamp found in it.

use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use async_trait::async_trait;
use chrono::{NaiveDateTime, TimeZone, Utc};
use flate2::read::GzDecoder;
use logdepot_core::{LogTime, LogWindow};
use regex::bytes::Regex;
use tracing::{debug, warn};

/// Finds the time window covered by the files matching a pattern
#[async_trait]
pub trait LogDateScanner: Send + Sync {
    /// Unbounded window when no dated evidence is found
    async fn extract_window(&self, pattern: &str) -> LogWindow;
}

/// Scans the primary (`evm*`) log among the matched files
#[derive(Debug, Clone, Default)]
pub struct EvmLogScanner;

impl EvmLogScanner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LogDateScanner for EvmLogScanner {
    async fn extract_window(&self, pattern: &str) -> LogWindow {
        let pattern = pattern.to_string();
        let result = tokio::task::spawn_blocking(move || {
            let Some(path) = primary_log_for(&pattern) else {
                debug!(%pattern, "No log matched pattern, window unknown");
                return LogWindow::default();
            };
            match scan_file(&path) {
                Ok(window) => window,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to scan log for timestamps");
                    LogWindow::default()
                }
            }
        })
        .await;

        result.unwrap_or_else(|e| {
            warn!(error = %e, "Timestamp scan task failed");
            LogWindow::default()
        })
    }
}

/// The file whose name starts with `evm`, else the first match
fn primary_log_for(pattern: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = glob::glob(pattern)
        .ok()?
        .flatten()
        .filter(|p| p.is_file())
        .collect();
    matches.sort();

    let primary = matches.iter().position(|p| {
        p.file_name()
            .map(|n| n.to_string_lossy().starts_with("evm"))
            .unwrap_or(false)
    });
    match primary {
        Some(idx) => Some(matches.swap_remove(idx)),
        None => matches.into_iter().next(),
    }
}

/// Matched on raw bytes: rotated logs may hold lines that are not UTF-8
fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{4}-\d{2}-\d{2}T\d{2}:\d{2}:\d{2}(?:\.\d+)?").expect("valid timestamp regex")
    })
}

/// First and last timestamp in a plain or gzipped log
pub fn scan_file(path: &Path) -> std::io::Result<LogWindow> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if path.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    scan_lines(BufReader::new(reader))
}

/// First and last timestamp in a stream of log lines
pub fn scan_lines(mut reader: impl BufRead) -> std::io::Result<LogWindow> {
    let re = timestamp_regex();
    let mut first: Option<String> = None;
    let mut last: Option<String> = None;
    let mut line = Vec::new();

    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if let Some(m) = re.find(&line) {
            // The match itself is ASCII digits and separators
            let stamp = String::from_utf8_lossy(m.as_bytes()).into_owned();
            if first.is_none() {
                first = Some(stamp.clone());
            }
            last = Some(stamp);
        }
    }

    Ok(LogWindow::new(first.map(parse_log_time), last.map(parse_log_time)))
}

/// Parse a log timestamp as UTC, keeping the raw text when it does not
/// name a real instant (e.g. month 13)
pub fn parse_log_time(raw: String) -> LogTime {
    match NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(naive) => LogTime::Parsed(Utc.from_utc_datetime(&naive)),
        Err(_) => LogTime::Raw(raw),
    }
}
