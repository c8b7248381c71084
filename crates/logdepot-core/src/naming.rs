//! Naming rules for log bundles and archives.
//!
//! Log file names double as the dedup key for historical windows, and
//! archive names are what operators find in the depot. Both formats are
//! compared against records written by earlier releases, so they must not
//! drift.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{LogTime, LogType, LogWindow, ServerIdentity};

/// Format one window bound as `YYYYMMDD_HHMMSS`, or `unknown` when the
/// bound was found but did not parse.
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use logdepot_core::{naming::format_log_time, LogTime};
/// let t = Utc.with_ymd_and_hms(2024, 3, 1, 4, 5, 6).unwrap();
/// assert_eq!(format_log_time(&LogTime::Parsed(t)), "20240301_040506");
/// assert_eq!(format_log_time(&LogTime::Raw("garbage".into())), "unknown");
/// ```
pub fn format_log_time(time: &LogTime) -> String {
    match time {
        LogTime::Parsed(t) => t.format("%Y%m%d_%H%M%S").to_string(),
        LogTime::Raw(_) => "unknown".to_string(),
    }
}

/// `"<start>_<end>"` for a window, `None` when both bounds are absent.
///
/// A single missing bound renders as an empty segment.
pub fn date_string(window: &LogWindow) -> Option<String> {
    if window.is_unbounded() {
        return None;
    }
    let fmt = |bound: &Option<LogTime>| bound.as_ref().map(format_log_time).unwrap_or_default();
    Some(format!("{}_{}", fmt(&window.start), fmt(&window.end)))
}

/// Name of a log bundle:
/// `<Type> region <region> <zone> <server name> <server id>[ <date_string>]`
pub fn logfile_name(
    server: &ServerIdentity,
    region: &str,
    log_type: LogType,
    date_string: Option<&str>,
) -> String {
    let mut parts = vec![
        log_type.to_string(),
        "region".to_string(),
        region.to_string(),
        server.zone.name.clone(),
        server.name.clone(),
        server.id.to_string(),
    ];
    if let Some(date) = date_string {
        parts.push(date.to_string());
    }
    parts.join(" ")
}

/// Base name of an archive: `App-<guid>-<YYYY-MM-DDTHH_MM_SSZ>`
///
/// ```
/// # use chrono::{TimeZone, Utc};
/// # use logdepot_core::naming::base_zip_log_name;
/// let t = Utc.with_ymd_and_hms(2024, 3, 1, 4, 5, 6).unwrap();
/// let name = base_zip_log_name(&uuid::Uuid::nil(), t);
/// assert_eq!(name, "App-00000000-0000-0000-0000-000000000000-2024-03-01T04_05_06Z");
/// ```
pub fn base_zip_log_name(guid: &Uuid, at: DateTime<Utc>) -> String {
    format!("App-{}-{}", guid, at.format("%FT%H_%M_%SZ"))
}
