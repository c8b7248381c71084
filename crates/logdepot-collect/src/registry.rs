//! LogFile registry - decides whether a window needs collecting

use std::sync::Arc;

use logdepot_core::naming::{date_string, logfile_name};
use logdepot_core::{
    display_bound, DepotId, LogFile, LogFileFilter, LogFileState, LogFileStore, LogType,
    LogWindow, ServerIdentity, StoreResult, TaskId,
};
use tracing::{debug, info};

/// Outcome of a registry lookup
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    /// An available record already covers the window; nothing to collect
    Existing(LogFile),
    /// A fresh `collecting` record was created for the window
    Created(LogFile),
}

/// Tracks one record per collected bundle
pub struct LogFileRegistry {
    log_files: Arc<dyn LogFileStore>,
    region: String,
}

impl LogFileRegistry {
    pub fn new(log_files: Arc<dyn LogFileStore>, region: impl Into<String>) -> Self {
        Self {
            log_files,
            region: region.into(),
        }
    }

    /// Derived name of the bundle covering `window`
    pub fn name_for(&self, server: &ServerIdentity, log_type: LogType, window: &LogWindow) -> String {
        logfile_name(server, &self.region, log_type, date_string(window).as_deref())
    }

    /// `{historical, name, state=available}`, plus the window bounds that
    /// are known
    pub fn dedup_filter(
        &self,
        server: &ServerIdentity,
        log_type: LogType,
        window: &LogWindow,
        historical: bool,
    ) -> LogFileFilter {
        LogFileFilter {
            resource_id: Some(server.id),
            historical: Some(historical),
            name: Some(self.name_for(server, log_type, window)),
            state: Some(LogFileState::Available),
            logging_started_on: window.started_on(),
            logging_ended_on: window.ended_on(),
            created_after: None,
        }
    }

    /// Find the available record for this window, or create a new one
    /// bound to `depot_id` and `task_id`.
    ///
    /// A matching record is reused whether or not it has an upload URI.
    pub async fn find_or_create(
        &self,
        server: &ServerIdentity,
        log_type: LogType,
        window: &LogWindow,
        historical: bool,
        depot_id: DepotId,
        task_id: TaskId,
    ) -> StoreResult<Lookup> {
        let filter = self.dedup_filter(server, log_type, window, historical);

        if let Some(existing) = self.log_files.find_first(&filter).await? {
            info!(
                task_id,
                log_file_id = existing.id,
                has_uri = existing.log_uri.is_some(),
                "Task: [{}] {} logfile already exists with id: [{}] for [{}] with contents from: [{}] to: [{}]",
                task_id,
                log_type,
                existing.id,
                server.who_am_i(),
                display_bound(&window.start),
                display_bound(&window.end),
            );
            return Ok(Lookup::Existing(existing));
        }

        let mut log_file = if historical {
            LogFile::historical()
        } else {
            LogFile::current()
        };
        log_file.name = filter.name.unwrap_or_default();
        log_file.resource_id = Some(server.id);
        log_file.depot_id = Some(depot_id);
        log_file.task_id = Some(task_id);
        let log_file = self.log_files.insert(log_file).await?;

        debug!(
            task_id,
            log_file_id = log_file.id,
            server = %server.who_am_i(),
            name = %log_file.name,
            "No archived {} logfile for window, collecting",
            log_type.as_lowercase()
        );
        Ok(Lookup::Created(log_file))
    }
}
