//! Collection orchestrator
//!
//! A `LogCollector` belongs to one server and drives every log collection
//! run for it:
//!
//! ```text
//! request_log_collection ──put_unless_exists──▶ WorkQueue ──▶ QueueWorker
//!                                                                │
//!                                              run_collection ◀──┘
//!                                                   │
//!            resolve depot ─▶ historical windows ─▶ current logs ─▶ Finished/Ok
//!                                   │                    │
//!                                   └──── collect_and_upload (zip, upload)
//! ```
//!
//! A run never finalizes its task on failure; it returns the error and the
//! worker writes the terminal task status.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use logdepot_core::naming::{base_zip_log_name, date_string};
use logdepot_core::{
    display_bound, CollectionOptions, Depot, DepotContext, DepotId, DepotStore, DispatchKind,
    LogFile, LogFileFilter, LogFileState, LogFileStore, LogType, LogWindow, MessageCallback,
    MessageTemplate, QueueKey, ServerIdentity, Task, TaskId, TaskState, TaskStatus,
    TaskStore, HIGH_PRIORITY, INCOMPLETE_AT_STARTUP_MESSAGE, LOG_RETRIEVAL_TASK_PREFIX,
};
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::archive::{Archiver, ZipArchiver};
use crate::config::CollectionConfig;
use crate::depot::{DepotTransport, FileSystemDepot};
use crate::error::{CollectError, CollectResult, StepError};
use crate::patterns::PatternResolver;
use crate::queue::{DispatchOutcome, WorkQueue};
use crate::registry::{LogFileRegistry, Lookup};
use crate::window::{EvmLogScanner, LogDateScanner};

/// Pattern of the live logs, relative to the application root
pub const CURRENT_LOG_PATTERN: &str = "log/*.log";

/// How far back `log_collection_active_recently` looks by default
const RECENT_ACTIVITY_MINUTES: i64 = 15;

/// Record stores a collector reads and writes
#[derive(Clone)]
pub struct Stores {
    pub log_files: Arc<dyn LogFileStore>,
    pub tasks: Arc<dyn TaskStore>,
    pub depots: Arc<dyn DepotStore>,
}

/// An operator's request for a log collection
#[derive(Debug, Clone, Default)]
pub struct LogRequest {
    pub context: DepotContext,
    pub only_current: bool,
    pub support_case: Option<String>,
}

/// What the startup sweep cleaned up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupSummary {
    pub log_files_removed: usize,
    pub tasks_finalized: usize,
}

/// Drives log collection for one server
pub struct LogCollector {
    server: ServerIdentity,
    config: CollectionConfig,
    resolver: PatternResolver,
    registry: LogFileRegistry,
    scanner: Arc<dyn LogDateScanner>,
    archiver: Arc<dyn Archiver>,
    transport: Arc<dyn DepotTransport>,
    stores: Stores,
    queue: Arc<WorkQueue>,
}

impl LogCollector {
    /// Collector with the default scanner, zip archiver and filesystem depot
    pub fn new(
        server: ServerIdentity,
        config: CollectionConfig,
        stores: Stores,
        queue: Arc<WorkQueue>,
    ) -> Self {
        Self {
            resolver: PatternResolver::new(config.clone()),
            registry: LogFileRegistry::new(stores.log_files.clone(), config.region.clone()),
            scanner: Arc::new(EvmLogScanner::new()),
            archiver: Arc::new(ZipArchiver::new(config.root_dir.clone())),
            transport: Arc::new(FileSystemDepot::new()),
            server,
            config,
            stores,
            queue,
        }
    }

    pub fn with_resolver(mut self, resolver: PatternResolver) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_scanner(mut self, scanner: Arc<dyn LogDateScanner>) -> Self {
        self.scanner = scanner;
        self
    }

    pub fn with_archiver(mut self, archiver: Arc<dyn Archiver>) -> Self {
        self.archiver = archiver;
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn DepotTransport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn server(&self) -> &ServerIdentity {
        &self.server
    }

    pub fn tasks(&self) -> &Arc<dyn TaskStore> {
        &self.stores.tasks
    }

    // =========================================================================
    // Single-flight dispatch
    // =========================================================================

    fn queue_key(&self, kind: DispatchKind) -> QueueKey {
        QueueKey {
            class_name: self.server.class_name().to_string(),
            instance_id: self.server.id,
            method_name: kind.method_name().to_string(),
            server_guid: self.server.guid,
            zone: kind.zone_scoped().then(|| self.server.zone.name.clone()),
        }
    }

    /// Create a retrieval task and queue a collection run for it, unless a
    /// run for this server is already in flight.
    ///
    /// A skipped request still returns its task, finalized as an error so
    /// that nobody polls it forever.
    pub async fn request_log_collection(
        &self,
        request: LogRequest,
    ) -> CollectResult<(TaskId, DispatchOutcome)> {
        let task = Task::new(
            format!("{}[{}]", LOG_RETRIEVAL_TASK_PREFIX, self.server.who_am_i()),
            Some(self.server.id),
        );
        let task = self.stores.tasks.insert(task).await?;

        let options = CollectionOptions {
            task_id: task.id,
            context: request.context,
            only_current: request.only_current,
            support_case: request.support_case,
        };
        let template = MessageTemplate {
            priority: HIGH_PRIORITY,
            callback: Some(MessageCallback::TaskStatus { task_id: task.id }),
            timeout: Some(self.config.timeout()),
            args: serde_json::to_value(&options)?,
        };

        let outcome = self
            .queue
            .put_unless_exists(self.queue_key(DispatchKind::PostLogs), template);
        if let DispatchOutcome::Skipped(_) = outcome {
            info!(
                "Previous adhoc log collection is still running, skipping...Resource: [{}], id: [{}]",
                self.server.class_name(),
                self.server.id
            );
            self.stores
                .tasks
                .update_status(
                    task.id,
                    TaskState::Finished,
                    TaskStatus::Error,
                    "Previous adhoc log collection is still running",
                )
                .await?;
        }
        Ok((task.id, outcome))
    }

    /// Queue the startup sweep unless one is already in flight
    pub fn queue_startup_cleanup(&self) -> DispatchOutcome {
        let template = MessageTemplate {
            priority: HIGH_PRIORITY,
            ..Default::default()
        };
        let outcome = self
            .queue
            .put_unless_exists(self.queue_key(DispatchKind::StartupCleanup), template);
        if let DispatchOutcome::Skipped(_) = outcome {
            info!("Previous cleanup is still running, skipping...");
        }
        outcome
    }

    // =========================================================================
    // Collection run
    // =========================================================================

    pub async fn run_collection(&self, options: &CollectionOptions) -> CollectResult<()> {
        self.run_collection_until(options, None).await
    }

    /// One collection run. Zip/upload work still in progress at `deadline`
    /// is abandoned and reported as a timeout.
    pub async fn run_collection_until(
        &self,
        options: &CollectionOptions,
        deadline: Option<Instant>,
    ) -> CollectResult<()> {
        let task = self.load_task(options.task_id).await?;

        // Resolve the depot before any record is created; a missing depot
        // fails the run with nothing collected
        let depot = self.resolve_depot(options.context).await?;
        let depot = self
            .stores
            .depots
            .set_support_case(depot.id, options.support_case())
            .await?;

        // Rotated days first, each uploaded at most once
        if !options.only_current {
            self.post_historical_logs(task.id, &depot, deadline).await?;
        }
        // Live logs replace the previous current bundle
        self.post_current_logs(task.id, &depot, deadline).await?;

        // Failures above return early; the worker finalizes the task then
        self.stores
            .tasks
            .update_status(
                task.id,
                TaskState::Finished,
                TaskStatus::Ok,
                "Log files were successfully collected",
            )
            .await?;
        info!(task_id = task.id, depot = %depot.name, "Log collection finished");
        Ok(())
    }

    async fn load_task(&self, task_id: TaskId) -> CollectResult<Task> {
        self.stores.tasks.get(task_id).await.map_err(|e| {
            if e.is_not_found() {
                CollectError::not_found(format!("Task [{}]", task_id))
            } else {
                e.into()
            }
        })
    }

    fn depot_id_for(&self, context: DepotContext) -> Option<DepotId> {
        match context {
            DepotContext::Zone => self.server.zone.log_depot_id,
            DepotContext::Server => self.server.log_depot_id,
        }
    }

    async fn resolve_depot(&self, context: DepotContext) -> CollectResult<Depot> {
        let not_configured =
            || CollectError::Configuration("Log depot settings not configured".to_string());
        let depot_id = self.depot_id_for(context).ok_or_else(not_configured)?;
        self.stores
            .depots
            .find(depot_id)
            .await?
            .ok_or_else(not_configured)
    }

    /// Collect each rotated day that has no available record yet
    async fn post_historical_logs(
        &self,
        task_id: TaskId,
        depot: &Depot,
        deadline: Option<Instant>,
    ) -> CollectResult<()> {
        for pattern in self.resolver.historical_patterns() {
            let window = self.scanner.extract_window(&pattern).await;
            let lookup = self
                .registry
                .find_or_create(&self.server, LogType::Archive, &window, true, depot.id, task_id)
                .await?;
            if let Lookup::Created(log_file) = lookup {
                self.collect_and_upload(&pattern, log_file, LogType::Archive, depot, deadline)
                    .await?;
            }
        }
        Ok(())
    }

    /// Replace the previous current bundle with a fresh one
    async fn post_current_logs(
        &self,
        task_id: TaskId,
        depot: &Depot,
        deadline: Option<Instant>,
    ) -> CollectResult<()> {
        self.delete_old_requested_logs().await?;

        let mut log_file = LogFile::current();
        log_file.resource_id = Some(self.server.id);
        log_file.depot_id = Some(depot.id);
        log_file.task_id = Some(task_id);
        let log_file = self.stores.log_files.insert(log_file).await?;

        let pattern = self.resolver.absolutize(CURRENT_LOG_PATTERN);
        self.collect_and_upload(&pattern, log_file, LogType::Current, depot, deadline)
            .await?;
        Ok(())
    }

    /// Drop every non-historical record of this server
    pub async fn delete_old_requested_logs(&self) -> CollectResult<usize> {
        let filter = LogFileFilter {
            historical: Some(false),
            ..LogFileFilter::for_resource(self.server.id)
        };
        Ok(self.stores.log_files.delete_where(&filter).await?)
    }

    // =========================================================================
    // Zip / upload step
    // =========================================================================

    /// Zip the files of one pattern and upload them.
    ///
    /// `log_file` is already stored as `collecting`. On any failure it is
    /// marked `error` before the error is returned. The task stays `Active`
    /// on success.
    pub async fn collect_and_upload(
        &self,
        pattern: &str,
        mut log_file: LogFile,
        log_type: LogType,
        depot: &Depot,
        deadline: Option<Instant>,
    ) -> CollectResult<LogFile> {
        let Some(task_id) = log_file.task_id else {
            self.mark_errored(&mut log_file).await;
            return Err(CollectError::not_found(format!("Task for LogFile [{}]", log_file.id)));
        };
        let who = self.server.who_am_i();

        let window = self.scanner.extract_window(pattern).await;
        let msg = format!(
            "Zipping and posting {} logs for [{}] from: [{}] to [{}]",
            log_type.as_lowercase(),
            who,
            display_bound(&window.start),
            display_bound(&window.end),
        );
        info!("Task: [{}] {}", task_id, msg);
        if let Err(e) = self
            .stores
            .tasks
            .update_status(task_id, TaskState::Active, TaskStatus::Ok, &msg)
            .await
        {
            self.mark_errored(&mut log_file).await;
            return Err(e.into());
        }

        let step = self.post_archive(pattern, &mut log_file, log_type, &window, depot);
        let posted = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, step)
                .await
                .unwrap_or(Err(StepError::Timeout)),
            None => step.await,
        };

        if let Err(source) = posted {
            error!(
                task_id,
                log_file_id = log_file.id,
                error_class = source.class_name(),
                "Task: [{}] Posting of {} logs failed for {} due to error: [{}] [{}]",
                task_id,
                log_type.as_lowercase(),
                who,
                source.class_name(),
                source
            );
            self.mark_errored(&mut log_file).await;
            return Err(CollectError::Collection {
                pattern: pattern.to_string(),
                log_type,
                source,
            });
        }

        let msg = format!("{} log files from {} are posted", log_type, who);
        info!("Task: [{}] {}", task_id, msg);
        self.stores
            .tasks
            .update_status(task_id, TaskState::Active, TaskStatus::Ok, &msg)
            .await?;
        Ok(log_file)
    }

    /// Update failures are logged, not returned
    async fn mark_errored(&self, log_file: &mut LogFile) {
        log_file.state = LogFileState::Error;
        if let Err(e) = self.stores.log_files.update(log_file).await {
            warn!(log_file_id = log_file.id, error = %e, "Failed to mark log file as errored");
        }
    }

    async fn post_archive(
        &self,
        pattern: &str,
        log_file: &mut LogFile,
        log_type: LogType,
        window: &LogWindow,
        depot: &Depot,
    ) -> Result<(), StepError> {
        let file_name = format!("{}.zip", base_zip_log_name(&self.server.guid, Utc::now()));
        let archive = self.archive_path(log_file.id, &file_name);
        let patterns = self.resolver.resolve(log_type, Some(pattern));
        self.archiver.zip_logs(&archive, &patterns).await?;

        let date = date_string(window);
        log_file.local_file = Some(archive.clone());
        log_file.logging_started_on = window.started_on();
        log_file.logging_ended_on = window.ended_on();
        log_file.name = self.registry.name_for(&self.server, log_type, window);
        log_file.description = Some(
            format!(
                "Logs for Zone {} Server {} {}",
                self.server.zone.name,
                self.server.name,
                date.unwrap_or_default()
            )
            .trim_end()
            .to_string(),
        );
        let updated = self.stores.log_files.update(log_file).await?;
        *log_file = updated;

        let relative_path = format!(
            "{}/{}_{}/{}/{}",
            self.server.zone.name, self.server.name, self.server.id, log_file.id, file_name
        );
        let uri = self.transport.upload(depot, &archive, &relative_path).await?;

        log_file.log_uri = Some(uri);
        log_file.state = LogFileState::Available;
        let updated = self.stores.log_files.update(log_file).await?;
        *log_file = updated;
        Ok(())
    }

    fn archive_path(&self, log_file_id: u64, file_name: &str) -> PathBuf {
        self.config
            .absolute(&self.config.work_dir)
            .join(log_file_id.to_string())
            .join(file_name)
    }

    // =========================================================================
    // Startup cleanup
    // =========================================================================

    /// Sweep collections interrupted by a restart: every `collecting` log
    /// file is removed and its task failed, then every unfinished retrieval
    /// task of this server is failed too (tasks exist before their log
    /// files, so some have none).
    pub async fn delete_active_log_collections(&self) -> CollectResult<CleanupSummary> {
        self.delete_active_log_collections_before(Utc::now()).await
    }

    /// Same sweep, limited to records created at or before `cutoff`.
    /// Requests made after the sweep was queued are left running.
    pub async fn delete_active_log_collections_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> CollectResult<CleanupSummary> {
        let mut summary = CleanupSummary::default();

        let collecting = LogFileFilter {
            state: Some(LogFileState::Collecting),
            ..LogFileFilter::for_resource(self.server.id)
        };
        for log_file in self.stores.log_files.list(&collecting).await? {
            if log_file.created_on > cutoff {
                continue;
            }
            info!(
                log_file_id = log_file.id,
                "Deleting {}",
                log_file.description.as_deref().unwrap_or(&log_file.name)
            );
            if let Some(task_id) = log_file.task_id {
                if self.fail_incomplete_task(task_id).await? {
                    summary.tasks_finalized += 1;
                }
            }
            self.stores.log_files.delete(log_file.id).await?;
            summary.log_files_removed += 1;
        }

        for task in self.stores.tasks.list_for_server(self.server.id).await? {
            if task.is_log_retrieval()
                && !task.is_finished()
                && task.created_on <= cutoff
                && self.fail_incomplete_task(task.id).await?
            {
                summary.tasks_finalized += 1;
            }
        }

        info!(
            log_files_removed = summary.log_files_removed,
            tasks_finalized = summary.tasks_finalized,
            "Startup log collection cleanup complete"
        );
        Ok(summary)
    }

    /// Returns false when the task is already gone
    async fn fail_incomplete_task(&self, task_id: TaskId) -> CollectResult<bool> {
        match self
            .stores
            .tasks
            .update_status(
                task_id,
                TaskState::Finished,
                TaskStatus::Error,
                INCOMPLETE_AT_STARTUP_MESSAGE,
            )
            .await
        {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Status
    // =========================================================================

    /// When any log file of this server last changed
    pub async fn last_log_sync_on(&self) -> CollectResult<Option<DateTime<Utc>>> {
        Ok(self
            .stores
            .log_files
            .max_updated_on(&LogFileFilter::for_resource(self.server.id))
            .await?)
    }

    /// Task message of the most recently updated log file
    pub async fn last_log_sync_message(&self) -> CollectResult<Option<String>> {
        let latest = self
            .stores
            .log_files
            .list(&LogFileFilter::for_resource(self.server.id))
            .await?
            .into_iter()
            .max_by_key(|lf| (lf.updated_on, lf.id));

        let Some(task_id) = latest.and_then(|lf| lf.task_id) else {
            return Ok(None);
        };
        match self.stores.tasks.get(task_id).await {
            Ok(task) => Ok(Some(task.message)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Whether a collection is running for this server
    pub async fn log_collection_active(&self) -> CollectResult<bool> {
        self.collection_activity(None).await
    }

    /// Whether a collection run is waiting in or being delivered from the queue
    pub fn collection_queued(&self) -> bool {
        self.queue
            .find_in_flight(&self.queue_key(DispatchKind::PostLogs))
            .is_some()
    }

    /// Whether a collection started within `since` (default: the last 15
    /// minutes) is still running
    pub async fn log_collection_active_recently(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> CollectResult<bool> {
        let since = since
            .unwrap_or_else(|| Utc::now() - ChronoDuration::minutes(RECENT_ACTIVITY_MINUTES));
        self.collection_activity(Some(since)).await
    }

    async fn collection_activity(&self, since: Option<DateTime<Utc>>) -> CollectResult<bool> {
        let collecting = LogFileFilter {
            state: Some(LogFileState::Collecting),
            created_after: since,
            ..LogFileFilter::for_resource(self.server.id)
        };
        if self.stores.log_files.find_first(&collecting).await?.is_some() {
            return Ok(true);
        }

        let tasks = self.stores.tasks.list_for_server(self.server.id).await?;
        Ok(tasks.iter().any(|t| {
            t.is_log_retrieval() && !t.is_finished() && since.map_or(true, |s| t.created_on > s)
        }))
    }
}
