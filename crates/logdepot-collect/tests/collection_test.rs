//! End-to-end collection runs against a temporary log tree and a
//! filesystem depot

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use logdepot_collect::{
    ArchiveSummary, Archiver, CollectError, CollectionConfig, DataDirLocator, DepotTransport,
    run_scheduled_requests, LogCollector, LogRequest, MemoryDepotStore, MemoryLogFileStore,
    MemoryTaskStore, PatternResolver, QueueWorker, StepError, Stores, WorkQueue,
};
use logdepot_core::{
    CollectionOptions, Depot, DepotContext, LogFile, LogFileState, LogFileStore, LogType,
    MessageState, ServerIdentity, Task, TaskState, TaskStatus, TaskStore, Zone,
    INCOMPLETE_AT_STARTUP_MESSAGE,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use uuid::Uuid;

const SERVER_DEPOT: u64 = 1;
const ZONE_DEPOT: u64 = 2;

struct NoDataDir;

impl DataDirLocator for NoDataDir {
    fn data_directory(&self) -> Option<PathBuf> {
        None
    }
}

struct FailingTransport;

#[async_trait]
impl DepotTransport for FailingTransport {
    async fn upload(&self, _: &Depot, _: &Path, _: &str) -> Result<String, StepError> {
        Err(StepError::Upload("depot unreachable".to_string()))
    }
}

/// Never finishes within a test's lifetime
struct StalledArchiver;

#[async_trait]
impl Archiver for StalledArchiver {
    async fn zip_logs(&self, _: &Path, _: &[String]) -> Result<ArchiveSummary, StepError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Err(StepError::Archive("unreachable".to_string()))
    }
}

struct Harness {
    dir: TempDir,
    log_files: Arc<MemoryLogFileStore>,
    tasks: Arc<MemoryTaskStore>,
    depots: Arc<MemoryDepotStore>,
    queue: Arc<WorkQueue>,
    config: CollectionConfig,
    server: ServerIdentity,
}

impl Harness {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        fs::create_dir_all(&log_dir).unwrap();

        write_gz(
            &log_dir.join("evm.log-20240301.gz"),
            "[----] I, [2024-03-01T00:00:00.000000 #1:1]  INFO -- : boot\n\
             [----] I, [2024-03-01T23:59:59.000000 #1:1]  INFO -- : rotate\n",
        );
        write_gz(
            &log_dir.join("evm.log-20240302.gz"),
            "[----] I, [2024-03-02T00:00:01.000000 #1:1]  INFO -- : boot\n\
             [----] I, [2024-03-02T23:59:58.000000 #1:1]  INFO -- : rotate\n",
        );
        write_gz(&log_dir.join("api.log-20240302.gz"), "api traffic\n");
        fs::write(
            log_dir.join("evm.log"),
            "[----] I, [2024-03-03T00:00:05.000000 #1:1]  INFO -- : live\n",
        )
        .unwrap();

        let depots = Arc::new(MemoryDepotStore::new([
            Depot::new(SERVER_DEPOT, "server depot", file_uri(&dir.path().join("depot"))),
            Depot::new(ZONE_DEPOT, "zone depot", file_uri(&dir.path().join("zone-depot"))),
        ]));

        let config = CollectionConfig {
            root_dir: dir.path().to_path_buf(),
            work_dir: dir.path().join("work"),
            current_patterns: vec!["log/*.log".to_string()],
            ..Default::default()
        };

        let server = ServerIdentity {
            id: 1,
            guid: Uuid::new_v4(),
            name: "app-1".to_string(),
            zone: Zone {
                name: "east".to_string(),
                log_depot_id: Some(ZONE_DEPOT),
            },
            log_depot_id: Some(SERVER_DEPOT),
        };

        Self {
            dir,
            log_files: Arc::new(MemoryLogFileStore::new()),
            tasks: Arc::new(MemoryTaskStore::new()),
            depots,
            queue: Arc::new(WorkQueue::new()),
            config,
            server,
        }
    }

    fn collector(&self) -> LogCollector {
        let stores = Stores {
            log_files: self.log_files.clone(),
            tasks: self.tasks.clone(),
            depots: self.depots.clone(),
        };
        LogCollector::new(
            self.server.clone(),
            self.config.clone(),
            stores,
            self.queue.clone(),
        )
        .with_resolver(PatternResolver::new(self.config.clone()).with_locator(Arc::new(NoDataDir)))
    }

    async fn new_task(&self) -> Task {
        self.tasks
            .insert(Task::new("Zipped log retrieval for [app-1]", Some(self.server.id)))
            .await
            .unwrap()
    }

    async fn task(&self, id: u64) -> Task {
        self.tasks.get(id).await.unwrap()
    }

    fn historical(&self) -> Vec<LogFile> {
        self.log_files.all().into_iter().filter(|lf| lf.historical).collect()
    }

    fn current(&self) -> Vec<LogFile> {
        self.log_files.all().into_iter().filter(|lf| !lf.historical).collect()
    }
}

fn write_gz(path: &Path, content: impl AsRef<[u8]>) {
    let mut encoder = GzEncoder::new(File::create(path).unwrap(), Compression::default());
    encoder.write_all(content.as_ref()).unwrap();
    encoder.finish().unwrap();
}

fn file_uri(path: &Path) -> String {
    format!("file://{}", path.display())
}

fn uri_path(uri: &str) -> PathBuf {
    PathBuf::from(uri.strip_prefix("file://").unwrap())
}

#[tokio::test]
async fn first_collection_uploads_every_day_and_the_live_logs() {
    let h = Harness::new();
    let collector = h.collector();
    let task = h.new_task().await;

    collector
        .run_collection(&CollectionOptions::new(task.id))
        .await
        .unwrap();

    let historical = h.historical();
    assert_eq!(historical.len(), 2);
    assert!(historical.iter().all(|lf| lf.state == LogFileState::Available));
    assert_eq!(
        historical[0].name,
        "Archive region 0 east app-1 1 20240301_000000_20240301_235959"
    );
    assert_eq!(
        historical[0].description.as_deref(),
        Some("Logs for Zone east Server app-1 20240301_000000_20240301_235959")
    );

    let current = h.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].state, LogFileState::Available);
    assert!(current[0].name.starts_with("Current region 0 east app-1 1 20240303_000005"));

    for lf in h.log_files.all() {
        assert_eq!(lf.depot_id, Some(SERVER_DEPOT));
        assert_eq!(lf.task_id, Some(task.id));
        let uri = lf.log_uri.expect("uploaded file has a uri");
        assert!(uri_path(&uri).starts_with(h.dir.path().join("depot")));
        assert!(uri_path(&uri).is_file());
    }

    let task = h.task(task.id).await;
    assert_eq!(task.state, TaskState::Finished);
    assert_eq!(task.status, TaskStatus::Ok);
    assert_eq!(task.message, "Log files were successfully collected");
}

#[tokio::test]
async fn second_collection_skips_collected_days_and_replaces_current() {
    let h = Harness::new();
    let collector = h.collector();

    let first = h.new_task().await;
    collector.run_collection(&CollectionOptions::new(first.id)).await.unwrap();
    let first_historical = h.historical();
    let first_current = h.current();

    let second = h.new_task().await;
    collector.run_collection(&CollectionOptions::new(second.id)).await.unwrap();

    assert_eq!(h.historical(), first_historical);
    let current = h.current();
    assert_eq!(current.len(), 1);
    assert_ne!(current[0].id, first_current[0].id);
    assert_eq!(current[0].task_id, Some(second.id));
}

#[tokio::test]
async fn already_archived_day_is_skipped() {
    let h = Harness::new();
    let collector = h.collector();
    let task = h.new_task().await;

    let mut archived = LogFile::historical();
    archived.resource_id = Some(h.server.id);
    archived.name = "Archive region 0 east app-1 1 20240301_000000_20240301_235959".to_string();
    archived.state = LogFileState::Available;
    archived.log_uri = Some("file:///elsewhere/day-one.zip".to_string());
    archived.logging_started_on = Some("2024-03-01T00:00:00Z".parse().unwrap());
    archived.logging_ended_on = Some("2024-03-01T23:59:59Z".parse().unwrap());
    let archived = h.log_files.insert(archived).await.unwrap();

    collector.run_collection(&CollectionOptions::new(task.id)).await.unwrap();

    let historical = h.historical();
    assert_eq!(historical.len(), 2);
    assert_eq!(historical[0], archived);
    assert_eq!(historical[1].task_id, Some(task.id));
    assert!(historical[1].name.ends_with("20240302_000001_20240302_235958"));
}

#[tokio::test]
async fn only_current_leaves_history_alone() {
    let h = Harness::new();
    let task = h.new_task().await;
    let options = CollectionOptions {
        only_current: true,
        ..CollectionOptions::new(task.id)
    };

    h.collector().run_collection(&options).await.unwrap();

    assert!(h.historical().is_empty());
    assert_eq!(h.current().len(), 1);
    assert_eq!(h.task(task.id).await.status, TaskStatus::Ok);
}

#[tokio::test]
async fn zone_context_uploads_to_zone_depot_under_support_case() {
    let h = Harness::new();
    let task = h.new_task().await;
    let options = CollectionOptions {
        context: DepotContext::Zone,
        only_current: true,
        support_case: Some(" CASE-42 ".to_string()),
        ..CollectionOptions::new(task.id)
    };

    h.collector().run_collection(&options).await.unwrap();

    let current = &h.current()[0];
    assert_eq!(current.depot_id, Some(ZONE_DEPOT));
    let uploaded = uri_path(current.log_uri.as_deref().unwrap());
    assert!(uploaded.starts_with(h.dir.path().join("zone-depot").join("CASE-42").join("east")));
}

#[tokio::test]
async fn missing_zone_depot_fails_before_collecting() {
    let mut h = Harness::new();
    h.server.zone.log_depot_id = None;
    let task = h.new_task().await;
    let options = CollectionOptions {
        context: DepotContext::Zone,
        ..CollectionOptions::new(task.id)
    };

    let err = h.collector().run_collection(&options).await.unwrap_err();

    assert!(matches!(err, CollectError::Configuration(_)));
    assert_eq!(err.to_string(), "Log depot settings not configured");
    assert!(h.log_files.is_empty());
}

#[tokio::test]
async fn unknown_task_is_not_found() {
    let h = Harness::new();
    let err = h
        .collector()
        .run_collection(&CollectionOptions::new(999))
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::NotFound { .. }));
}

#[tokio::test]
async fn failed_upload_marks_the_log_file_errored() {
    let h = Harness::new();
    let collector = h.collector().with_transport(Arc::new(FailingTransport));
    let task = h.new_task().await;

    let err = collector
        .run_collection(&CollectionOptions::new(task.id))
        .await
        .unwrap_err();

    match err {
        CollectError::Collection { ref source, .. } => assert_eq!(source.class_name(), "UploadError"),
        ref other => panic!("unexpected error: {other}"),
    }
    // The first day failed; nothing after it was attempted
    let all = h.log_files.all();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].state, LogFileState::Error);
    assert_eq!(all[0].log_uri, None);
}

#[tokio::test]
async fn errored_day_is_retried_on_next_run() {
    let h = Harness::new();
    let task = h.new_task().await;
    let _ = h
        .collector()
        .with_transport(Arc::new(FailingTransport))
        .run_collection(&CollectionOptions::new(task.id))
        .await;

    let retry = h.new_task().await;
    h.collector()
        .run_collection(&CollectionOptions::new(retry.id))
        .await
        .unwrap();

    let available: Vec<_> = h
        .historical()
        .into_iter()
        .filter(|lf| lf.state == LogFileState::Available)
        .collect();
    assert_eq!(available.len(), 2);
}

#[tokio::test]
async fn requested_collection_runs_through_the_worker() {
    let h = Harness::new();
    let collector = Arc::new(h.collector());
    let worker = QueueWorker::new(h.queue.clone(), collector.clone());

    let (task_id, outcome) = collector
        .request_log_collection(LogRequest::default())
        .await
        .unwrap();
    assert!(outcome.is_enqueued());

    let deliveries = worker.drain().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].state, MessageState::Ok);

    let task = h.task(task_id).await;
    assert_eq!(task.state, TaskState::Finished);
    assert_eq!(task.status, TaskStatus::Ok);
    assert_eq!(task.name, "Zipped log retrieval for [Server app-1 with id [1]]");
    assert_eq!(h.queue.pending_count(), 0);
}

#[tokio::test]
async fn concurrent_request_is_skipped_and_its_task_failed() {
    let h = Harness::new();
    let collector = h.collector();

    let (_, first) = collector.request_log_collection(LogRequest::default()).await.unwrap();
    let (second_task, second) = collector.request_log_collection(LogRequest::default()).await.unwrap();

    assert!(first.is_enqueued());
    assert!(!second.is_enqueued());
    assert_eq!(second.message_id(), first.message_id());

    let task = h.task(second_task).await;
    assert_eq!(task.state, TaskState::Finished);
    assert_eq!(task.status, TaskStatus::Error);
    assert_eq!(h.queue.pending_count(), 1);
}

#[tokio::test]
async fn worker_records_failures_on_the_task() {
    let h = Harness::new();
    let collector = Arc::new(h.collector().with_transport(Arc::new(FailingTransport)));
    let worker = QueueWorker::new(h.queue.clone(), collector.clone());

    let (task_id, _) = collector
        .request_log_collection(LogRequest {
            only_current: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let delivery = worker.process_next().await.unwrap();

    assert_eq!(delivery.state, MessageState::Error);
    let task = h.task(task_id).await;
    assert_eq!(task.state, TaskState::Finished);
    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.message.contains("[UploadError]"), "{}", task.message);
}

#[tokio::test]
async fn expired_run_times_out() {
    let mut h = Harness::new();
    h.config.timeout_secs = 0;
    let collector = Arc::new(h.collector().with_archiver(Arc::new(StalledArchiver)));
    let worker = QueueWorker::new(h.queue.clone(), collector.clone());

    let (task_id, _) = collector
        .request_log_collection(LogRequest {
            only_current: true,
            ..Default::default()
        })
        .await
        .unwrap();
    let delivery = worker.process_next().await.unwrap();

    assert_eq!(delivery.state, MessageState::Timeout);
    assert_eq!(h.current()[0].state, LogFileState::Error);
    let task = h.task(task_id).await;
    assert_eq!(task.status, TaskStatus::Error);
    assert!(task.message.starts_with("Message timed out"));
}

#[tokio::test]
async fn startup_cleanup_clears_interrupted_collections() {
    let h = Harness::new();
    let collector = Arc::new(h.collector());

    let interrupted = h.new_task().await;
    let mut lf = LogFile::historical();
    lf.resource_id = Some(h.server.id);
    lf.task_id = Some(interrupted.id);
    h.log_files.insert(lf).await.unwrap();
    let orphan = h.new_task().await;
    assert!(collector.log_collection_active().await.unwrap());

    assert!(collector.queue_startup_cleanup().is_enqueued());
    assert!(!collector.queue_startup_cleanup().is_enqueued());
    let deliveries = QueueWorker::new(h.queue.clone(), collector.clone()).drain().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].state, MessageState::Ok);

    assert!(h.log_files.is_empty());
    for id in [interrupted.id, orphan.id] {
        let task = h.task(id).await;
        assert_eq!(task.state, TaskState::Finished);
        assert_eq!(task.status, TaskStatus::Error);
        assert_eq!(task.message, INCOMPLETE_AT_STARTUP_MESSAGE);
    }
    assert!(!collector.log_collection_active().await.unwrap());
}

#[tokio::test]
async fn sync_status_reflects_the_latest_upload() {
    let h = Harness::new();
    let collector = h.collector();
    assert_eq!(collector.last_log_sync_on().await.unwrap(), None);
    assert_eq!(collector.last_log_sync_message().await.unwrap(), None);

    let task = h.new_task().await;
    collector.run_collection(&CollectionOptions::new(task.id)).await.unwrap();

    assert!(collector.last_log_sync_on().await.unwrap().is_some());
    assert_eq!(
        collector.last_log_sync_message().await.unwrap().as_deref(),
        Some("Log files were successfully collected")
    );
    assert!(!collector.log_collection_active_recently(None).await.unwrap());
}

#[tokio::test]
async fn archives_keep_paths_relative_to_the_root() {
    let h = Harness::new();
    let task = h.new_task().await;
    h.collector()
        .run_collection(&CollectionOptions::new(task.id))
        .await
        .unwrap();

    let day_two = &h.historical()[1];
    let local = day_two.local_file.clone().unwrap();
    assert!(local.starts_with(h.dir.path().join("work")));
    let zip = zip::ZipArchive::new(File::open(local).unwrap()).unwrap();
    let mut names: Vec<_> = zip.file_names().map(str::to_string).collect();
    names.sort();
    assert_eq!(names, vec!["log/api.log-20240302.gz", "log/evm.log-20240302.gz"]);
}

#[tokio::test]
async fn rotated_logs_with_binary_lines_keep_their_days() {
    let h = Harness::new();
    let log_dir = h.dir.path().join("log");
    write_gz(
        &log_dir.join("evm.log-20240301.gz"),
        b"\xff\xfe corrupt\n[----] I, [2024-03-01T00:00:00.000000 #1:1]  INFO -- : boot\n\
          \x00\xc3\x28\n[----] I, [2024-03-01T23:59:59.000000 #1:1]  INFO -- : rotate\n\xff\n",
    );
    write_gz(
        &log_dir.join("evm.log-20240302.gz"),
        b"[----] I, [2024-03-02T00:00:01.000000 #1:1]  INFO -- : boot \xff\n\
          [----] I, [2024-03-02T23:59:58.000000 #1:1]  INFO -- : rotate\n\xfe\xfe\n",
    );
    let task = h.new_task().await;

    h.collector()
        .run_collection(&CollectionOptions::new(task.id))
        .await
        .unwrap();

    let names: Vec<_> = h.historical().into_iter().map(|lf| lf.name).collect();
    assert_eq!(
        names,
        vec![
            "Archive region 0 east app-1 1 20240301_000000_20240301_235959",
            "Archive region 0 east app-1 1 20240302_000001_20240302_235958",
        ]
    );
}

#[tokio::test]
async fn unparseable_first_timestamp_names_the_day_unknown() {
    let h = Harness::new();
    write_gz(
        &h.dir.path().join("log").join("evm.log-20240301.gz"),
        "[----] I, [2024-02-30T10:00:00.000000 #1:1]  INFO -- : boot\n\
         [----] I, [2024-03-01T23:59:59.000000 #1:1]  INFO -- : rotate\n",
    );
    let collector = h.collector();

    let first = h.new_task().await;
    collector.run_collection(&CollectionOptions::new(first.id)).await.unwrap();

    let historical = h.historical();
    assert_eq!(historical.len(), 2);
    assert_eq!(
        historical[0].name,
        "Archive region 0 east app-1 1 unknown_20240301_235959"
    );
    assert_eq!(historical[0].state, LogFileState::Available);
    assert_eq!(historical[0].logging_started_on, None);
    assert_eq!(
        historical[0].logging_ended_on,
        Some("2024-03-01T23:59:59Z".parse().unwrap())
    );

    // The day is recognized by name and end bound on the next run
    let second = h.new_task().await;
    collector.run_collection(&CollectionOptions::new(second.id)).await.unwrap();
    assert_eq!(h.historical(), historical);
}

#[tokio::test]
async fn empty_archive_marks_the_current_log_file_errored() {
    let mut h = Harness::new();
    h.config.current_patterns = vec!["nomatch/*.log".to_string()];
    let task = h.new_task().await;
    let options = CollectionOptions {
        only_current: true,
        ..CollectionOptions::new(task.id)
    };

    let err = h.collector().run_collection(&options).await.unwrap_err();

    match err {
        CollectError::Collection { ref source, log_type, .. } => {
            assert!(matches!(source, StepError::NothingMatched(_)), "{source}");
            assert_eq!(log_type, LogType::Current);
        }
        ref other => panic!("unexpected error: {other}"),
    }
    let current = h.current();
    assert_eq!(current.len(), 1);
    assert_eq!(current[0].state, LogFileState::Error);
    assert_eq!(current[0].log_uri, None);
    assert_eq!(h.task(task.id).await.state, TaskState::Active);
}

#[tokio::test]
async fn log_file_without_a_task_is_marked_errored() {
    let h = Harness::new();
    let collector = h.collector();
    let depot = Depot::new(SERVER_DEPOT, "server depot", file_uri(&h.dir.path().join("depot")));
    let pattern = h.dir.path().join("log/*.log").to_string_lossy().into_owned();

    let orphan = h.log_files.insert(LogFile::current()).await.unwrap();
    let err = collector
        .collect_and_upload(&pattern, orphan.clone(), LogType::Current, &depot, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CollectError::NotFound { .. }));
    assert_eq!(h.log_files.get(orphan.id).await.unwrap().state, LogFileState::Error);

    let mut dangling = LogFile::current();
    dangling.task_id = Some(999);
    let dangling = h.log_files.insert(dangling).await.unwrap();
    assert!(collector
        .collect_and_upload(&pattern, dangling.clone(), LogType::Current, &depot, None)
        .await
        .is_err());
    assert_eq!(h.log_files.get(dangling.id).await.unwrap().state, LogFileState::Error);
}

#[tokio::test]
async fn support_case_outside_the_depot_is_refused() {
    let h = Harness::new();
    let task = h.new_task().await;
    let options = CollectionOptions {
        only_current: true,
        support_case: Some("../escape".to_string()),
        ..CollectionOptions::new(task.id)
    };

    let err = h.collector().run_collection(&options).await.unwrap_err();

    match err {
        CollectError::Collection { ref source, .. } => assert_eq!(source.class_name(), "UploadError"),
        ref other => panic!("unexpected error: {other}"),
    }
    assert_eq!(h.current()[0].state, LogFileState::Error);
    assert!(!h.dir.path().join("escape").exists());
}

#[tokio::test]
async fn startup_cleanup_spares_requests_made_after_it() {
    let h = Harness::new();
    let collector = Arc::new(h.collector());
    let interrupted = h.new_task().await;

    collector.queue_startup_cleanup();
    let (task_id, outcome) = collector
        .request_log_collection(LogRequest::default())
        .await
        .unwrap();
    assert!(outcome.is_enqueued());

    let deliveries = QueueWorker::new(h.queue.clone(), collector.clone()).drain().await;
    assert_eq!(deliveries.len(), 2);
    assert!(deliveries.iter().all(|d| d.state == MessageState::Ok));

    let stale = h.task(interrupted.id).await;
    assert_eq!(stale.status, TaskStatus::Error);
    assert_eq!(stale.message, INCOMPLETE_AT_STARTUP_MESSAGE);

    let requested = h.task(task_id).await;
    assert_eq!(requested.state, TaskState::Finished);
    assert_eq!(requested.status, TaskStatus::Ok);
    assert_eq!(h.historical().len(), 2);
}

#[tokio::test]
async fn scheduler_requests_once_while_a_run_is_queued() {
    let h = Harness::new();
    let collector = Arc::new(h.collector());
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let scheduler = tokio::spawn(run_scheduled_requests(
        collector.clone(),
        Duration::from_millis(20),
        LogRequest::default(),
        shutdown_rx,
    ));
    tokio::time::sleep(Duration::from_millis(90)).await;
    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), scheduler)
        .await
        .expect("scheduler stops on shutdown")
        .unwrap();

    // No worker ran, so every later tick found the first request queued
    let tasks = h.tasks.list_for_server(h.server.id).await.unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].state, TaskState::Queued);
    assert_eq!(h.queue.pending_count(), 1);
}
