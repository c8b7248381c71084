//! In-memory stores
//!
//! Process-local implementations of the store traits, used by the daemon
//! and by tests. Records live in id-ordered maps behind `parking_lot`
//! locks; ids are handed out from an atomic counter starting at 1.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use logdepot_core::{
    Depot, DepotId, DepotStore, LogFile, LogFileFilter, LogFileId, LogFileStore, ServerId,
    StoreError, StoreResult, Task, TaskId, TaskState, TaskStatus, TaskStore,
};
use parking_lot::RwLock;

use crate::config::DepotConfig;

#[derive(Debug, Default)]
pub struct MemoryLogFileStore {
    next_id: AtomicU64,
    records: RwLock<BTreeMap<LogFileId, LogFile>>,
}

impl MemoryLogFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record, lowest id first
    pub fn all(&self) -> Vec<LogFile> {
        self.records.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl LogFileStore for MemoryLogFileStore {
    async fn insert(&self, mut log_file: LogFile) -> StoreResult<LogFile> {
        log_file.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.write().insert(log_file.id, log_file.clone());
        Ok(log_file)
    }

    async fn get(&self, id: LogFileId) -> StoreResult<LogFile> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("LogFile", id))
    }

    async fn update(&self, log_file: &LogFile) -> StoreResult<LogFile> {
        let mut records = self.records.write();
        let stored = records
            .get_mut(&log_file.id)
            .ok_or_else(|| StoreError::not_found("LogFile", log_file.id))?;
        *stored = log_file.clone();
        stored.updated_on = Utc::now();
        Ok(stored.clone())
    }

    async fn find_first(&self, filter: &LogFileFilter) -> StoreResult<Option<LogFile>> {
        Ok(self
            .records
            .read()
            .values()
            .find(|lf| filter.matches(lf))
            .cloned())
    }

    async fn list(&self, filter: &LogFileFilter) -> StoreResult<Vec<LogFile>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|lf| filter.matches(lf))
            .cloned()
            .collect())
    }

    async fn delete(&self, id: LogFileId) -> StoreResult<()> {
        self.records
            .write()
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("LogFile", id))
    }

    async fn delete_where(&self, filter: &LogFileFilter) -> StoreResult<usize> {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|_, lf| !filter.matches(lf));
        Ok(before - records.len())
    }
}

#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    next_id: AtomicU64,
    records: RwLock<BTreeMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Task> {
        self.records.read().values().cloned().collect()
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    async fn insert(&self, mut task: Task) -> StoreResult<Task> {
        task.id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.records.write().insert(task.id, task.clone());
        Ok(task)
    }

    async fn get(&self, id: TaskId) -> StoreResult<Task> {
        self.records
            .read()
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("Task", id))
    }

    async fn update_status(
        &self,
        id: TaskId,
        state: TaskState,
        status: TaskStatus,
        message: &str,
    ) -> StoreResult<Task> {
        let mut records = self.records.write();
        let task = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Task", id))?;
        task.update_status(state, status, message);
        Ok(task.clone())
    }

    async fn list_for_server(&self, server_id: ServerId) -> StoreResult<Vec<Task>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|t| t.server_id == Some(server_id))
            .cloned()
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryDepotStore {
    records: RwLock<BTreeMap<DepotId, Depot>>,
}

impl MemoryDepotStore {
    pub fn new(depots: impl IntoIterator<Item = Depot>) -> Self {
        Self {
            records: RwLock::new(depots.into_iter().map(|d| (d.id, d)).collect()),
        }
    }

    pub fn from_configs(configs: &[DepotConfig]) -> Self {
        Self::new(configs.iter().map(|c| Depot {
            id: c.id,
            name: c.name.clone(),
            uri: c.uri.clone(),
            support_case: c.support_case.clone(),
        }))
    }
}

#[async_trait]
impl DepotStore for MemoryDepotStore {
    async fn find(&self, id: DepotId) -> StoreResult<Option<Depot>> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn set_support_case(
        &self,
        id: DepotId,
        support_case: Option<String>,
    ) -> StoreResult<Depot> {
        let mut records = self.records.write();
        let depot = records
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("Depot", id))?;
        depot.support_case = support_case;
        Ok(depot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use logdepot_core::LogFileState;

    #[tokio::test]
    async fn ids_are_assigned_from_one() {
        let store = MemoryLogFileStore::new();
        let first = store.insert(LogFile::current()).await.unwrap();
        let second = store.insert(LogFile::current()).await.unwrap();
        assert_eq!((first.id, second.id), (1, 2));
    }

    #[tokio::test]
    async fn delete_where_only_removes_matches() {
        let store = MemoryLogFileStore::new();
        let mut historical = LogFile::historical();
        historical.resource_id = Some(1);
        let mut current = LogFile::current();
        current.resource_id = Some(1);
        store.insert(historical).await.unwrap();
        store.insert(current).await.unwrap();

        let filter = LogFileFilter {
            historical: Some(false),
            ..LogFileFilter::for_resource(1)
        };
        assert_eq!(store.delete_where(&filter).await.unwrap(), 1);
        assert!(store.all().iter().all(|lf| lf.historical));
    }

    #[tokio::test]
    async fn update_of_missing_record_is_not_found() {
        let store = MemoryLogFileStore::new();
        let mut lf = LogFile::historical();
        lf.id = 99;
        lf.state = LogFileState::Error;
        assert!(store.update(&lf).await.unwrap_err().is_not_found());
    }

    #[test]
    fn support_case_can_be_cleared() {
        let store = MemoryDepotStore::new([Depot::new(4, "d", "file:///tmp/d")]);
        tokio_test::block_on(async {
            let depot = store.set_support_case(4, Some("C-1".into())).await.unwrap();
            assert_eq!(depot.support_case.as_deref(), Some("C-1"));
            let depot = store.set_support_case(4, None).await.unwrap();
            assert_eq!(depot.support_case, None);
            assert!(store.find(5).await.unwrap().is_none());
        });
    }
}
