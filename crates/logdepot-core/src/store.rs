//! Store traits - the persistence seams of the collection engine
//!
//! The engine never talks to a database directly. Each record kind has a
//! store trait; an in-memory implementation ships with the engine and a
//! deployment can put any database behind the same traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::models::{
    Depot, DepotId, LogFile, LogFileFilter, LogFileId, ServerId, Task, TaskId, TaskState,
    TaskStatus,
};

/// Persistence for collected log bundles
#[async_trait]
pub trait LogFileStore: Send + Sync {
    /// Insert a new record and return it with its assigned id
    async fn insert(&self, log_file: LogFile) -> StoreResult<LogFile>;

    async fn get(&self, id: LogFileId) -> StoreResult<LogFile>;

    /// Replace a stored record, bumping `updated_on`
    async fn update(&self, log_file: &LogFile) -> StoreResult<LogFile>;

    /// First record matching the filter, lowest id first
    async fn find_first(&self, filter: &LogFileFilter) -> StoreResult<Option<LogFile>>;

    /// All records matching the filter, lowest id first
    async fn list(&self, filter: &LogFileFilter) -> StoreResult<Vec<LogFile>>;

    async fn delete(&self, id: LogFileId) -> StoreResult<()>;

    /// Delete every matching record, returning how many went
    async fn delete_where(&self, filter: &LogFileFilter) -> StoreResult<usize> {
        let matching = self.list(filter).await?;
        for log_file in &matching {
            self.delete(log_file.id).await?;
        }
        Ok(matching.len())
    }

    /// Most recent `updated_on` among the matching records
    async fn max_updated_on(&self, filter: &LogFileFilter) -> StoreResult<Option<DateTime<Utc>>> {
        Ok(self
            .list(filter)
            .await?
            .into_iter()
            .map(|lf| lf.updated_on)
            .max())
    }
}

/// Persistence for task records
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn insert(&self, task: Task) -> StoreResult<Task>;

    async fn get(&self, id: TaskId) -> StoreResult<Task>;

    /// Write state, status and message in one step
    async fn update_status(
        &self,
        id: TaskId,
        state: TaskState,
        status: TaskStatus,
        message: &str,
    ) -> StoreResult<Task>;

    /// Tasks owned by a server
    async fn list_for_server(&self, server_id: ServerId) -> StoreResult<Vec<Task>>;
}

/// Persistence for depot settings
#[async_trait]
pub trait DepotStore: Send + Sync {
    /// `None` when no depot with this id is configured
    async fn find(&self, id: DepotId) -> StoreResult<Option<Depot>>;

    /// Set or clear the support case tag
    async fn set_support_case(
        &self,
        id: DepotId,
        support_case: Option<String>,
    ) -> StoreResult<Depot>;
}
