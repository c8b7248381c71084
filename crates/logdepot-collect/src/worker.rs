//! Queue worker
//!
//! Pulls this server's messages off the [`WorkQueue`], routes them to the
//! collector by method name, moves each message to a terminal state and
//! delivers its callback. [`run_scheduled_requests`] feeds the queue on a
//! fixed interval when the daemon serves.

use std::sync::Arc;
use std::time::Duration;

use logdepot_core::{
    CollectionOptions, DispatchKind, MessageCallback, MessageId, MessageState, QueueMessage,
    TaskState, TaskStatus, TaskStore,
};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::collector::{LogCollector, LogRequest};
use crate::queue::WorkQueue;

/// Outcome of delivering one message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub message_id: MessageId,
    pub state: MessageState,
    pub error: Option<String>,
}

pub struct QueueWorker {
    queue: Arc<WorkQueue>,
    collector: Arc<LogCollector>,
}

impl QueueWorker {
    pub fn new(queue: Arc<WorkQueue>, collector: Arc<LogCollector>) -> Self {
        Self { queue, collector }
    }

    /// Deliver the next ready message for this server, if there is one
    pub async fn process_next(&self) -> Option<Delivery> {
        let message = self.queue.dequeue(Some(self.collector.server().guid))?;
        debug!(message_id = message.id, key = %message.key, "Delivering message");

        let (state, error) = self.deliver(&message).await;
        self.queue.complete(message.id, state);

        match state {
            MessageState::Ok => info!(message_id = message.id, method = %message.key.method_name, "Message delivered"),
            _ => error!(
                message_id = message.id,
                method = %message.key.method_name,
                %state,
                error = error.as_deref().unwrap_or_default(),
                "Message delivery failed"
            ),
        }

        if let Some(ref callback) = message.callback {
            self.run_callback(callback, state, error.as_deref()).await;
        }

        Some(Delivery {
            message_id: message.id,
            state,
            error,
        })
    }

    /// Deliver messages until none are ready
    pub async fn drain(&self) -> Vec<Delivery> {
        let mut deliveries = Vec::new();
        while let Some(delivery) = self.process_next().await {
            deliveries.push(delivery);
        }
        deliveries
    }

    /// Poll the queue until `shutdown` flips to true
    pub async fn run(&self, poll_interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(server = %self.collector.server().who_am_i(), "Queue worker started");
        loop {
            self.drain().await;
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Queue worker stopped");
    }

    async fn deliver(&self, message: &QueueMessage) -> (MessageState, Option<String>) {
        let kind = match message.key.method_name.parse::<DispatchKind>() {
            Ok(kind) => kind,
            Err(e) => return (MessageState::Error, Some(e)),
        };

        match kind {
            DispatchKind::PostLogs => {
                let options: CollectionOptions = match serde_json::from_value(message.args.clone()) {
                    Ok(options) => options,
                    Err(e) => return (MessageState::Error, Some(format!("Invalid message arguments: {}", e))),
                };
                let deadline = message.timeout.map(|t| Instant::now() + t);
                match self.collector.run_collection_until(&options, deadline).await {
                    Ok(()) => (MessageState::Ok, None),
                    Err(e) if e.is_timeout() => (MessageState::Timeout, Some(e.to_string())),
                    Err(e) => (MessageState::Error, Some(e.to_string())),
                }
            }
            DispatchKind::StartupCleanup => {
                // Tasks requested after the sweep was queued are not interrupted
                let sweep = self.collector.delete_active_log_collections_before(message.created_on);
                let result = match message.timeout {
                    Some(timeout) => match tokio::time::timeout(timeout, sweep).await {
                        Ok(result) => result,
                        Err(_) => return (MessageState::Timeout, Some("execution expired".to_string())),
                    },
                    None => sweep.await,
                };
                match result {
                    Ok(_) => (MessageState::Ok, None),
                    Err(e) => (MessageState::Error, Some(e.to_string())),
                }
            }
        }
    }

    /// Write the delivery outcome onto the task. A successful run has
    /// already finished its task and is left alone.
    async fn run_callback(&self, callback: &MessageCallback, state: MessageState, error: Option<&str>) {
        let MessageCallback::TaskStatus { task_id } = *callback;
        let tasks = self.collector.tasks();

        let result = match state {
            MessageState::Ok => match tasks.get(task_id).await {
                Ok(task) if task.is_finished() => return,
                Ok(_) => {
                    tasks
                        .update_status(task_id, TaskState::Finished, TaskStatus::Ok, "Message delivered successfully")
                        .await
                }
                Err(e) => Err(e),
            },
            _ => {
                let message = match state {
                    MessageState::Timeout => format!("Message timed out: {}", error.unwrap_or("execution expired")),
                    _ => error.unwrap_or("Message delivery failed").to_string(),
                };
                tasks
                    .update_status(task_id, TaskState::Finished, TaskStatus::Error, &message)
                    .await
            }
        };

        if let Err(e) = result {
            warn!(task_id, error = %e, "Failed to update task from queue callback");
        }
    }
}

/// Request a collection every `interval` until `shutdown` flips to true.
/// The first request is made immediately. A tick that finds a collection
/// already running is skipped.
pub async fn run_scheduled_requests(
    collector: Arc<LogCollector>,
    interval: Duration,
    request: LogRequest,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
                continue;
            }
        }
        if *shutdown.borrow() {
            break;
        }

        if collector.collection_queued() {
            debug!("Log collection already queued, skipping scheduled request");
            continue;
        }
        match collector.log_collection_active().await {
            Ok(true) => {
                debug!("Log collection already running, skipping scheduled request");
                continue;
            }
            Ok(false) => {}
            Err(e) => {
                warn!(error = %e, "Failed to check for active log collections");
                continue;
            }
        }

        match collector.request_log_collection(request.clone()).await {
            Ok((task_id, _)) => info!(task_id, "Scheduled log collection requested"),
            Err(e) => error!(error = %e, "Failed to request scheduled log collection"),
        }
    }
    debug!("Collection scheduler stopped");
}
