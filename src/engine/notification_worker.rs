//! # Notification worker
//!
//! Moves delivery off the write path. Ingestion pushes a [`StatusChange`]
//! onto a bounded queue and returns; the worker receives it and processes it
//! in its own task, so a slow channel only delays its own event.
//!
//! On shutdown the worker stops taking new events, processes what is already
//! queued and waits for in-flight tasks up to a deadline. Tasks still running
//! after that are aborted; their state writes simply do not happen.

use std::{sync::Arc, time::Duration};

use thiserror::Error;
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinSet,
};
use tokio_util::sync::CancellationToken;

use super::notification_service::NotificationService;
use crate::models::StatusChange;

/// Why an event could not be queued.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// The queue is at capacity.
    #[error("Notification queue is full")]
    Full,
    /// The worker has stopped.
    #[error("Notification queue is closed")]
    Closed,
}

/// The sending side of the notification queue.
#[derive(Debug, Clone)]
pub struct NotificationQueue {
    tx: mpsc::Sender<StatusChange>,
}

impl NotificationQueue {
    /// Creates a queue holding up to `capacity` pending events, and the
    /// receiver the worker consumes.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<StatusChange>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queues `change` without waiting.
    pub fn enqueue(&self, change: StatusChange) -> Result<(), EnqueueError> {
        self.tx.try_send(change).map_err(|e| match e {
            TrySendError::Full(change) => {
                tracing::warn!(
                    environment_id = change.environment_id,
                    "Notification queue is full, dropping status change."
                );
                EnqueueError::Full
            }
            TrySendError::Closed(_) => EnqueueError::Closed,
        })
    }
}

/// Consumes status changes and processes each in its own task.
pub struct NotificationWorker {
    service: Arc<NotificationService>,
    rx: mpsc::Receiver<StatusChange>,
    cancellation_token: CancellationToken,
    shutdown_timeout: Duration,
}

impl NotificationWorker {
    /// Creates a worker reading from `rx` until `cancellation_token` fires or
    /// every queue handle is dropped.
    pub fn new(
        service: Arc<NotificationService>,
        rx: mpsc::Receiver<StatusChange>,
        cancellation_token: CancellationToken,
        shutdown_timeout: Duration,
    ) -> Self {
        Self { service, rx, cancellation_token, shutdown_timeout }
    }

    /// Runs until cancelled, then drains.
    pub async fn run(mut self) {
        let mut tasks = JoinSet::new();
        tracing::info!("Notification worker started.");

        loop {
            tokio::select! {
                biased;
                _ = self.cancellation_token.cancelled() => {
                    tracing::info!("Notification worker received shutdown signal.");
                    break;
                }
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    log_task_result(result);
                }
                maybe_change = self.rx.recv() => match maybe_change {
                    Some(change) => self.spawn(&mut tasks, change),
                    None => {
                        tracing::info!("Notification queue closed.");
                        break;
                    }
                },
            }
        }

        self.rx.close();
        while let Ok(change) = self.rx.try_recv() {
            self.spawn(&mut tasks, change);
        }

        let pending = tasks.len();
        let drain = async {
            while let Some(result) = tasks.join_next().await {
                log_task_result(result);
            }
        };
        if tokio::time::timeout(self.shutdown_timeout, drain).await.is_err() {
            tracing::warn!(
                pending,
                timeout = ?self.shutdown_timeout,
                "Notification tasks did not finish in time, aborting them."
            );
            tasks.shutdown().await;
        }
        tracing::info!("Notification worker stopped.");
    }

    fn spawn(&self, tasks: &mut JoinSet<()>, change: StatusChange) {
        let service = Arc::clone(&self.service);
        tasks.spawn(async move {
            if let Err(e) = service.process(change).await {
                tracing::error!(
                    error = %e,
                    environment_id = change.environment_id,
                    "Failed to process status change."
                );
            }
        });
    }
}

fn log_task_result(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Notification task panicked or was cancelled.");
    }
}
