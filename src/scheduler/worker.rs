/*
 *  Copyright 2025 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Worker Loop
//!
//! The background poller that turns due occurrences into dispatches. Each
//! tick drains every occurrence whose bucket is at or before the current
//! one and carries this instance's source label. For each occurrence the
//! worker takes the per-task advisory lock, publishes the payload, appends
//! an audit row, then advances or finishes the task.
//!
//! Several instances may race on the same store; the advisory lock ensures
//! exactly one performs the publish/audit/advance sequence for any given
//! task, and the losers skip it for the tick. A publish failure is audited
//! `Fail` but still advances the occurrence: one dispatch attempt per
//! scheduled occurrence, so a broken broker cannot wedge the scheduler.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::dal::DAL;
use crate::database::Database;
use crate::error::{LockError, SchedulerError};
use crate::lock::{task_lock_key, AdvisoryLock};
use crate::models::done::DispatchStatus;
use crate::queue::{DispatchQueue, TASK_QUEUE_PREFIX};
use crate::timeline::{bucket_of, next_occurrence};

/// The periodic dispatch worker for one scheduler instance.
pub struct Worker {
    id: Uuid,
    dal: DAL,
    database: Database,
    queue: Arc<dyn DispatchQueue>,
    source: String,
    bucket_size: i64,
}

impl Worker {
    pub fn new(
        database: Database,
        queue: Arc<dyn DispatchQueue>,
        source: impl Into<String>,
        bucket_size: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            dal: DAL::new(database.clone()),
            database,
            queue,
            source: source.into(),
            bucket_size,
        }
    }

    /// Starts the background loop: sleep `delay`, then drain ready buckets
    /// every `interval` until the handle signals shutdown. An in-flight
    /// drain always completes before the loop exits.
    pub fn start(self, delay: Duration, interval: Duration) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_rx.changed() => return,
            }

            info!("worker {} started (source: {})", self.id, self.source);

            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = ticker.tick() => self.run_once().await,
                }
            }

            info!("worker {} stopped", self.id);
        });

        WorkerHandle {
            shutdown: shutdown_tx,
            handle,
        }
    }

    /// Runs a single drain pass over the ready buckets.
    ///
    /// Exposed for embedders (and tests) that drive their own cadence
    /// instead of spawning the background loop.
    pub async fn run_once(&self) {
        let bucket = bucket_of(Utc::now(), self.bucket_size);

        let todos = match self.dal.todo().fetch_ready(bucket, &self.source).await {
            Ok(todos) => todos,
            Err(e) => {
                error!("failed to fetch ready occurrences: {}", e);
                return;
            }
        };

        if todos.is_empty() {
            return;
        }

        for todo in todos {
            let key = task_lock_key(todo.task_id);
            let lock = match AdvisoryLock::try_acquire(&self.database, &key).await {
                Ok(lock) => lock,
                Err(LockError::Held) => {
                    info!("lock {} held elsewhere, skipping this tick", key);
                    continue;
                }
                Err(e) => {
                    error!("acquiring lock {} failed: {}", key, e);
                    continue;
                }
            };

            debug!("executing task {}", todo.task_id);
            if let Err(e) = self.process(todo.bucket, todo.task_id).await {
                error!("processing task {} failed: {}", todo.task_id, e);
            }

            if let Err(e) = lock.release().await {
                warn!("releasing lock {} failed: {}", key, e);
            }
        }
    }

    /// Dispatches one occurrence and reschedules or finishes its task.
    async fn process(&self, bucket: i64, task_id: i64) -> Result<(), SchedulerError> {
        let task = self.dal.task().load(task_id).await?;

        if task.done {
            // Stale occurrence of an already-terminal task.
            self.dal.todo().delete_for_task(task_id).await?;
            return Ok(());
        }

        let now = Utc::now();
        let physical = format!("{}{}", TASK_QUEUE_PREFIX, task.queue_name);
        let payload = task.data.clone().unwrap_or_default();

        let status = match self.queue.publish(&physical, &payload).await {
            Ok(()) => DispatchStatus::Done,
            Err(e) => {
                error!("cannot dispatch task {} to {}: {}", task_id, physical, e);
                DispatchStatus::Fail
            }
        };

        if let Err(e) = self.dal.done().record(bucket, task_id, status, now).await {
            error!("cannot append audit row for task {}: {}", task_id, e);
        }

        let start_time = match task.start_time_utc() {
            Ok(t) => t,
            Err(e) => {
                error!("cannot parse start time of task {}: {}", task_id, e);
                return Ok(());
            }
        };

        let (loop_index, next_fire) = next_occurrence(start_time, task.interval, now);

        if loop_index < task.loop_count {
            let new_bucket = bucket_of(next_fire, self.bucket_size);
            self.dal
                .task()
                .advance(task_id, bucket, new_bucket, loop_index, next_fire, &self.source)
                .await?;
        } else {
            self.dal.task().finish(task_id, bucket, loop_index).await?;
        }

        Ok(())
    }
}

/// Handle on a running worker loop.
pub struct WorkerHandle {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signals shutdown and waits for the loop to finish its current tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.handle.await {
            error!("worker task join failed: {}", e);
        }
    }

    /// Signals shutdown without waiting.
    pub fn signal_shutdown(&self) {
        let _ = self.shutdown.send(true);
    }
}
