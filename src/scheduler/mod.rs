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

//! Scheduler API
//!
//! External entry points for enrolling, stopping and triggering tasks.
//! The [`Scheduler`] is cheap to clone and callable from many concurrent
//! request handlers; all task-visible state lives in the database.

pub mod worker;

pub use worker::{Worker, WorkerHandle};

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::SchedulerConfig;
use crate::dal::DAL;
use crate::database::Database;
use crate::error::{QueueError, SchedulerError};
use crate::models::format_rfc3339;
use crate::models::task::NewTask;
use crate::queue::{DispatchQueue, TaskHandler, TASK_QUEUE_PREFIX};
use crate::timeline::{bucket_of, next_occurrence};

/// A request to enroll a delayed task.
#[derive(Debug, Clone)]
pub struct StartTaskRequest {
    /// Name used to detect duplicate re-enrollment; required.
    pub task_name: String,
    /// Downstream work queue; required.
    pub queue_name: String,
    /// Opaque payload delivered verbatim to consumers.
    pub data: Vec<u8>,
    /// Absolute instant of the first intended fire.
    pub time: DateTime<Utc>,
    /// Repetition interval in seconds; `0` fires exactly once.
    pub interval: i64,
    /// Number of firings intended; `-1` means effectively unbounded.
    pub loop_count: i64,
}

/// Entry point for application code.
#[derive(Clone)]
pub struct Scheduler {
    dal: DAL,
    database: Database,
    queue: Arc<dyn DispatchQueue>,
    config: SchedulerConfig,
    source: String,
}

impl Scheduler {
    /// Creates a scheduler instance.
    ///
    /// `source` is the instance's ownership label: tasks it enrolls carry
    /// the label, and only workers with the same label will dispatch them.
    pub fn new(
        database: Database,
        queue: Arc<dyn DispatchQueue>,
        config: SchedulerConfig,
        source: impl Into<String>,
    ) -> Self {
        Self {
            dal: DAL::new(database.clone()),
            database,
            queue,
            config,
            source: source.into(),
        }
    }

    /// Enrolls a task.
    ///
    /// Validates the request, normalizes an unbounded loop count, computes
    /// the first occurrence and writes the task with its occurrence row in
    /// one transaction. Re-enrolling the same name with identical
    /// scheduling parameters returns [`SchedulerError::TaskAlreadyExisted`]
    /// and leaves state untouched; with differing parameters the prior task
    /// is replaced atomically.
    pub async fn start_task(&self, request: StartTaskRequest) -> Result<i64, SchedulerError> {
        info!(
            "Received start task request: name={}, queue={}, time={}, interval={}, loop={}",
            request.task_name,
            request.queue_name,
            format_rfc3339(request.time),
            request.interval,
            request.loop_count
        );

        validate_request(&request)?;

        let loop_count = if request.loop_count == -1 {
            i64::MAX
        } else {
            request.loop_count
        };

        if request.interval < 0 {
            error!("Interval is invalid: {}", request.interval);
            return Err(SchedulerError::TaskRequestInvalid(
                "interval must be non-negative".to_string(),
            ));
        }

        let now = Utc::now();
        let (loop_index, next_fire) = if request.interval != 0 {
            next_occurrence(request.time, request.interval, now)
        } else {
            (0, request.time)
        };

        if next_fire < now {
            error!("Task is expired: name={}", request.task_name);
            return Err(SchedulerError::TaskExpired);
        }

        let bucket = bucket_of(next_fire, self.config.bucket_size);
        let new_task = NewTask {
            task_name: Some(request.task_name),
            queue_name: request.queue_name,
            data: Some(request.data),
            done: false,
            loop_index,
            loop_count,
            next: next_fire.timestamp(),
            interval: request.interval,
            start_time: format_rfc3339(request.time),
            next_time: format_rfc3339(next_fire),
            source: self.source.clone(),
        };

        self.dal.task().enroll(new_task, bucket).await
    }

    /// Stops a task, deleting it and its pending occurrence.
    pub async fn stop_task(&self, task_id: i64) -> Result<(), SchedulerError> {
        self.dal.task().remove(task_id).await
    }

    /// Publishes a payload onto a task queue immediately, bypassing the
    /// scheduler entirely.
    pub async fn trigger_task(&self, queue_name: &str, data: &[u8]) -> Result<(), SchedulerError> {
        self.push_to_queue(queue_name, data).await
    }

    /// Enrolls a task that fires exactly once at `start_time`.
    ///
    /// A unique task name is synthesized so repeated calls never collide.
    /// Returns the synthesized name together with the task id.
    pub async fn start_one_time_task(
        &self,
        queue_name: &str,
        start_time: DateTime<Utc>,
        data: Vec<u8>,
    ) -> Result<(String, i64), SchedulerError> {
        let task_name = format!("onetime_{}_{}", queue_name, Uuid::new_v4());

        if start_time < Utc::now() {
            error!(
                "One-time task start {} is before now",
                format_rfc3339(start_time)
            );
            return Err(SchedulerError::TaskRequestInvalid(
                "start time is before now".to_string(),
            ));
        }

        let task_id = self
            .start_task(StartTaskRequest {
                task_name: task_name.clone(),
                queue_name: queue_name.to_string(),
                data,
                time: start_time,
                interval: 0,
                loop_count: 0,
            })
            .await?;

        Ok((task_name, task_id))
    }

    /// Registers a handler consuming a task queue.
    ///
    /// The handler is invoked once per dispatched payload, under the
    /// configured task timeout.
    pub async fn handle_task(
        &self,
        queue_name: &str,
        handler: TaskHandler,
    ) -> Result<(), QueueError> {
        let physical = format!("{}{}", TASK_QUEUE_PREFIX, queue_name);
        self.queue
            .subscribe_group(&physical, "task_handlers", handler)
            .await
    }

    /// Spawns the background worker loop for this instance.
    ///
    /// `SchedulerConfig::enabled` is the master switch: embedders consult
    /// it before calling. Callers should hold the returned handle and
    /// invoke [`WorkerHandle::shutdown`] during process teardown.
    pub fn spawn_worker(&self) -> WorkerHandle {
        Worker::new(
            self.database.clone(),
            self.queue.clone(),
            self.source.clone(),
            self.config.bucket_size,
        )
        .start(
            self.config.delay_duration(),
            self.config.interval_duration(),
        )
    }

    async fn push_to_queue(&self, queue_name: &str, data: &[u8]) -> Result<(), SchedulerError> {
        let physical = format!("{}{}", TASK_QUEUE_PREFIX, queue_name);
        self.queue
            .publish(&physical, data)
            .await
            .map_err(|e| SchedulerError::CannotPublishMessage(e.to_string()))
    }
}

fn validate_request(request: &StartTaskRequest) -> Result<(), SchedulerError> {
    if request.task_name.is_empty() {
        return Err(SchedulerError::TaskRequestInvalid(
            "task name is required".to_string(),
        ));
    }
    if request.queue_name.is_empty() {
        return Err(SchedulerError::TaskRequestInvalid(
            "queue name is required".to_string(),
        ));
    }
    if request.time.timestamp() == 0 {
        return Err(SchedulerError::TaskRequestInvalid(
            "start time is required".to_string(),
        ));
    }
    Ok(())
}
