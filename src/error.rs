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

//! Error types for the scheduler core.
//!
//! Every scheduler-facing error maps to a stable numeric code via
//! [`SchedulerError::code`]; the surrounding service surfaces that code to
//! API callers. Validation and conflict errors reach the caller verbatim;
//! persistence errors roll back their transaction first; coordination
//! errors are swallowed by the worker as "skip this task this tick".

use thiserror::Error;

/// Errors surfaced by the scheduler API and worker.
#[derive(Error, Debug)]
pub enum SchedulerError {
    #[error("Task request is invalid: {0}")]
    TaskRequestInvalid(String),

    #[error("Task is expired")]
    TaskExpired,

    #[error("Task has already existed with id {0}")]
    TaskAlreadyExisted(i64),

    #[error("Add task to system fail: {0}")]
    AddTaskFail(String),

    #[error("Remove old task failed: {0}")]
    RemoveOldTaskFail(String),

    #[error("Stop task fail: {0}")]
    StopTaskFail(String),

    #[error("Not found in database")]
    NotFoundInDb,

    #[error("Database error: {0}")]
    Database(String),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("Cannot publish message: {0}")]
    CannotPublishMessage(String),
}

impl SchedulerError {
    /// Stable numeric code for the surrounding framework's error envelope.
    pub fn code(&self) -> i32 {
        match self {
            SchedulerError::NotFoundInDb => 7,
            SchedulerError::AddTaskFail(_) => 20,
            SchedulerError::TaskRequestInvalid(_) => 23,
            SchedulerError::StopTaskFail(_) => 24,
            SchedulerError::TaskAlreadyExisted(_) => 26,
            SchedulerError::RemoveOldTaskFail(_) => 27,
            SchedulerError::TaskExpired => 28,
            SchedulerError::Database(_) | SchedulerError::Lock(_) => 29,
            SchedulerError::CannotPublishMessage(_) => 37,
        }
    }
}

/// Errors from the advisory-lock distributed mutex.
#[derive(Error, Debug)]
pub enum LockError {
    /// Another session owns the lock; the caller skips the task this tick.
    #[error("lock is already held")]
    Held,

    /// Unlock reported that this session did not hold the lock.
    #[error("lock was not held")]
    NotHeld,

    #[error("failed to operate lock: {0}")]
    Database(String),
}

/// Errors from the dispatch queue adapter.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("cannot publish to queue {queue}: {message}")]
    Publish { queue: String, message: String },

    #[error("cannot subscribe to queue {queue}: {message}")]
    Subscribe { queue: String, message: String },

    #[error("queue connection error: {0}")]
    Connection(String),
}
