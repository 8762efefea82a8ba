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

//! Task Model
//!
//! The canonical, durable description of a scheduled job. One row per
//! enrolled task; the pending occurrence lives in `scheduler_todo`.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use super::parse_rfc3339;

/// A task row in `scheduler_tasks`.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::scheduler_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Task {
    /// Monotonic identifier assigned by the store at insertion
    pub id: i32,
    /// Opaque name used to detect duplicate re-enrollment
    pub task_name: Option<String>,
    /// Downstream work queue the payload is dispatched onto
    pub queue_name: String,
    /// Opaque payload delivered verbatim to consumers
    pub data: Option<Vec<u8>>,
    /// Terminal flag; once true the task is pending cleanup only
    pub done: bool,
    /// Occurrences already scheduled or advanced past
    pub loop_index: i64,
    /// Number of firings intended; `i64::MAX` means effectively unbounded
    pub loop_count: i64,
    /// Unix seconds of the next intended fire
    pub next: i64,
    /// Repetition interval in seconds; `0` fires exactly once
    pub interval: i64,
    /// RFC 3339 instant of the first intended fire
    pub start_time: String,
    /// RFC 3339 instant of the next intended fire (denormalized)
    pub next_time: String,
    /// Scheduler instance that owns this task
    pub source: String,
}

impl Task {
    /// Parses the persisted start time.
    pub fn start_time_utc(&self) -> Result<DateTime<Utc>, chrono::ParseError> {
        parse_rfc3339(&self.start_time)
    }

    /// The task id as used by occurrence rows and lock keys.
    pub fn task_id(&self) -> i64 {
        self.id as i64
    }
}

/// A task to be inserted into `scheduler_tasks`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::scheduler_tasks)]
pub struct NewTask {
    pub task_name: Option<String>,
    pub queue_name: String,
    pub data: Option<Vec<u8>>,
    pub done: bool,
    pub loop_index: i64,
    pub loop_count: i64,
    pub next: i64,
    pub interval: i64,
    pub start_time: String,
    pub next_time: String,
    pub source: String,
}

impl NewTask {
    /// True when `other` was enrolled with the same scheduling parameters.
    ///
    /// The payload is deliberately not compared: re-enrolling with new data
    /// but identical timing is treated as the same task and the old payload
    /// persists.
    pub fn same_parameters(&self, other: &Task) -> bool {
        other.start_time == self.start_time
            && other.loop_count == self.loop_count
            && other.interval == self.interval
            && other.source == self.source
            && other.queue_name == self.queue_name
    }
}
