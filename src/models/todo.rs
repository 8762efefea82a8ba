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

//! Occurrence (Todo) Model
//!
//! One row per pending fire of a task. At any committed instant a task has
//! at most one occurrence row; a task with `done = true` has none.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// A pending occurrence in `scheduler_todo`.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::scheduler_todo)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Todo {
    /// Owning task
    pub task_id: i64,
    /// Bucket id of the next fire time
    pub bucket: i64,
    /// RFC 3339 next fire time, for observability
    pub next_time: String,
    /// Mirrored from the task; partitions ownership across instances
    pub source: String,
}

/// An occurrence to be inserted into `scheduler_todo`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::scheduler_todo)]
pub struct NewTodo {
    pub task_id: i64,
    pub bucket: i64,
    pub next_time: String,
    pub source: String,
}
