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

//! Completion Audit Model
//!
//! Append-only log of dispatch attempts. Rows are never deleted by the
//! scheduler; the audit table is the durable trail of what happened to
//! each occurrence.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

/// Outcome of a single dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    Done,
    Fail,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Done => "Done",
            DispatchStatus::Fail => "Fail",
        }
    }
}

/// An audit row in `scheduler_done`.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = crate::database::schema::scheduler_done)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct DoneRecord {
    /// Bucket the occurrence was drained from
    pub bucket: i64,
    /// Task the attempt belongs to
    pub task_id: i64,
    /// RFC 3339 instant of the attempt
    pub operation_time: String,
    /// `"Done"` or `"Fail"`
    pub status: String,
}

/// An audit row to be appended to `scheduler_done`.
#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::database::schema::scheduler_done)]
pub struct NewDoneRecord {
    pub bucket: i64,
    pub task_id: i64,
    pub operation_time: String,
    pub status: String,
}
