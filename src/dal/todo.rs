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

//! Occurrence Data Access Layer
//!
//! Read and cleanup operations on `scheduler_todo`. Readiness polling takes
//! no locks; callers mediate dispatch through the per-task advisory lock.

use diesel::prelude::*;

use super::DAL;
use crate::database::schema::scheduler_todo;
use crate::error::SchedulerError;
use crate::models::todo::Todo;

/// Data Access Layer for pending occurrences.
pub struct TodoDAL<'a> {
    pub dal: &'a DAL,
}

impl<'a> TodoDAL<'a> {
    /// Returns every occurrence due at or before `now_bucket` owned by
    /// `source`.
    ///
    /// Past buckets are included so occurrences stranded by downtime or
    /// clock skew are drained on the next tick.
    pub async fn fetch_ready(
        &self,
        now_bucket: i64,
        source: &str,
    ) -> Result<Vec<Todo>, SchedulerError> {
        let conn = self.dal.database.get_connection().await?;
        let source = source.to_string();

        let todos = conn
            .interact(move |conn| {
                scheduler_todo::table
                    .filter(scheduler_todo::bucket.le(now_bucket))
                    .filter(scheduler_todo::source.eq(source))
                    .order(scheduler_todo::bucket.asc())
                    .load(conn)
            })
            .await
            .map_err(|e| SchedulerError::Database(e.to_string()))??;

        Ok(todos)
    }

    /// Deletes the occurrence of a task.
    ///
    /// Used for the delete-only cleanup path when the worker encounters an
    /// occurrence whose task is already done.
    pub async fn delete_for_task(&self, task_id: i64) -> Result<(), SchedulerError> {
        let conn = self.dal.database.get_connection().await?;

        conn.interact(move |conn| {
            diesel::delete(scheduler_todo::table.filter(scheduler_todo::task_id.eq(task_id)))
                .execute(conn)
        })
        .await
        .map_err(|e| SchedulerError::Database(e.to_string()))??;

        Ok(())
    }
}
