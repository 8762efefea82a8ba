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

//! Task Data Access Layer
//!
//! Transactional operations on `scheduler_tasks` and the occurrence rows
//! that accompany them. Enrollment, advancement and completion each run in
//! a single transaction; at every committed instant a live task has exactly
//! one occurrence row and a finished task has none.

use chrono::{DateTime, Utc};
use diesel::connection::Connection;
use diesel::prelude::*;
use tracing::info;

use super::DAL;
use crate::database::schema::{scheduler_tasks, scheduler_todo};
use crate::error::SchedulerError;
use crate::models::format_rfc3339;
use crate::models::task::{NewTask, Task};
use crate::models::todo::NewTodo;

/// Data Access Layer for task operations.
pub struct TaskDAL<'a> {
    pub dal: &'a DAL,
}

impl<'a> TaskDAL<'a> {
    /// Enrolls a task, inserting it together with its first occurrence.
    ///
    /// If a task with the same name and identical scheduling parameters
    /// already exists, nothing is written and `TaskAlreadyExisted` carries
    /// the existing id. If the name exists with different parameters, the
    /// old task and its occurrence are deleted in the same transaction
    /// before the new rows are inserted (replacement semantics).
    ///
    /// # Arguments
    /// * `new_task` - The task row to insert
    /// * `bucket` - Bucket id of the task's next fire time
    ///
    /// # Returns
    /// * `Result<i64, SchedulerError>` - Id of the newly inserted task
    pub async fn enroll(&self, new_task: NewTask, bucket: i64) -> Result<i64, SchedulerError> {
        let conn = self.dal.database.get_connection().await?;

        let task_id = conn
            .interact(move |conn| {
                conn.transaction::<_, SchedulerError, _>(|conn| {
                    let existing: Option<Task> = scheduler_tasks::table
                        .filter(scheduler_tasks::task_name.eq(new_task.task_name.clone()))
                        .first(conn)
                        .optional()?;

                    if let Some(prev) = existing {
                        if new_task.same_parameters(&prev) {
                            info!(
                                "Task {:?} already exists with id {}",
                                new_task.task_name, prev.id
                            );
                            return Err(SchedulerError::TaskAlreadyExisted(prev.task_id()));
                        }

                        info!(
                            "Replacing task {} (start {}, loop_count {}, interval {})",
                            prev.id, prev.start_time, prev.loop_count, prev.interval
                        );
                        diesel::delete(scheduler_tasks::table.find(prev.id))
                            .execute(conn)
                            .map_err(|e| SchedulerError::RemoveOldTaskFail(e.to_string()))?;
                        diesel::delete(
                            scheduler_todo::table
                                .filter(scheduler_todo::task_id.eq(prev.task_id())),
                        )
                        .execute(conn)
                        .map_err(|e| SchedulerError::RemoveOldTaskFail(e.to_string()))?;
                    }

                    let new_id: i32 = diesel::insert_into(scheduler_tasks::table)
                        .values(&new_task)
                        .returning(scheduler_tasks::id)
                        .get_result(conn)
                        .map_err(|e| SchedulerError::AddTaskFail(e.to_string()))?;

                    let todo = NewTodo {
                        task_id: new_id as i64,
                        bucket,
                        next_time: new_task.next_time.clone(),
                        source: new_task.source.clone(),
                    };
                    diesel::insert_into(scheduler_todo::table)
                        .values(&todo)
                        .execute(conn)
                        .map_err(|e| SchedulerError::AddTaskFail(e.to_string()))?;

                    Ok(new_id as i64)
                })
            })
            .await
            .map_err(|e| SchedulerError::Database(e.to_string()))??;

        info!("Enrolled task {}", task_id);
        Ok(task_id)
    }

    /// Loads a task by id.
    pub async fn load(&self, task_id: i64) -> Result<Task, SchedulerError> {
        let conn = self.dal.database.get_connection().await?;

        let task: Option<Task> = conn
            .interact(move |conn| {
                scheduler_tasks::table
                    .find(task_id as i32)
                    .first(conn)
                    .optional()
            })
            .await
            .map_err(|e| SchedulerError::Database(e.to_string()))??;

        task.ok_or(SchedulerError::NotFoundInDb)
    }

    /// Reschedules a task to its next occurrence.
    ///
    /// In one transaction: deletes the drained occurrence row, inserts the
    /// fresh one, and updates the task's `(next, loop_index, next_time)`.
    pub async fn advance(
        &self,
        task_id: i64,
        old_bucket: i64,
        new_bucket: i64,
        new_loop_index: i64,
        next_fire: DateTime<Utc>,
        source: &str,
    ) -> Result<(), SchedulerError> {
        let conn = self.dal.database.get_connection().await?;
        let source = source.to_string();

        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    scheduler_todo::table
                        .filter(scheduler_todo::task_id.eq(task_id))
                        .filter(scheduler_todo::bucket.eq(old_bucket)),
                )
                .execute(conn)?;

                let next_time = format_rfc3339(next_fire);
                let todo = NewTodo {
                    task_id,
                    bucket: new_bucket,
                    next_time: next_time.clone(),
                    source,
                };
                diesel::insert_into(scheduler_todo::table)
                    .values(&todo)
                    .execute(conn)?;

                diesel::update(scheduler_tasks::table.find(task_id as i32))
                    .set((
                        scheduler_tasks::next.eq(next_fire.timestamp()),
                        scheduler_tasks::loop_index.eq(new_loop_index),
                        scheduler_tasks::next_time.eq(next_time),
                    ))
                    .execute(conn)?;

                Ok(())
            })
        })
        .await
        .map_err(|e| SchedulerError::Database(e.to_string()))??;

        Ok(())
    }

    /// Marks a task done and removes its occurrence, in one transaction.
    pub async fn finish(
        &self,
        task_id: i64,
        old_bucket: i64,
        final_loop_index: i64,
    ) -> Result<(), SchedulerError> {
        let conn = self.dal.database.get_connection().await?;

        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    scheduler_todo::table
                        .filter(scheduler_todo::task_id.eq(task_id))
                        .filter(scheduler_todo::bucket.eq(old_bucket)),
                )
                .execute(conn)?;

                diesel::update(scheduler_tasks::table.find(task_id as i32))
                    .set((
                        scheduler_tasks::done.eq(true),
                        scheduler_tasks::loop_index.eq(final_loop_index),
                    ))
                    .execute(conn)?;

                Ok(())
            })
        })
        .await
        .map_err(|e| SchedulerError::Database(e.to_string()))??;

        info!("Finished task {}", task_id);
        Ok(())
    }

    /// Removes a task and its occurrence, in one transaction.
    pub async fn remove(&self, task_id: i64) -> Result<(), SchedulerError> {
        let conn = self.dal.database.get_connection().await?;

        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::delete(
                    scheduler_todo::table.filter(scheduler_todo::task_id.eq(task_id)),
                )
                .execute(conn)?;
                diesel::delete(scheduler_tasks::table.find(task_id as i32)).execute(conn)?;
                Ok(())
            })
        })
        .await
        .map_err(|e| SchedulerError::StopTaskFail(e.to_string()))?
        .map_err(|e| SchedulerError::StopTaskFail(e.to_string()))?;

        info!("Removed task {}", task_id);
        Ok(())
    }
}
