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

//! Completion Audit Data Access Layer
//!
//! Append-only writes to `scheduler_done`. Recording is best-effort from
//! the worker's perspective: a failed audit insert is logged and never
//! rolls back the dispatch it describes.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::DAL;
use crate::database::schema::scheduler_done;
use crate::error::SchedulerError;
use crate::models::done::{DispatchStatus, NewDoneRecord};
use crate::models::format_rfc3339;

/// Data Access Layer for the dispatch audit trail.
pub struct DoneDAL<'a> {
    pub dal: &'a DAL,
}

impl<'a> DoneDAL<'a> {
    /// Appends one audit row for a dispatch attempt.
    pub async fn record(
        &self,
        bucket: i64,
        task_id: i64,
        status: DispatchStatus,
        operation_time: DateTime<Utc>,
    ) -> Result<(), SchedulerError> {
        let conn = self.dal.database.get_connection().await?;

        let record = NewDoneRecord {
            bucket,
            task_id,
            operation_time: format_rfc3339(operation_time),
            status: status.as_str().to_string(),
        };

        conn.interact(move |conn| {
            diesel::insert_into(scheduler_done::table)
                .values(&record)
                .execute(conn)
        })
        .await
        .map_err(|e| SchedulerError::Database(e.to_string()))??;

        Ok(())
    }
}
