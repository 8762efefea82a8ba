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

//! Data Access Layer for the scheduler tables.
//!
//! All task-visible state lives in the database; the DAL exposes the
//! transactional primitives the scheduler and worker are built on. Every
//! multi-statement operation runs inside a single database transaction so
//! that readers never observe a task without its occurrence or vice versa.

mod done;
mod task;
mod todo;

pub use done::DoneDAL;
pub use task::TaskDAL;
pub use todo::TodoDAL;

use crate::database::Database;
use crate::error::SchedulerError;

impl From<diesel::result::Error> for SchedulerError {
    fn from(e: diesel::result::Error) -> Self {
        SchedulerError::Database(e.to_string())
    }
}

/// Entry point for database operations.
///
/// Holds the connection pool; per-table DALs borrow from it.
#[derive(Clone, Debug)]
pub struct DAL {
    pub database: Database,
}

impl DAL {
    pub fn new(database: Database) -> Self {
        Self { database }
    }

    /// Task operations (enroll, load, advance, finish, remove).
    pub fn task(&self) -> TaskDAL {
        TaskDAL { dal: self }
    }

    /// Pending-occurrence operations.
    pub fn todo(&self) -> TodoDAL {
        TodoDAL { dal: self }
    }

    /// Dispatch audit operations.
    pub fn done(&self) -> DoneDAL {
        DoneDAL { dal: self }
    }
}
