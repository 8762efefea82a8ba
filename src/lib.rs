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

//! # taskmill
//!
//! A PostgreSQL-backed delayed-task scheduler for horizontally scaled
//! services. Tasks are enrolled with a start time, a repetition interval
//! and a loop count; a background worker drains due occurrences from a
//! bucketed timeline and dispatches each payload onto a named work queue.
//! A per-task advisory lock guarantees at-most-once dispatch per
//! occurrence even when several scheduler instances race on the same
//! database, and session-scoped lock lifetime makes crash recovery
//! automatic.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskmill::{Database, MemoryQueue, Scheduler, SchedulerConfig, StartTaskRequest};
//!
//! let database = Database::new("postgres://localhost:5432", "taskmill", 10);
//! database.run_migrations().await?;
//!
//! let queue = Arc::new(MemoryQueue::new());
//! let scheduler = Scheduler::new(database, queue, SchedulerConfig::default(), "instance-a");
//!
//! let task_id = scheduler
//!     .start_task(StartTaskRequest {
//!         task_name: "nightly-report".into(),
//!         queue_name: "reports".into(),
//!         data: b"{}".to_vec(),
//!         time: chrono::Utc::now() + chrono::Duration::seconds(60),
//!         interval: 86_400,
//!         loop_count: -1,
//!     })
//!     .await?;
//!
//! let worker = scheduler.spawn_worker();
//! // ... on teardown:
//! worker.shutdown().await;
//! ```

pub mod config;
pub mod dal;
pub mod database;
pub mod error;
pub mod lock;
pub mod models;
pub mod queue;
pub mod scheduler;
pub mod timeline;
pub mod trie;

pub use config::{load_config, ConfigError, CoreConfig, SchedulerConfig};
pub use dal::DAL;
pub use database::Database;
pub use error::{LockError, QueueError, SchedulerError};
pub use queue::{DispatchQueue, MemoryQueue, PostgresQueue, TaskHandler, TaskInfo};
pub use scheduler::{Scheduler, StartTaskRequest, Worker, WorkerHandle};
pub use trie::SearchTree;

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// The filter is taken from `RUST_LOG` when set, falling back to the
/// supplied directive (or `info`). Safe to call more than once; later
/// calls are no-ops.
pub fn init_logging(filter: Option<&str>) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter.unwrap_or("info")));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
