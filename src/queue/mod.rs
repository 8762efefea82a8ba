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

//! Work-queue abstraction for task dispatch.
//!
//! The scheduler only ever publishes; consumers (possibly on other hosts)
//! subscribe to named queues and execute payloads. Publish is
//! fire-and-forget from the scheduler's perspective: broker-side
//! persistence and consumer acknowledgment live behind this trait.
//!
//! Two implementations ship with the crate:
//! - [`PostgresQueue`]: an outbox table with LISTEN/NOTIFY wakeups, for
//!   deployments that want no broker beyond the database already in use.
//! - [`MemoryQueue`]: in-process buffers for tests and single-process
//!   embeddings.

mod memory;
mod postgres;

pub use memory::MemoryQueue;
pub use postgres::PostgresQueue;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::QueueError;

/// Physical queue-name prefix for task dispatch queues.
pub const TASK_QUEUE_PREFIX: &str = "task_queue_";

/// A message delivered to a task handler.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub data: Vec<u8>,
}

/// Consumer callback invoked once per delivered message.
pub type TaskHandler = Arc<dyn Fn(TaskInfo) -> BoxFuture<'static, ()> + Send + Sync>;

/// Publish/subscribe contract consumed by the scheduler core.
#[async_trait]
pub trait DispatchQueue: Send + Sync {
    /// Publishes `payload` onto `queue_name`.
    async fn publish(&self, queue_name: &str, payload: &[u8]) -> Result<(), QueueError>;

    /// Registers `handler` as a member of `group` consuming `queue_name`.
    ///
    /// Distinct groups are independent: each group receives its own copy
    /// of every message. Members of the same group compete: each copy is
    /// handled by exactly one member. Delivery is at-least-once; handlers
    /// are expected to tolerate redelivery.
    async fn subscribe_group(
        &self,
        queue_name: &str,
        group: &str,
        handler: TaskHandler,
    ) -> Result<(), QueueError>;
}
