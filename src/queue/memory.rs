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

//! In-process dispatch queue.
//!
//! Keeps every published message in memory and delivers to subscribed
//! handlers directly. Used by the test suite to observe what the worker
//! dispatched, and usable by single-process embeddings that want the
//! scheduler without a broker.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;

use super::{DispatchQueue, TaskHandler, TaskInfo};
use crate::error::QueueError;

#[derive(Default)]
struct MemoryQueueInner {
    /// Every publish, in order, keyed by queue name.
    published: HashMap<String, Vec<Vec<u8>>>,
    /// Registered consumers: queue name -> [(group, handler)].
    subscribers: HashMap<String, Vec<(String, TaskHandler)>>,
}

/// An in-memory [`DispatchQueue`].
#[derive(Default)]
pub struct MemoryQueue {
    inner: Mutex<MemoryQueueInner>,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Payloads published to `queue_name`, oldest first.
    pub fn published(&self, queue_name: &str) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().expect("memory queue poisoned");
        inner.published.get(queue_name).cloned().unwrap_or_default()
    }

    /// Total number of publishes across all queues.
    pub fn published_count(&self) -> usize {
        let inner = self.inner.lock().expect("memory queue poisoned");
        inner.published.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl DispatchQueue for MemoryQueue {
    async fn publish(&self, queue_name: &str, payload: &[u8]) -> Result<(), QueueError> {
        let handlers = {
            let mut inner = self.inner.lock().expect("memory queue poisoned");
            inner
                .published
                .entry(queue_name.to_string())
                .or_default()
                .push(payload.to_vec());

            // One delivery per group: the first registered member wins.
            let mut seen_groups = Vec::new();
            let mut handlers = Vec::new();
            if let Some(subscribers) = inner.subscribers.get(queue_name) {
                for (group, handler) in subscribers {
                    if !seen_groups.contains(group) {
                        seen_groups.push(group.clone());
                        handlers.push(handler.clone());
                    }
                }
            }
            handlers
        };

        for handler in handlers {
            let info = TaskInfo {
                data: payload.to_vec(),
            };
            tokio::spawn(handler(info));
        }

        Ok(())
    }

    async fn subscribe_group(
        &self,
        queue_name: &str,
        group: &str,
        handler: TaskHandler,
    ) -> Result<(), QueueError> {
        let mut inner = self.inner.lock().expect("memory queue poisoned");
        inner
            .subscribers
            .entry(queue_name.to_string())
            .or_default()
            .push((group.to_string(), handler));
        Ok(())
    }
}
