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

//! PostgreSQL-backed dispatch queue.
//!
//! Publishes land in the `scheduler_queue` outbox table followed by a
//! `NOTIFY` on a shared channel carrying the queue name. Subscribing
//! registers the consumer group in `scheduler_queue_groups`; publish fans
//! one outbox row out to every registered group, so distinct groups each
//! receive their own copy of every message while members of the same
//! group compete for theirs. A message published before any group exists
//! is held with an empty group marker and goes to whichever group claims
//! it first.
//!
//! Consumers LISTEN for wakeups and claim with `DELETE ... RETURNING` on
//! the oldest row for their `(queue, group)`, using `FOR UPDATE SKIP
//! LOCKED` so competing members never block each other. A periodic poll
//! backstops missed notifications.
//!
//! Delivery is at-least-once: a consumer that dies after claiming but
//! before finishing loses the message from the table's perspective, and a
//! handler that panics has still consumed its claim. Handlers run under
//! the configured task timeout.

use async_trait::async_trait;
use diesel::prelude::*;
use diesel::sql_types::{Bytea, Text};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{DispatchQueue, TaskHandler, TaskInfo};
use crate::database::schema::{scheduler_queue, scheduler_queue_groups};
use crate::database::Database;
use crate::error::QueueError;

/// Shared NOTIFY channel; the payload is the logical queue name.
const NOTIFY_CHANNEL: &str = "taskmill_queue_ready";

/// Fallback poll interval when notifications go missing.
const POLL_FALLBACK: Duration = Duration::from_secs(30);

#[derive(QueryableByName)]
struct ClaimedPayload {
    #[diesel(sql_type = Bytea)]
    payload: Vec<u8>,
}

/// A [`DispatchQueue`] backed by the scheduler's own PostgreSQL database.
pub struct PostgresQueue {
    database: Database,
    task_timeout: Duration,
    shutdown: Arc<AtomicBool>,
}

impl PostgresQueue {
    pub fn new(database: Database, task_timeout: Duration) -> Self {
        Self {
            database,
            task_timeout,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Signals every consumer loop spawned from this queue to stop after
    /// its current message.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Claims the oldest pending message for `(queue_name, group)`, if
    /// any. Messages still unassigned to a group (published before any
    /// group was registered) are also eligible.
    ///
    /// Exposed for pull-based consumers that drive their own cadence
    /// instead of subscribing.
    pub async fn try_claim(
        &self,
        queue_name: &str,
        group: &str,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        Self::claim_one(&self.database, queue_name, group).await
    }

    async fn claim_one(
        database: &Database,
        queue_name: &str,
        group: &str,
    ) -> Result<Option<Vec<u8>>, QueueError> {
        let conn = database
            .get_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let queue = queue_name.to_string();
        let group = group.to_string();
        let queue_for_err = queue_name.to_string();

        let claimed: Option<ClaimedPayload> = conn
            .interact(move |conn| {
                diesel::sql_query(
                    "DELETE FROM scheduler_queue WHERE id = ( \
                       SELECT id FROM scheduler_queue \
                       WHERE queue_name = $1 AND group_name IN ($2, '') \
                       ORDER BY id \
                       LIMIT 1 \
                       FOR UPDATE SKIP LOCKED \
                     ) RETURNING payload",
                )
                .bind::<Text, _>(queue)
                .bind::<Text, _>(group)
                .get_result(conn)
                .optional()
            })
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?
            .map_err(|e| QueueError::Subscribe {
                queue: queue_for_err,
                message: e.to_string(),
            })?;

        Ok(claimed.map(|c| c.payload))
    }

    /// Registers `group` as a consumer group of `queue_name`, so publish
    /// fans a copy of each message out to it.
    async fn register_group(&self, queue_name: &str, group: &str) -> Result<(), QueueError> {
        let conn = self
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        let queue = queue_name.to_string();
        let group = group.to_string();
        let queue_for_err = queue_name.to_string();

        conn.interact(move |conn| {
            diesel::insert_into(scheduler_queue_groups::table)
                .values((
                    scheduler_queue_groups::queue_name.eq(&queue),
                    scheduler_queue_groups::group_name.eq(&group),
                ))
                .on_conflict_do_nothing()
                .execute(conn)
        })
        .await
        .map_err(|e| QueueError::Connection(e.to_string()))?
        .map_err(|e| QueueError::Subscribe {
            queue: queue_for_err,
            message: e.to_string(),
        })?;

        Ok(())
    }

    /// Spawns the LISTEN connection and forwards wakeups for `queue_name`
    /// into `wakeup_tx`.
    async fn spawn_listener(
        connection_url: String,
        queue_name: String,
        wakeup_tx: mpsc::UnboundedSender<()>,
        shutdown: Arc<AtomicBool>,
    ) -> Result<(), QueueError> {
        use futures::StreamExt;

        let (client, mut connection) = tokio_postgres::connect(&connection_url, tokio_postgres::NoTls)
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let (tx, mut rx) = mpsc::unbounded_channel();

        let conn_shutdown = shutdown.clone();
        tokio::spawn(async move {
            let stream = futures::stream::poll_fn(move |cx| connection.poll_message(cx));
            futures::pin_mut!(stream);

            while !conn_shutdown.load(Ordering::SeqCst) {
                match stream.next().await {
                    Some(Ok(msg)) => {
                        if tx.send(msg).is_err() {
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("queue listener connection error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        });

        client
            .batch_execute(&format!("LISTEN {}", NOTIFY_CHANNEL))
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;
        info!(
            "queue listener started on channel '{}' for queue '{}'",
            NOTIFY_CHANNEL, queue_name
        );

        tokio::spawn(async move {
            // Keep the client alive for the duration of the listen loop.
            let _client = client;

            while !shutdown.load(Ordering::SeqCst) {
                match rx.recv().await {
                    Some(tokio_postgres::AsyncMessage::Notification(notification)) => {
                        if notification.payload() == queue_name {
                            debug!("wakeup for queue '{}'", queue_name);
                            if wakeup_tx.send(()).is_err() {
                                break;
                            }
                        }
                    }
                    Some(_) => {}
                    None => break,
                }
            }
        });

        Ok(())
    }
}

#[async_trait]
impl DispatchQueue for PostgresQueue {
    async fn publish(&self, queue_name: &str, payload: &[u8]) -> Result<(), QueueError> {
        let conn = self
            .database
            .get_connection()
            .await
            .map_err(|e| QueueError::Connection(e.to_string()))?;

        let queue = queue_name.to_string();
        let queue_for_err = queue_name.to_string();
        let payload = payload.to_vec();

        conn.interact(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                let groups: Vec<String> = scheduler_queue_groups::table
                    .filter(scheduler_queue_groups::queue_name.eq(&queue))
                    .select(scheduler_queue_groups::group_name)
                    .load(conn)?;

                // No group registered yet: hold the message unassigned so
                // the first group to claim it picks it up.
                let groups = if groups.is_empty() {
                    vec![String::new()]
                } else {
                    groups
                };

                let rows: Vec<_> = groups
                    .iter()
                    .map(|group| {
                        (
                            scheduler_queue::queue_name.eq(&queue),
                            scheduler_queue::group_name.eq(group),
                            scheduler_queue::payload.eq(&payload),
                        )
                    })
                    .collect();
                diesel::insert_into(scheduler_queue::table)
                    .values(&rows)
                    .execute(conn)?;

                diesel::sql_query("SELECT pg_notify($1, $2)")
                    .bind::<Text, _>(NOTIFY_CHANNEL)
                    .bind::<Text, _>(&queue)
                    .execute(conn)?;

                Ok(())
            })
        })
        .await
        .map_err(|e| QueueError::Connection(e.to_string()))?
        .map_err(|e| QueueError::Publish {
            queue: queue_for_err,
            message: e.to_string(),
        })?;

        Ok(())
    }

    async fn subscribe_group(
        &self,
        queue_name: &str,
        group: &str,
        handler: TaskHandler,
    ) -> Result<(), QueueError> {
        self.register_group(queue_name, group).await?;

        let (wakeup_tx, mut wakeup_rx) = mpsc::unbounded_channel();

        Self::spawn_listener(
            self.database.connection_url().to_string(),
            queue_name.to_string(),
            wakeup_tx,
            self.shutdown.clone(),
        )
        .await?;

        let database = self.database.clone();
        let shutdown = self.shutdown.clone();
        let task_timeout = self.task_timeout;
        let queue_name = queue_name.to_string();
        let group = group.to_string();

        tokio::spawn(async move {
            info!("consumer group '{}' started on queue '{}'", group, queue_name);

            while !shutdown.load(Ordering::SeqCst) {
                // Drain everything pending before sleeping again.
                loop {
                    match Self::claim_one(&database, &queue_name, &group).await {
                        Ok(Some(payload)) => {
                            let info = TaskInfo { data: payload };
                            debug!("start handle task on queue '{}'", queue_name);
                            if tokio::time::timeout(task_timeout, handler(info)).await.is_err() {
                                warn!(
                                    "task handler on queue '{}' exceeded timeout of {:?}",
                                    queue_name, task_timeout
                                );
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("claim on queue '{}' failed: {}", queue_name, e);
                            break;
                        }
                    }
                }

                let _ = tokio::time::timeout(POLL_FALLBACK, wakeup_rx.recv()).await;
            }

            info!("consumer group '{}' on queue '{}' stopped", group, queue_name);
        });

        Ok(())
    }
}
