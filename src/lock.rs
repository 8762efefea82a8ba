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

//! Distributed mutex over PostgreSQL advisory locks.
//!
//! Lock keys are strings hashed into the 64-bit advisory-lock space with
//! FNV-1a. Acquisition is non-blocking: if another session owns the hashed
//! key, [`LockError::Held`] is returned and the caller skips the task for
//! this tick. Advisory locks are session-scoped, so the guard owns a pooled
//! connection for its whole lifetime; losing that session (process crash,
//! dropped connection) releases the lock on the server with no operator
//! intervention.
//!
//! Hash collisions across the `TASK:<id>` namespace are possible but
//! vanishingly rare; a collision delays one task by a tick, it never
//! double-dispatches.

use diesel::prelude::*;
use diesel::sql_types::{BigInt, Bool};
use tracing::warn;

use crate::database::{Database, PooledConnection};
use crate::error::LockError;

/// Builds the advisory-lock key for a task.
pub fn task_lock_key(task_id: i64) -> String {
    format!("TASK:{}", task_id)
}

/// Hashes a lock key into the 64-bit advisory-lock space (FNV-1a).
pub fn lock_id_from_key(key: &str) -> i64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

    let mut hash = FNV_OFFSET;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash as i64
}

#[derive(QueryableByName)]
struct LockResult {
    #[diesel(sql_type = Bool)]
    ok: bool,
}

/// A held advisory lock.
///
/// Holds its database session until released. Prefer [`release`] on every
/// path; if the guard is dropped unreleased, the underlying connection is
/// detached from the pool so the server frees the lock when the session
/// closes, instead of a recycled connection silently keeping it.
///
/// [`release`]: AdvisoryLock::release
pub struct AdvisoryLock {
    conn: Option<PooledConnection>,
    lock_id: i64,
    key: String,
}

impl AdvisoryLock {
    /// Attempts to acquire the lock for `key` without blocking.
    pub async fn try_acquire(database: &Database, key: &str) -> Result<Self, LockError> {
        let conn = database
            .get_connection()
            .await
            .map_err(|e| LockError::Database(e.to_string()))?;

        let lock_id = lock_id_from_key(key);
        let result: LockResult = conn
            .interact(move |conn| {
                diesel::sql_query("SELECT pg_try_advisory_lock($1) AS ok")
                    .bind::<BigInt, _>(lock_id)
                    .get_result(conn)
            })
            .await
            .map_err(|e| LockError::Database(e.to_string()))?
            .map_err(|e| LockError::Database(e.to_string()))?;

        if !result.ok {
            return Err(LockError::Held);
        }

        Ok(Self {
            conn: Some(conn),
            lock_id,
            key: key.to_string(),
        })
    }

    /// Releases the lock on the session that acquired it.
    pub async fn release(mut self) -> Result<(), LockError> {
        let conn = self.conn.take().expect("lock already released");
        let lock_id = self.lock_id;

        let result: Result<LockResult, LockError> = conn
            .interact(move |conn| {
                diesel::sql_query("SELECT pg_advisory_unlock($1) AS ok")
                    .bind::<BigInt, _>(lock_id)
                    .get_result(conn)
            })
            .await
            .map_err(|e| LockError::Database(e.to_string()))
            .and_then(|r| r.map_err(|e| LockError::Database(e.to_string())));

        match result {
            Ok(r) if r.ok => Ok(()),
            Ok(_) => Err(LockError::NotHeld),
            Err(e) => {
                // The session state is unknown; detach the connection so the
                // server releases the lock when it closes.
                drop(deadpool::managed::Object::take(conn));
                Err(e)
            }
        }
    }

    /// The string key this lock was acquired for.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl Drop for AdvisoryLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(
                "advisory lock {} dropped without release; detaching its session",
                self.key
            );
            drop(deadpool::managed::Object::take(conn));
        }
    }
}
