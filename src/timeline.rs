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

//! Timeline arithmetic for the scheduler.
//!
//! Two pure functions live here: the time bucketizer that partitions the
//! wall clock into fixed windows, and the recurrence calculator that derives
//! the next occurrence of a repeating task from its start time and interval.
//!
//! The worker polls for occurrences whose bucket is at or before the current
//! one, so occurrences left behind by downtime or clock skew are still
//! picked up on the next tick.

use chrono::{DateTime, TimeZone, Utc};

/// Default width of a scheduling bucket in seconds.
pub const DEFAULT_BUCKET_SIZE: i64 = 60;

/// Sentinel loop index meaning "no further occurrences".
///
/// Returned by [`next_occurrence`] for non-repeating tasks; always compares
/// greater than or equal to any loop count, which routes the task to its
/// terminal state.
pub const LOOP_INDEX_EXHAUSTED: i64 = i64::MAX;

/// Maps an absolute instant to its integer bucket id.
///
/// Buckets partition the timeline into `bucket_size`-second windows:
/// `bucket(t) * bucket_size <= unix_seconds(t) < (bucket(t) + 1) * bucket_size`
/// holds for every `t`.
pub fn bucket_of(t: DateTime<Utc>, bucket_size: i64) -> i64 {
    t.timestamp().div_euclid(bucket_size)
}

/// Computes `(loop_index, next_fire_time)` for a task.
///
/// - `interval_seconds <= 0` yields `(LOOP_INDEX_EXHAUSTED, epoch zero)`:
///   the task has no further occurrences.
/// - A start time at or after `now` yields `(0, start)`.
/// - Otherwise the occurrence counter is recomputed from wall clock:
///   `k = (now - start) / interval + 1`, firing at `start + k * interval`.
///
/// The recompute self-corrects after downtime: however long the scheduler
/// was offline, the next fire lands on the first grid point after `now`,
/// aligned to `start mod interval`. Overflow of `k * interval` is not
/// defended; callers bound `loop_count` when the interval is large.
pub fn next_occurrence(
    start: DateTime<Utc>,
    interval_seconds: i64,
    now: DateTime<Utc>,
) -> (i64, DateTime<Utc>) {
    if interval_seconds <= 0 {
        let epoch = Utc
            .timestamp_opt(0, 0)
            .single()
            .expect("epoch zero is representable");
        return (LOOP_INDEX_EXHAUSTED, epoch);
    }

    let start_secs = start.timestamp();
    let now_secs = now.timestamp();

    if start_secs >= now_secs {
        return (0, start);
    }

    let loop_index = (now_secs - start_secs) / interval_seconds + 1;
    let next_secs = start_secs + loop_index * interval_seconds;
    (
        loop_index,
        Utc.timestamp_opt(next_secs, 0)
            .single()
            .expect("next fire time out of representable range"),
    )
}
