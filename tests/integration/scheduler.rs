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

//! Integration tests for the scheduler API: enrollment idempotence,
//! replacement semantics, expiry, one-time tasks and direct triggering.

use crate::fixtures::get_or_init_fixture;
use chrono::{Duration, Utc};
use diesel::prelude::*;
use serial_test::serial;
use std::sync::Arc;
use taskmill::database::schema::{scheduler_tasks, scheduler_todo};
use taskmill::{
    Database, MemoryQueue, Scheduler, SchedulerConfig, SchedulerError, StartTaskRequest,
};

pub const SOURCE: &str = "it-test";

pub fn scheduler_with_queue(db: Database) -> (Scheduler, Arc<MemoryQueue>) {
    let queue = Arc::new(MemoryQueue::new());
    let scheduler = Scheduler::new(db, queue.clone(), SchedulerConfig::default(), SOURCE);
    (scheduler, queue)
}

pub async fn count_tasks_named(db: &Database, name: &str) -> i64 {
    let conn = db.get_connection().await.unwrap();
    let name = name.to_string();
    conn.interact(move |conn| {
        scheduler_tasks::table
            .filter(scheduler_tasks::task_name.eq(Some(name)))
            .count()
            .first(conn)
    })
    .await
    .unwrap()
    .unwrap()
}

pub async fn count_todos_for(db: &Database, task_id: i64) -> i64 {
    let conn = db.get_connection().await.unwrap();
    conn.interact(move |conn| {
        scheduler_todo::table
            .filter(scheduler_todo::task_id.eq(task_id))
            .count()
            .first(conn)
    })
    .await
    .unwrap()
    .unwrap()
}

fn base_request(name: &str) -> StartTaskRequest {
    StartTaskRequest {
        task_name: name.to_string(),
        queue_name: "Q".to_string(),
        data: b"payload".to_vec(),
        time: Utc::now() + Duration::seconds(60),
        interval: 2,
        loop_count: 5,
    }
}

#[tokio::test]
#[serial]
async fn duplicate_enroll_is_idempotent() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();
    let (scheduler, _queue) = scheduler_with_queue(db.clone());

    let request = base_request("T");
    let task_id = scheduler.start_task(request.clone()).await.unwrap();

    let second = scheduler.start_task(request).await;
    match second {
        Err(SchedulerError::TaskAlreadyExisted(existing)) => assert_eq!(existing, task_id),
        other => panic!("expected TaskAlreadyExisted, got {:?}", other.map(|_| ())),
    }

    assert_eq!(count_tasks_named(&db, "T").await, 1);
    assert_eq!(count_todos_for(&db, task_id).await, 1);
}

#[tokio::test]
#[serial]
async fn payload_change_alone_does_not_replace() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();
    let (scheduler, _queue) = scheduler_with_queue(db.clone());

    let request = base_request("T");
    let task_id = scheduler.start_task(request.clone()).await.unwrap();

    let mut with_new_payload = request;
    with_new_payload.data = b"different".to_vec();
    let second = scheduler.start_task(with_new_payload).await;
    assert!(matches!(
        second,
        Err(SchedulerError::TaskAlreadyExisted(id)) if id == task_id
    ));

    // The old payload silently persists.
    let task = fixture.get_dal().task().load(task_id).await.unwrap();
    assert_eq!(task.data.as_deref(), Some(b"payload".as_ref()));
}

#[tokio::test]
#[serial]
async fn replacement_swaps_parameters_atomically() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();
    let (scheduler, _queue) = scheduler_with_queue(db.clone());

    let request = base_request("T");
    let old_id = scheduler.start_task(request.clone()).await.unwrap();

    let mut changed = request;
    changed.interval = 3;
    let new_id = scheduler.start_task(changed).await.unwrap();
    assert_ne!(old_id, new_id);

    assert_eq!(count_tasks_named(&db, "T").await, 1);
    assert_eq!(count_todos_for(&db, old_id).await, 0);
    assert_eq!(count_todos_for(&db, new_id).await, 1);

    let task = fixture.get_dal().task().load(new_id).await.unwrap();
    assert_eq!(task.interval, 3);

    let old = fixture.get_dal().task().load(old_id).await;
    assert!(matches!(old, Err(SchedulerError::NotFoundInDb)));
}

#[tokio::test]
#[serial]
async fn expired_one_shot_writes_nothing() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();
    let (scheduler, _queue) = scheduler_with_queue(db.clone());

    let mut request = base_request("expired");
    request.interval = 0;
    request.loop_count = 0;
    request.time = Utc::now() - Duration::seconds(10);

    let result = scheduler.start_task(request).await;
    assert!(matches!(result, Err(SchedulerError::TaskExpired)));
    assert_eq!(count_tasks_named(&db, "expired").await, 0);
}

#[tokio::test]
#[serial]
async fn unbounded_loop_count_is_normalized() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let (scheduler, _queue) = scheduler_with_queue(fixture.get_database());

    let mut request = base_request("forever");
    request.loop_count = -1;
    let task_id = scheduler.start_task(request).await.unwrap();

    let task = fixture.get_dal().task().load(task_id).await.unwrap();
    assert_eq!(task.loop_count, i64::MAX);
}

#[tokio::test]
#[serial]
async fn negative_interval_is_rejected() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let (scheduler, _queue) = scheduler_with_queue(fixture.get_database());

    let mut request = base_request("bad");
    request.interval = -1;
    let result = scheduler.start_task(request).await;
    assert!(matches!(
        result,
        Err(SchedulerError::TaskRequestInvalid(_))
    ));
}

#[tokio::test]
#[serial]
async fn one_time_task_synthesizes_unique_names() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let (scheduler, _queue) = scheduler_with_queue(fixture.get_database());

    let when = Utc::now() + Duration::seconds(60);
    let (name_a, id_a) = scheduler
        .start_one_time_task("Q", when, b"a".to_vec())
        .await
        .unwrap();
    let (name_b, id_b) = scheduler
        .start_one_time_task("Q", when, b"b".to_vec())
        .await
        .unwrap();

    assert!(name_a.starts_with("onetime_Q_"));
    assert_ne!(name_a, name_b);
    assert_ne!(id_a, id_b);

    let task = fixture.get_dal().task().load(id_a).await.unwrap();
    assert_eq!(task.interval, 0);
    assert_eq!(task.loop_count, 0);
}

#[tokio::test]
#[serial]
async fn one_time_task_in_the_past_is_invalid() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let (scheduler, _queue) = scheduler_with_queue(fixture.get_database());

    let result = scheduler
        .start_one_time_task("Q", Utc::now() - Duration::seconds(5), Vec::new())
        .await;
    assert!(matches!(
        result,
        Err(SchedulerError::TaskRequestInvalid(_))
    ));
}

#[tokio::test]
#[serial]
async fn trigger_task_publishes_immediately() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let (scheduler, queue) = scheduler_with_queue(fixture.get_database());

    scheduler.trigger_task("Q", b"now").await.unwrap();

    assert_eq!(queue.published("task_queue_Q"), vec![b"now".to_vec()]);
    assert_eq!(count_tasks_named(&fixture.get_database(), "Q").await, 0);
}

#[tokio::test]
#[serial]
async fn stop_task_removes_task_and_occurrence() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();
    let (scheduler, _queue) = scheduler_with_queue(db.clone());

    let task_id = scheduler.start_task(base_request("stopme")).await.unwrap();
    scheduler.stop_task(task_id).await.unwrap();

    assert_eq!(count_tasks_named(&db, "stopme").await, 0);
    assert_eq!(count_todos_for(&db, task_id).await, 0);
}
