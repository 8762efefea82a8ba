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

//! Integration tests for the PostgreSQL-backed dispatch queue.

use crate::fixtures::get_or_init_fixture;
use serial_test::serial;
use std::sync::Arc;
use std::time::Duration;
use taskmill::{DispatchQueue, PostgresQueue, TaskInfo};
use tokio::sync::mpsc;

fn forwarding_handler(tx: mpsc::UnboundedSender<Vec<u8>>) -> taskmill::TaskHandler {
    Arc::new(move |info: TaskInfo| {
        let tx = tx.clone();
        Box::pin(async move {
            let _ = tx.send(info.data);
        })
    })
}

#[tokio::test]
#[serial]
async fn claims_are_fifo_per_queue() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();

    let queue = PostgresQueue::new(db, Duration::from_secs(120));
    queue.publish("q1", b"first").await.unwrap();
    queue.publish("q1", b"second").await.unwrap();
    queue.publish("q2", b"other").await.unwrap();

    assert_eq!(
        queue.try_claim("q1", "workers").await.unwrap(),
        Some(b"first".to_vec())
    );
    assert_eq!(
        queue.try_claim("q1", "workers").await.unwrap(),
        Some(b"second".to_vec())
    );
    assert_eq!(queue.try_claim("q1", "workers").await.unwrap(), None);

    // q2 was untouched by the q1 claims.
    assert_eq!(
        queue.try_claim("q2", "workers").await.unwrap(),
        Some(b"other".to_vec())
    );
}

#[tokio::test]
#[serial]
async fn subscriber_receives_published_payloads() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();

    let queue = PostgresQueue::new(db, Duration::from_secs(120));
    let (tx, mut rx) = mpsc::unbounded_channel();

    queue
        .subscribe_group("subq", "group-a", forwarding_handler(tx))
        .await
        .unwrap();

    queue.publish("subq", b"hello").await.unwrap();

    let received = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("no delivery within timeout")
        .expect("subscriber channel closed");
    assert_eq!(received, b"hello".to_vec());

    queue.shutdown();
}

#[tokio::test]
#[serial]
async fn distinct_groups_each_receive_a_copy() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();

    let queue = PostgresQueue::new(db, Duration::from_secs(120));
    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();

    queue
        .subscribe_group("fanout", "group-a", forwarding_handler(tx_a))
        .await
        .unwrap();
    queue
        .subscribe_group("fanout", "group-b", forwarding_handler(tx_b))
        .await
        .unwrap();

    queue.publish("fanout", b"copy").await.unwrap();

    // Independent groups both see the message.
    let received_a = tokio::time::timeout(Duration::from_secs(10), rx_a.recv())
        .await
        .expect("group-a saw no delivery within timeout")
        .expect("group-a channel closed");
    assert_eq!(received_a, b"copy".to_vec());

    let received_b = tokio::time::timeout(Duration::from_secs(10), rx_b.recv())
        .await
        .expect("group-b saw no delivery within timeout")
        .expect("group-b channel closed");
    assert_eq!(received_b, b"copy".to_vec());

    // One copy per group, no duplicates.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(rx_a.try_recv().is_err());
    assert!(rx_b.try_recv().is_err());

    queue.shutdown();
}

#[tokio::test]
#[serial]
async fn same_group_members_compete_for_each_copy() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();

    let queue = PostgresQueue::new(db, Duration::from_secs(120));

    // Register both groups, then claim directly: each group drains its
    // own copy exactly once.
    let (tx_a, _rx_a) = mpsc::unbounded_channel();
    let (tx_b, _rx_b) = mpsc::unbounded_channel();
    queue
        .subscribe_group("claims", "group-a", forwarding_handler(tx_a))
        .await
        .unwrap();
    queue
        .subscribe_group("claims", "group-b", forwarding_handler(tx_b))
        .await
        .unwrap();
    // Stop the background consumers so manual claims below are the only
    // readers left.
    queue.shutdown();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let db2 = fixture.get_database();
    let claimer = PostgresQueue::new(db2, Duration::from_secs(120));
    claimer.publish("claims", b"each").await.unwrap();

    assert_eq!(
        claimer.try_claim("claims", "group-a").await.unwrap(),
        Some(b"each".to_vec())
    );
    // A second member of group-a finds its group's copy already consumed.
    assert_eq!(claimer.try_claim("claims", "group-a").await.unwrap(), None);
    // group-b still has its own copy.
    assert_eq!(
        claimer.try_claim("claims", "group-b").await.unwrap(),
        Some(b"each".to_vec())
    );
    assert_eq!(claimer.try_claim("claims", "group-b").await.unwrap(), None);
}

#[tokio::test]
#[serial]
async fn messages_published_before_subscription_are_drained() {
    let fixture = get_or_init_fixture().await;
    let mut fixture = fixture.lock().unwrap_or_else(|e| e.into_inner());
    fixture.reset_database().await;
    let db = fixture.get_database();

    let queue = PostgresQueue::new(db, Duration::from_secs(120));
    queue.publish("backlog", b"early").await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    queue
        .subscribe_group("backlog", "group-a", forwarding_handler(tx))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(10), rx.recv())
        .await
        .expect("backlog message was not drained")
        .expect("subscriber channel closed");
    assert_eq!(received, b"early".to_vec());

    queue.shutdown();
}
