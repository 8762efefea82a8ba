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

//! Diesel schema for the scheduler tables.
//!
//! `start_time`, `next_time` and `operation_time` are RFC 3339 text for
//! cross-tool readability; `next` is denormalized unix seconds used for
//! bucket arithmetic. `scheduler_done` carries no database-level primary
//! key; the declaration below exists only to satisfy diesel.

diesel::table! {
    scheduler_tasks (id) {
        id -> Int4,
        task_name -> Nullable<Text>,
        queue_name -> Text,
        data -> Nullable<Bytea>,
        done -> Bool,
        loop_index -> Int8,
        loop_count -> Int8,
        next -> Int8,
        interval -> Int8,
        start_time -> Text,
        next_time -> Text,
        source -> Text,
    }
}

diesel::table! {
    scheduler_todo (task_id) {
        task_id -> Int8,
        bucket -> Int8,
        next_time -> Text,
        source -> Text,
    }
}

diesel::table! {
    scheduler_done (task_id, operation_time) {
        bucket -> Int8,
        task_id -> Int8,
        operation_time -> Text,
        status -> Text,
    }
}

diesel::table! {
    scheduler_queue (id) {
        id -> Int8,
        queue_name -> Text,
        group_name -> Text,
        payload -> Bytea,
        published_at -> Timestamptz,
    }
}

diesel::table! {
    scheduler_queue_groups (queue_name, group_name) {
        queue_name -> Text,
        group_name -> Text,
    }
}

diesel::allow_tables_to_appear_in_same_query!(
    scheduler_tasks,
    scheduler_todo,
    scheduler_done,
    scheduler_queue,
    scheduler_queue_groups,
);
