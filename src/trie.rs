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

//! Generic prefix search trie.
//!
//! A character-keyed tree over Unicode code points with exact lookup,
//! subtree enumeration, and bounded nearest-N search. Removal is a logical
//! delete: the node structure is retained so that re-insertion under the
//! same prefix stays cheap.

use std::collections::{HashMap, VecDeque};

struct SearchTreeNode<V> {
    children: HashMap<char, SearchTreeNode<V>>,
    value: Option<V>,
}

impl<V> SearchTreeNode<V> {
    fn new() -> Self {
        Self {
            children: HashMap::new(),
            value: None,
        }
    }
}

/// A prefix trie mapping string keys to values of type `V`.
pub struct SearchTree<V> {
    root: SearchTreeNode<V>,
}

impl<V> Default for SearchTree<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SearchTree<V> {
    pub fn new() -> Self {
        Self {
            root: SearchTreeNode::new(),
        }
    }

    /// Inserts `value` under `key`, replacing any existing value.
    pub fn insert(&mut self, key: &str, value: V) {
        let mut node = &mut self.root;
        for ch in key.chars() {
            node = node.children.entry(ch).or_insert_with(SearchTreeNode::new);
        }
        node.value = Some(value);
    }

    /// Returns the value stored under exactly `key`, if any.
    pub fn search_exact(&self, key: &str) -> Option<&V> {
        self.walk(key).and_then(|node| node.value.as_ref())
    }

    /// Collects every value stored under `key` or any extension of it.
    ///
    /// Returns an empty vector when no node matches `key`. Sibling
    /// visitation order is unspecified.
    pub fn search_prefix(&self, key: &str) -> Vec<&V> {
        self.search_nearest_n(key, usize::MAX)
    }

    /// As [`search_prefix`](Self::search_prefix), but stops after
    /// collecting `n` values.
    pub fn search_nearest_n(&self, key: &str, n: usize) -> Vec<&V> {
        let mut result = Vec::new();
        let Some(start) = self.walk(key) else {
            return result;
        };

        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(node) = queue.pop_front() {
            if let Some(value) = node.value.as_ref() {
                result.push(value);
                if result.len() == n {
                    break;
                }
            }
            queue.extend(node.children.values());
        }

        result
    }

    /// Logically deletes `key`: its value is dropped but the node chain is
    /// kept. Returns `false` if no node matched the full key.
    pub fn remove(&mut self, key: &str) -> bool {
        let mut node = &mut self.root;
        for ch in key.chars() {
            match node.children.get_mut(&ch) {
                Some(child) => node = child,
                None => return false,
            }
        }
        node.value = None;
        true
    }

    fn walk(&self, key: &str) -> Option<&SearchTreeNode<V>> {
        let mut node = &self.root;
        for ch in key.chars() {
            node = node.children.get(&ch)?;
        }
        Some(node)
    }
}
