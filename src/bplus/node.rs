// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::value::Value;

/// Arena id of a node.
pub(crate) type NodeId = usize;

/// A B+ tree node.
///
/// Internal nodes hold separator `keys` and `children`; leaves hold
/// `(key, payload)` `entries` and the `next` sibling link.
#[derive(Clone, Debug)]
pub(crate) struct Node {
    pub is_leaf: bool,
    pub keys: Vec<Value>,
    pub children: Vec<NodeId>,
    pub entries: Vec<(Value, Value)>,
    pub next: Option<NodeId>,
}

impl Node {
    pub fn new_leaf() -> Self {
        Self {
            is_leaf: true,
            keys: Vec::new(),
            children: Vec::new(),
            entries: Vec::new(),
            next: None,
        }
    }

    pub fn new_internal() -> Self {
        Self {
            is_leaf: false,
            keys: Vec::new(),
            children: Vec::new(),
            entries: Vec::new(),
            next: None,
        }
    }

    /// Occupancy measure used by the `t-1..=2t-1` bounds: entry count for
    /// leaves, separator count for internal nodes.
    pub fn key_count(&self) -> usize {
        if self.is_leaf {
            self.entries.len()
        } else {
            self.keys.len()
        }
    }
}
