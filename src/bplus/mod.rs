// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! In-memory B+ tree with linked leaves, persisted as a whole-image
//! snapshot.
//!
//! For order `t`, a node is full at `2t - 1` keys and every non-root node
//! keeps at least `t - 1`. Leaves hold `(key, payload)` pairs and are
//! chained left-to-right, which makes range scans a single leaf walk.

mod node;

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::value::Value;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use node::{Node, NodeId};
use std::io::{Read, Write};

/// Default tree order.
pub const DEFAULT_ORDER: usize = 3;

enum Matcher<'a> {
    /// Remove the first entry with the key, regardless of payload
    First,

    /// Remove the entry with exactly this payload
    Pair(&'a Value),
}

/// An order-`t` B+ tree mapping keys to payload values (duplicates allowed).
pub struct BPlusTree {
    t: usize,
    root: NodeId,
    nodes: Vec<Node>,
}

impl Default for BPlusTree {
    fn default() -> Self {
        Self::new(DEFAULT_ORDER)
    }
}

impl BPlusTree {
    /// Creates an empty tree of the given order (`t >= 2`).
    #[must_use]
    pub fn new(t: usize) -> Self {
        Self {
            t: t.max(2),
            root: 0,
            nodes: vec![Node::new_leaf()],
        }
    }

    /// The tree order.
    #[must_use]
    pub fn order(&self) -> usize {
        self.t
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    /// Returns `true` if the tree holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.node(self.root).is_leaf && self.node(self.root).entries.is_empty()
    }

    /// Number of levels from root to leaf.
    #[must_use]
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while !self.node(id).is_leaf {
            height += 1;
            id = self.first_child(id);
        }
        height
    }

    fn node(&self, id: NodeId) -> &Node {
        self.nodes.get(id).expect("node id is in the arena")
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node {
        self.nodes.get_mut(id).expect("node id is in the arena")
    }

    fn first_child(&self, id: NodeId) -> NodeId {
        *self.node(id).children.first().expect("internal node has children")
    }

    fn child_at(&self, id: NodeId, idx: usize) -> NodeId {
        *self.node(id).children.get(idx).expect("child index is valid")
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    fn is_full(&self, id: NodeId) -> bool {
        self.node(id).key_count() == 2 * self.t - 1
    }

    /// Index of the child covering `key`: equal-to-separator keys go right.
    fn descent_index(&self, id: NodeId, key: &Value) -> usize {
        self.node(id).keys.partition_point(|k| k <= key)
    }

    /// Inserts a `(key, payload)` entry, splitting full nodes on the way down.
    pub fn add(&mut self, key: Value, payload: Value) {
        if self.is_full(self.root) {
            let old_root = self.root;
            let mut new_root = Node::new_internal();
            new_root.children.push(old_root);
            let new_root = self.alloc(new_root);
            self.split_child(new_root, 0);
            self.root = new_root;
        }
        self.insert_non_full(self.root, key, payload);
    }

    fn insert_non_full(&mut self, id: NodeId, key: Value, payload: Value) {
        if self.node(id).is_leaf {
            let node = self.node_mut(id);
            let pos = node.entries.partition_point(|(k, _)| k <= &key);
            node.entries.insert(pos, (key, payload));
            return;
        }

        let mut idx = self.descent_index(id, &key);
        let child = self.child_at(id, idx);

        if self.is_full(child) {
            self.split_child(id, idx);
            let separator = self
                .node(id)
                .keys
                .get(idx)
                .expect("split inserted a separator")
                .clone();
            if key >= separator {
                idx += 1;
            }
        }

        let child = self.child_at(id, idx);
        self.insert_non_full(child, key, payload);
    }

    /// Splits the full child at `index` of `parent`.
    ///
    /// Leaf split: `2t - 1` entries become `t` (left) and `t - 1` (right),
    /// the separator is the first key of the right leaf and the `next`
    /// links are rethreaded. Internal split: the middle key moves up.
    fn split_child(&mut self, parent: NodeId, index: usize) {
        let child = self.child_at(parent, index);
        let t = self.t;

        if self.node(child).is_leaf {
            let right_entries = self.node_mut(child).entries.split_off(t);
            let old_next = self.node(child).next;

            let mut right = Node::new_leaf();
            right.entries = right_entries;
            right.next = old_next;
            let separator = right
                .entries
                .first()
                .expect("right leaf got t-1 entries")
                .0
                .clone();
            let right = self.alloc(right);

            self.node_mut(child).next = Some(right);
            let parent = self.node_mut(parent);
            parent.keys.insert(index, separator);
            parent.children.insert(index + 1, right);
        } else {
            let right_keys = self.node_mut(child).keys.split_off(t);
            let separator = self
                .node_mut(child)
                .keys
                .pop()
                .expect("full internal node has 2t-1 keys");
            let right_children = self.node_mut(child).children.split_off(t);

            let mut right = Node::new_internal();
            right.keys = right_keys;
            right.children = right_children;
            let right = self.alloc(right);

            let parent = self.node_mut(parent);
            parent.keys.insert(index, separator);
            parent.children.insert(index + 1, right);
        }
    }

    fn find_leaf(&self, key: &Value) -> NodeId {
        let mut id = self.root;
        while !self.node(id).is_leaf {
            let idx = self.descent_index(id, key);
            id = self.child_at(id, idx);
        }
        id
    }

    /// Returns the payloads stored under exactly `key` in its leaf.
    #[must_use]
    pub fn search(&self, key: &Value) -> Vec<Value> {
        let leaf = self.find_leaf(key);
        self.node(leaf)
            .entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Returns the payloads of all entries with key in `[lo, hi]`, in key
    /// order, by walking the leaf chain starting at the leaf covering `lo`.
    #[must_use]
    pub fn range(&self, lo: &Value, hi: &Value) -> Vec<Value> {
        let mut result = vec![];
        let mut leaf = Some(self.find_leaf(lo));

        while let Some(id) = leaf {
            for (k, v) in &self.node(id).entries {
                if k > hi {
                    return result;
                }
                if k >= lo {
                    result.push(v.clone());
                }
            }
            leaf = self.node(id).next;
        }

        result
    }

    /// Removes every entry with the given key (payloads of duplicates
    /// included), rebalancing after each removal. Returns how many entries
    /// were removed.
    pub fn remove(&mut self, key: &Value) -> usize {
        let mut removed = 0;
        while self.remove_one(key, &Matcher::First) {
            removed += 1;
        }
        removed
    }

    /// Removes one `(key, payload)` entry. Returns `false` if no such pair
    /// exists in the leaf covering `key`.
    pub fn remove_entry(&mut self, key: &Value, payload: &Value) -> bool {
        self.remove_one(key, &Matcher::Pair(payload))
    }

    fn remove_one(&mut self, key: &Value, matcher: &Matcher<'_>) -> bool {
        let removed = self.remove_node(self.root, key, matcher);

        let root = self.node(self.root);
        if !root.is_leaf && root.keys.is_empty() && root.children.len() == 1 {
            self.root = self.first_child(self.root);
        }

        removed
    }

    fn remove_node(&mut self, id: NodeId, key: &Value, matcher: &Matcher<'_>) -> bool {
        if self.node(id).is_leaf {
            let node = self.node_mut(id);
            let pos = match matcher {
                Matcher::First => node.entries.iter().position(|(k, _)| k == key),
                Matcher::Pair(payload) => node
                    .entries
                    .iter()
                    .position(|(k, v)| k == key && v == *payload),
            };
            if let Some(pos) = pos {
                node.entries.remove(pos);
                return true;
            }
            return false;
        }

        let idx = self.descent_index(id, key);
        let child = self.child_at(id, idx);
        let removed = self.remove_node(child, key, matcher);

        if removed && self.node(child).key_count() < self.t - 1 {
            self.fix_underflow(id, idx);
        }

        removed
    }

    /// Repairs the child at `idx` of `parent` after it dropped below
    /// `t - 1` keys: borrow from a richer sibling (left first), else merge.
    /// Merged leaves inherit the `next` link of the absorbed leaf.
    fn fix_underflow(&mut self, parent: NodeId, idx: usize) {
        let t = self.t;
        let child = self.child_at(parent, idx);
        let left = idx.checked_sub(1).map(|i| self.child_at(parent, i));
        let right = if idx + 1 < self.node(parent).children.len() {
            Some(self.child_at(parent, idx + 1))
        } else {
            None
        };

        if let Some(left) = left.filter(|&l| self.node(l).key_count() > t - 1) {
            // borrow from left sibling
            if self.node(child).is_leaf {
                if let Some(entry) = self.node_mut(left).entries.pop() {
                    self.node_mut(child).entries.insert(0, entry);
                }
                let new_first = self
                    .node(child)
                    .entries
                    .first()
                    .expect("child got an entry")
                    .0
                    .clone();
                if let Some(sep) = self.node_mut(parent).keys.get_mut(idx - 1) {
                    *sep = new_first;
                }
            } else {
                let old_sep = self
                    .node(parent)
                    .keys
                    .get(idx - 1)
                    .expect("separator exists")
                    .clone();
                let borrowed_key = self.node_mut(left).keys.pop().expect("left is rich");
                let borrowed_child = self
                    .node_mut(left)
                    .children
                    .pop()
                    .expect("internal node has children");
                let node = self.node_mut(child);
                node.keys.insert(0, old_sep);
                node.children.insert(0, borrowed_child);
                if let Some(sep) = self.node_mut(parent).keys.get_mut(idx - 1) {
                    *sep = borrowed_key;
                }
            }
            return;
        }

        if let Some(right) = right.filter(|&r| self.node(r).key_count() > t - 1) {
            // borrow from right sibling
            if self.node(child).is_leaf {
                let entry = self.node_mut(right).entries.remove(0);
                self.node_mut(child).entries.push(entry);
                let new_first = self
                    .node(right)
                    .entries
                    .first()
                    .expect("right stays non-empty")
                    .0
                    .clone();
                if let Some(sep) = self.node_mut(parent).keys.get_mut(idx) {
                    *sep = new_first;
                }
            } else {
                let old_sep = self
                    .node(parent)
                    .keys
                    .get(idx)
                    .expect("separator exists")
                    .clone();
                let borrowed_key = self.node_mut(right).keys.remove(0);
                let borrowed_child = self.node_mut(right).children.remove(0);
                let node = self.node_mut(child);
                node.keys.push(old_sep);
                node.children.push(borrowed_child);
                if let Some(sep) = self.node_mut(parent).keys.get_mut(idx) {
                    *sep = borrowed_key;
                }
            }
            return;
        }

        if let Some(left) = left {
            // merge child into left sibling
            if self.node(child).is_leaf {
                let mut entries = std::mem::take(&mut self.node_mut(child).entries);
                let next = self.node(child).next;
                let left_node = self.node_mut(left);
                left_node.entries.append(&mut entries);
                left_node.next = next;
            } else {
                let sep = self
                    .node(parent)
                    .keys
                    .get(idx - 1)
                    .expect("separator exists")
                    .clone();
                let mut keys = std::mem::take(&mut self.node_mut(child).keys);
                let mut children = std::mem::take(&mut self.node_mut(child).children);
                let left_node = self.node_mut(left);
                left_node.keys.push(sep);
                left_node.keys.append(&mut keys);
                left_node.children.append(&mut children);
            }
            let parent = self.node_mut(parent);
            parent.keys.remove(idx - 1);
            parent.children.remove(idx);
        } else if let Some(right) = right {
            // merge right sibling into child
            if self.node(child).is_leaf {
                let mut entries = std::mem::take(&mut self.node_mut(right).entries);
                let next = self.node(right).next;
                let child_node = self.node_mut(child);
                child_node.entries.append(&mut entries);
                child_node.next = next;
            } else {
                let sep = self
                    .node(parent)
                    .keys
                    .get(idx)
                    .expect("separator exists")
                    .clone();
                let mut keys = std::mem::take(&mut self.node_mut(right).keys);
                let mut children = std::mem::take(&mut self.node_mut(right).children);
                let child_node = self.node_mut(child);
                child_node.keys.push(sep);
                child_node.keys.append(&mut keys);
                child_node.children.append(&mut children);
            }
            let parent = self.node_mut(parent);
            parent.keys.remove(idx);
            parent.children.remove(idx + 1);
        }
    }

    fn first_leaf(&self) -> NodeId {
        let mut id = self.root;
        while !self.node(id).is_leaf {
            id = self.first_child(id);
        }
        id
    }

    /// All `(key, payload)` entries in key order (a full leaf walk).
    #[must_use]
    pub fn entries(&self) -> Vec<(Value, Value)> {
        let mut result = vec![];
        let mut leaf = Some(self.first_leaf());
        while let Some(id) = leaf {
            result.extend(self.node(id).entries.iter().cloned());
            leaf = self.node(id).next;
        }
        result
    }
}

impl Encode for BPlusTree {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        // NOTE: order is tiny, u32 is plenty
        #[allow(clippy::cast_possible_truncation)]
        writer.write_u32::<LittleEndian>(self.t as u32)?;
        self.encode_node(self.root, writer)
    }
}

impl BPlusTree {
    fn encode_node<W: Write>(&self, id: NodeId, writer: &mut W) -> Result<(), EncodeError> {
        let node = self.node(id);
        writer.write_u8(u8::from(node.is_leaf))?;

        #[allow(clippy::cast_possible_truncation)]
        if node.is_leaf {
            writer.write_u32::<LittleEndian>(node.entries.len() as u32)?;
            for (key, payload) in &node.entries {
                key.encode_into(writer)?;
                payload.encode_into(writer)?;
            }
        } else {
            writer.write_u32::<LittleEndian>(node.keys.len() as u32)?;
            for key in &node.keys {
                key.encode_into(writer)?;
            }
            for child in &node.children {
                self.encode_node(*child, writer)?;
            }
        }

        Ok(())
    }

    fn decode_node<R: Read>(
        reader: &mut R,
        nodes: &mut Vec<Node>,
        leaves: &mut Vec<NodeId>,
    ) -> Result<NodeId, DecodeError> {
        let is_leaf = reader.read_u8()? != 0;
        let count = reader.read_u32::<LittleEndian>()? as usize;

        if is_leaf {
            let mut node = Node::new_leaf();
            for _ in 0..count {
                let key = Value::decode_from(reader)?;
                let payload = Value::decode_from(reader)?;
                node.entries.push((key, payload));
            }
            nodes.push(node);
            let id = nodes.len() - 1;
            leaves.push(id);
            Ok(id)
        } else {
            let mut keys = Vec::with_capacity(count);
            for _ in 0..count {
                keys.push(Value::decode_from(reader)?);
            }
            let mut children = Vec::with_capacity(count + 1);
            for _ in 0..=count {
                children.push(Self::decode_node(reader, nodes, leaves)?);
            }
            let mut node = Node::new_internal();
            node.keys = keys;
            node.children = children;
            nodes.push(node);
            Ok(nodes.len() - 1)
        }
    }
}

impl Decode for BPlusTree {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let t = reader.read_u32::<LittleEndian>()? as usize;

        let mut nodes = vec![];
        let mut leaves = vec![];
        let root = Self::decode_node(reader, &mut nodes, &mut leaves)?;

        // decode order visits leaves left-to-right, so re-threading the
        // chain is a window pass
        for pair in leaves.windows(2) {
            if let [left, right] = pair {
                if let Some(node) = nodes.get_mut(*left) {
                    node.next = Some(*right);
                }
            }
        }

        Ok(Self {
            t: t.max(2),
            root,
            nodes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::seq::SliceRandom;
    use test_log::test;

    fn int_tree(t: usize, keys: &[i32]) -> BPlusTree {
        let mut tree = BPlusTree::new(t);
        for &k in keys {
            tree.add(Value::Int(k), Value::Int(k * 100));
        }
        tree
    }

    fn assert_invariants(tree: &BPlusTree) {
        let t = tree.t;

        // occupancy, checked over the reachable tree
        let mut stack = vec![(tree.root, true)];
        while let Some((id, is_root)) = stack.pop() {
            let node = tree.node(id);
            if !is_root {
                assert!(
                    node.key_count() >= t - 1 && node.key_count() <= 2 * t - 1,
                    "node occupancy {} out of [{}, {}]",
                    node.key_count(),
                    t - 1,
                    2 * t - 1,
                );
            }
            if !node.is_leaf {
                assert_eq!(node.keys.len() + 1, node.children.len());
                for &child in &node.children {
                    stack.push((child, false));
                }
            }
        }

        // leaf walk yields non-decreasing keys
        let entries = tree.entries();
        for pair in entries.windows(2) {
            if let [(a, _), (b, _)] = pair {
                assert!(a <= b, "leaf chain out of order: {a} > {b}");
            }
        }
    }

    #[test]
    fn root_split_increases_height() {
        // 2t-1 = 5 keys fit in the root leaf
        let mut tree = int_tree(3, &[1, 2, 3, 4, 5]);
        assert_eq!(1, tree.height());

        tree.add(Value::Int(6), Value::Int(600));
        assert_eq!(2, tree.height());
        assert_invariants(&tree);
    }

    #[test]
    fn search_and_duplicates() {
        let mut tree = int_tree(3, &[10, 20, 30]);
        tree.add(Value::Int(20), Value::Str("twin".into()));

        let hits = tree.search(&Value::Int(20));
        assert_eq!(2, hits.len());
        assert!(tree.search(&Value::Int(15)).is_empty());
    }

    #[test]
    fn range_walks_leaves() {
        let tree = int_tree(3, &(1..=50).collect::<Vec<_>>());
        assert_invariants(&tree);

        let hits = tree.range(&Value::Int(10), &Value::Int(20));
        assert_eq!(
            (10..=20).map(|k| Value::Int(k * 100)).collect::<Vec<_>>(),
            hits,
        );

        assert!(tree.range(&Value::Int(60), &Value::Int(90)).is_empty());
    }

    #[test]
    fn range_on_empty_tree() {
        let tree = BPlusTree::new(3);
        assert!(tree.range(&Value::Int(0), &Value::Int(100)).is_empty());
        assert!(tree.search(&Value::Int(0)).is_empty());
    }

    #[test]
    fn remove_rebalances() {
        let keys: Vec<i32> = (1..=100).collect();
        let mut tree = int_tree(3, &keys);

        for k in 1..=100 {
            assert_eq!(1, tree.remove(&Value::Int(k)), "key {k}");
            assert_invariants(&tree);
        }

        assert!(tree.is_empty());
        assert_eq!(1, tree.height());
    }

    #[test]
    fn remove_entry_keeps_twins() {
        let mut tree = int_tree(3, &[10, 20, 30]);
        tree.add(Value::Int(20), Value::Str("twin".into()));

        assert!(tree.remove_entry(&Value::Int(20), &Value::Int(2000)));
        assert_eq!(vec![Value::Str("twin".into())], tree.search(&Value::Int(20)));
        assert!(!tree.remove_entry(&Value::Int(20), &Value::Int(2000)));
    }

    #[test]
    fn random_adds_and_removes_hold_invariants() {
        let mut rng = rand::rng();
        let mut keys: Vec<i32> = (0..200).collect();
        keys.shuffle(&mut rng);

        let mut tree = BPlusTree::new(3);
        for &k in &keys {
            tree.add(Value::Int(k), Value::Int(k));
            assert_invariants(&tree);
        }

        assert_eq!(200, tree.len());

        keys.shuffle(&mut rng);
        for &k in keys.iter().take(150) {
            assert_eq!(1, tree.remove(&Value::Int(k)));
            assert_invariants(&tree);
        }
        assert_eq!(50, tree.len());
    }

    #[test]
    fn merge_keeps_leaf_chain_linked() {
        let mut tree = int_tree(3, &(1..=30).collect::<Vec<_>>());

        // force merges by draining the middle
        for k in 10..=25 {
            tree.remove(&Value::Int(k));
            assert_invariants(&tree);
        }

        let keys: Vec<_> = tree.entries().into_iter().map(|(k, _)| k).collect();
        let expected: Vec<_> = (1..=9).chain(26..=30).map(Value::Int).collect();
        assert_eq!(expected, keys);
    }

    #[test]
    fn snapshot_roundtrip() -> crate::Result<()> {
        let mut tree = int_tree(3, &(1..=64).collect::<Vec<_>>());
        tree.add(Value::Int(5), Value::Str("twin".into()));

        let bytes = tree.encode_into_vec()?;
        let decoded = BPlusTree::decode_from(&mut &bytes[..])?;

        assert_eq!(tree.order(), decoded.order());
        assert_eq!(tree.entries(), decoded.entries());
        assert_invariants(&decoded);

        let hits = decoded.range(&Value::Int(3), &Value::Int(7));
        assert_eq!(tree.range(&Value::Int(3), &Value::Int(7)), hits);

        Ok(())
    }
}
