//! View history.
//!
//! Keeps the entities most recently returned by a lookup, oldest first and
//! most recent last, with at most one entry per id. Entries live in a slab of
//! doubly linked nodes indexed by id, so recording, moving and removing an
//! entry are all O(1).

use std::collections::HashMap;

use crate::model::{Identified, TaskId};

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    prev: Option<usize>,
    next: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct HistoryTracker<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    index: HashMap<TaskId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> Default for HistoryTracker<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            index: HashMap::new(),
            head: None,
            tail: None,
        }
    }
}

impl<T: Identified + Clone> HistoryTracker<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a view. A repeated id moves to the most recent position.
    pub fn record(&mut self, value: T) {
        let id = value.id();
        if let Some(slot) = self.index.get(&id).copied() {
            self.unlink(slot);
            if let Some(node) = self.nodes[slot].as_mut() {
                node.value = value;
            }
            self.push_back(slot);
            return;
        }

        let node = Node {
            value,
            prev: None,
            next: None,
        };
        let slot = match self.free.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(id, slot);
        self.push_back(slot);
    }

    /// Replace the stored snapshot for an id without changing its position.
    ///
    /// Returns false when the id has not been viewed.
    pub fn refresh(&mut self, value: T) -> bool {
        let Some(slot) = self.index.get(&value.id()).copied() else {
            return false;
        };
        match self.nodes[slot].as_mut() {
            Some(node) => {
                node.value = value;
                true
            }
            None => false,
        }
    }

    /// Evict an id. Unknown ids are ignored.
    pub fn remove(&mut self, id: TaskId) -> bool {
        let Some(slot) = self.index.remove(&id) else {
            return false;
        };
        self.unlink(slot);
        self.nodes[slot] = None;
        self.free.push(slot);
        true
    }

    /// Snapshot of the history, oldest first.
    pub fn list(&self) -> Vec<T> {
        let mut out = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let Some(node) = self.nodes[slot].as_ref() else {
                break;
            };
            out.push(node.value.clone());
            cursor = node.next;
        }
        out
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    fn push_back(&mut self, slot: usize) {
        let old_tail = self.tail;
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = old_tail;
            node.next = None;
        }
        match old_tail.and_then(|tail| self.nodes[tail].as_mut()) {
            Some(tail) => tail.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match self.nodes[slot].as_mut() {
            Some(node) => (node.prev.take(), node.next.take()),
            None => return,
        };

        match prev.and_then(|prev| self.nodes[prev].as_mut()) {
            Some(prev_node) => prev_node.next = next,
            None => self.head = next,
        }
        match next.and_then(|next| self.nodes[next].as_mut()) {
            Some(next_node) => next_node.prev = prev,
            None => self.tail = prev,
        }
    }
}
