// Copyright (c) 2025 Taranis project authors. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! Deduplication of redelivered forwarded publications.
//!
//! The bus is at-least-once; a destination recognizes a redelivery by the
//! (origin node, message id) pair. Observed ids are remembered per origin
//! in a bounded sliding window.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::{MessageId, NodeId};

#[derive(Debug)]
pub struct DedupWindow {
    capacity: usize,
    seen: HashMap<NodeId, (HashSet<MessageId>, VecDeque<MessageId>)>,
}

impl DedupWindow {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            seen: HashMap::new(),
        }
    }

    /// Record one delivery; returns false when the id was seen before.
    pub fn observe(&mut self, origin: &str, id: MessageId) -> bool {
        let (set, order) = self
            .seen
            .entry(origin.to_string())
            .or_insert_with(|| (HashSet::new(), VecDeque::new()));
        if !set.insert(id) {
            return false;
        }
        order.push_back(id);
        if order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                set.remove(&oldest);
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(v: u64) -> MessageId {
        MessageId::from_value(v)
    }

    #[test]
    fn test_duplicate_detected() {
        let mut window = DedupWindow::new(16);
        assert!(window.observe("node-2", id(1)));
        assert!(!window.observe("node-2", id(1)));
        // Same id from another origin is a different message.
        assert!(window.observe("node-3", id(1)));
    }

    #[test]
    fn test_window_is_bounded() {
        let mut window = DedupWindow::new(2);
        assert!(window.observe("n", id(1)));
        assert!(window.observe("n", id(2)));
        assert!(window.observe("n", id(3)));
        // Id 1 fell out of the window and would be accepted again.
        assert!(window.observe("n", id(1)));
        assert!(!window.observe("n", id(3)));
    }
}
