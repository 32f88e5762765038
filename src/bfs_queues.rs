// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Queue + set for breadth-first exploration of nodes
//!

use std::collections::VecDeque;

use crate::dfa::NodeId;

///
/// A BfsQueue is a queue that doesn't contain duplicate elements.
/// - elements are node ids in the interval [0 .. N-1]
///   where N is fixed when the queue is created
/// - the push operation adds an element at the end of the queue
///   if this element hasn't been seen before. Otherwise, it's a no-op.
/// - the pop operations takes the element at the front of the queue
///   if the queue is not empty.
///
#[derive(Debug)]
pub struct BfsQueue {
    queue: VecDeque<NodeId>,
    seen: Box<[bool]>,
}

impl BfsQueue {
    ///
    /// Create a new queue for node ids in [0 .. num_nodes-1]
    ///
    pub fn new(num_nodes: usize) -> Self {
        BfsQueue {
            queue: VecDeque::new(),
            seen: vec![false; num_nodes].into_boxed_slice(),
        }
    }

    ///
    /// Add an element at the end of the queue if it's not been seen before
    /// - return true if this is a new element
    /// - return false otherwise
    ///
    pub fn push(&mut self, element: NodeId) -> bool {
        let seen = &mut self.seen[element as usize];
        if *seen {
            false
        } else {
            *seen = true;
            self.queue.push_back(element);
            true
        }
    }

    ///
    /// Push all elements from an iterator
    ///
    pub fn push_all(&mut self, iter: impl IntoIterator<Item = NodeId>) {
        for x in iter {
            self.push(x);
        }
    }

    ///
    /// Get the first element in the queue
    /// - return None if the queue is empty
    ///
    pub fn pop(&mut self) -> Option<NodeId> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_no_duplicates() {
        let mut queue = BfsQueue::new(5);
        assert!(queue.push(3));
        assert!(queue.push(1));
        assert!(!queue.push(3));
        queue.push_all([4, 1, 0, 4]);
        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).collect();
        assert_eq!(order, vec![3, 1, 4, 0]);
        // popped elements are still remembered
        assert!(!queue.push(4));
        assert!(queue.push(2));
    }
}
