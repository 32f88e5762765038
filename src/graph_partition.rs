// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Joint refinement of the node partition and the transition partitions
//!

use itertools::Itertools;
use tracing::trace;

use crate::{
    dfa::{Dfa, NodeId, ALPHABET_SIZE},
    partitions::Partition,
};

//
// Hopcroft's algorithm on transitions
// -----------------------------------
// Instead of keeping splitters as pairs (block, symbol), we partition the
// incoming transitions of all nodes:
// - transitions are first grouped by symbol
// - every time a node set is split, the incoming transitions of the smaller
//   half are marked, which splits the transition sets accordingly
// - every transition set is a splitter: the sources of its transitions are
//   marked in the node partition, which splits the node sets.
//
// Transition sets are processed in index order. Since new sets are appended,
// a single cursor that never goes back is enough to process every splitter.
//
// Fallback transitions get their own partition. They are not grouped by
// symbol and they are only used as splitters once all individual transitions
// have been processed.
//
// Data structures
// ---------------
// - incoming transitions are flattened and sorted by target:
//   the incoming transitions of node i are
//   transitions[transitions_start[i] .. transitions_start[i+1]]
// - same thing for the fallback transitions, where we only need the source.
//

#[derive(Debug, Clone, Copy)]
struct IncomingTransition {
    source: NodeId,
    symbol: u8,
}

#[derive(Debug)]
pub struct FullGraphPartition {
    node_partition: Partition,
    transition_partition: Partition,
    fallback_partition: Partition,

    // incoming individual transitions, grouped by target node
    transitions: Box<[IncomingTransition]>,
    transitions_start: Box<[u32]>,
    // sources of incoming fallback transitions, grouped by target node
    fallback_sources: Box<[NodeId]>,
    fallback_start: Box<[u32]>,

    // next transition set to use as a splitter
    next_transition_set: u32,
}

// Convert counts into start offsets: start[i] holds the count of node i on
// entry. On return, it holds the sum of the counts of nodes 0 .. i-1.
fn accumulate(start: &mut [u32]) {
    let mut total = 0;
    for x in start.iter_mut() {
        let count = *x;
        *x = total;
        total += count;
    }
}

impl FullGraphPartition {
    ///
    /// Prepare the partitions for a DFA
    /// - the node partition has a single set with all the nodes
    /// - the individual transitions are split by symbol
    /// - the fallback transitions form a single set
    ///
    pub fn new(dfa: &Dfa) -> Self {
        let num_nodes = dfa.num_nodes();

        // count the incoming transitions of each node
        let mut transitions_start: Box<[u32]> = vec![0; num_nodes + 1].into_boxed_slice();
        let mut fallback_start: Box<[u32]> = vec![0; num_nodes + 1].into_boxed_slice();
        for i in 0..num_nodes as NodeId {
            for t in dfa.transitions(i) {
                transitions_start[t.target as usize] += 1;
            }
            if let Some(target) = dfa.fallback(i) {
                fallback_start[target as usize] += 1;
            }
        }
        accumulate(&mut transitions_start);
        accumulate(&mut fallback_start);
        let num_transitions = transitions_start[num_nodes];
        let num_fallbacks = fallback_start[num_nodes];

        // fill in the flat arrays
        let mut transitions = vec![
            IncomingTransition {
                source: 0,
                symbol: 0
            };
            num_transitions as usize
        ]
        .into_boxed_slice();
        let mut fallback_sources: Box<[NodeId]> = vec![0; num_fallbacks as usize].into_boxed_slice();
        let mut next_transition = transitions_start.clone();
        let mut next_fallback = fallback_start.clone();
        for i in 0..num_nodes as NodeId {
            for t in dfa.transitions(i) {
                let k = &mut next_transition[t.target as usize];
                transitions[*k as usize] = IncomingTransition {
                    source: i,
                    symbol: t.symbol,
                };
                *k += 1;
            }
            if let Some(target) = dfa.fallback(i) {
                let k = &mut next_fallback[target as usize];
                fallback_sources[*k as usize] = i;
                *k += 1;
            }
        }

        // initial transition partition: one set per symbol
        let mut transition_partition = Partition::new(num_transitions);
        {
            let by_symbol = (0..num_transitions)
                .sorted_by_key(|&k| transitions[k as usize].symbol)
                .group_by(|&k| transitions[k as usize].symbol);
            for (symbol, group) in &by_symbol {
                debug_assert!((symbol as usize) < ALPHABET_SIZE);
                for k in group {
                    transition_partition.mark(k);
                }
                transition_partition.refine_generation(|_, _| {});
            }
        }
        debug_assert_eq!(transition_partition.num_elements(), num_transitions);

        trace!(
            num_nodes,
            num_transitions,
            num_fallbacks,
            transition_sets = transition_partition.num_sets(),
            "graph partition initialized"
        );

        FullGraphPartition {
            node_partition: Partition::new(num_nodes as u32),
            transition_partition,
            fallback_partition: Partition::new(num_fallbacks),
            transitions,
            transitions_start,
            fallback_sources,
            fallback_start,
            next_transition_set: 0,
        }
    }

    ///
    /// Mark a node in the current generation of the node partition
    ///
    pub fn mark_node(&mut self, node: NodeId) {
        self.node_partition.mark(node)
    }

    ///
    /// Split the node sets that have marked nodes, then split the transition
    /// partitions by the incoming transitions of every new node set.
    ///
    /// The new transition sets are not used as splitters here: that's done by
    /// [split_by_unique_transitions](Self::split_by_unique_transitions) and
    /// [split_by_fallback_transitions](Self::split_by_fallback_transitions).
    ///
    pub fn refine_partitions(&mut self) {
        let FullGraphPartition {
            node_partition,
            transition_partition,
            fallback_partition,
            transitions_start,
            fallback_start,
            ..
        } = self;

        node_partition.refine_generation(|nodes, new_set| {
            for node in nodes.set_elements(new_set) {
                let i = node as usize;
                for k in transitions_start[i]..transitions_start[i + 1] {
                    transition_partition.mark(k);
                }
                for k in fallback_start[i]..fallback_start[i + 1] {
                    fallback_partition.mark(k);
                }
            }
            transition_partition.refine_generation(|_, _| {});
            fallback_partition.refine_generation(|_, _| {});
        });
    }

    ///
    /// Use every transition set that has not been processed yet as a splitter,
    /// including the sets created while doing so.
    ///
    pub fn split_by_unique_transitions(&mut self) {
        while self.next_transition_set < self.transition_partition.num_sets() {
            let set = self.next_transition_set;
            for k in self.transition_partition.set_elements(set) {
                let source = self.transitions[k as usize].source;
                self.node_partition.mark(source);
            }
            self.refine_partitions();
            self.next_transition_set += 1;
        }
    }

    ///
    /// Use every fallback transition set as a splitter
    ///
    /// This must be called after [split_by_unique_transitions](Self::split_by_unique_transitions):
    /// two nodes can only be told apart by their fallback transitions once they
    /// can't be told apart by their individual transitions. After every split,
    /// the individual transitions are processed again since they may now
    /// distinguish more nodes.
    ///
    pub fn split_by_fallback_transitions(&mut self) {
        debug_assert_eq!(
            self.next_transition_set,
            self.transition_partition.num_sets(),
            "fallback transitions can only be used after all individual transitions"
        );

        let mut set = 0;
        while set < self.fallback_partition.num_sets() {
            for k in self.fallback_partition.set_elements(set) {
                let source = self.fallback_sources[k as usize];
                self.node_partition.mark(source);
            }
            self.refine_partitions();
            self.split_by_unique_transitions();
            set += 1;
        }
    }

    ///
    /// Representative of the node's class
    ///
    pub fn node_replacement(&self, node: NodeId) -> NodeId {
        let set = self.node_partition.set_index(node);
        self.node_partition.first_element(set)
    }

    /// Number of node classes found so far
    pub fn num_node_sets(&self) -> u32 {
        self.node_partition.num_sets()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dfa::DfaBuilder;

    #[test]
    fn test_accumulate() {
        let mut v = [0, 2, 0, 3, 1];
        accumulate(&mut v);
        assert_eq!(v, [0, 0, 2, 2, 5]);
    }

    //
    // 0 --a--> 1, 0 --b--> 2, 1 --x--> 3, 2 --x--> 3, fallback 3 -> 0
    //
    fn sample() -> Dfa {
        let mut builder = DfaBuilder::new();
        builder.add_nodes(4);
        builder
            .add_transition(0, b'a', 1)
            .add_transition(0, b'b', 2)
            .add_transition(1, b'x', 3)
            .add_transition(2, b'x', 3)
            .set_fallback(3, 0)
            .add_action(3, 1);
        builder.build().unwrap()
    }

    #[test]
    fn test_reverse_index() {
        let dfa = sample();
        let p = FullGraphPartition::new(&dfa);
        assert_eq!(&*p.transitions_start, &[0, 0, 1, 2, 4]);
        assert_eq!(&*p.fallback_start, &[0, 1, 1, 1, 1]);
        assert_eq!(&*p.fallback_sources, &[3]);
        let into_3: Vec<_> = p.transitions[2..4].iter().map(|t| (t.source, t.symbol)).collect();
        assert_eq!(into_3, vec![(1, b'x'), (2, b'x')]);

        // one set per symbol: a, b, x
        assert_eq!(p.transition_partition.num_sets(), 3);
        assert_eq!(p.transition_partition.set_index(2), p.transition_partition.set_index(3));
        assert_eq!(p.fallback_partition.num_sets(), 1);
        assert_eq!(p.num_node_sets(), 1);
    }

    #[test]
    fn test_split() {
        let dfa = sample();
        let mut p = FullGraphPartition::new(&dfa);
        p.mark_node(3);
        p.refine_partitions();
        p.split_by_unique_transitions();
        p.split_by_fallback_transitions();

        // 1 and 2 are equivalent, 0 and 3 are not
        assert_eq!(p.node_replacement(1), p.node_replacement(2));
        assert_eq!(p.num_node_sets(), 3);
        for i in [0, 3] {
            assert_eq!(p.node_replacement(i), i);
        }
    }

    #[test]
    fn test_empty() {
        let dfa = Dfa::default();
        let mut p = FullGraphPartition::new(&dfa);
        p.split_by_unique_transitions();
        p.split_by_fallback_transitions();
        assert_eq!(p.num_node_sets(), 0);
    }
}
