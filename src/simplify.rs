// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Collapse individual transitions into fallback transitions
//!
//! A node is *almost complete* if it has no fallback and its individual
//! transitions cover the whole alphabet, either with or without symbol 0.
//! For such a node, the most frequent target becomes the fallback target.
//!
//! Then for every node with a fallback, the individual transitions to the
//! fallback target are removed. After this pass, a fallback target is never
//! also the target of an individual transition from the same node.
//!
//! The transitions are rewritten in place: a node never needs more slots
//! than it had before. Slots that are no longer used are overwritten with
//! [Transition::INVALID].
//!

use fxhash::FxHashMap;

use crate::dfa::{Dfa, DfaNode, NodeId, Transition, ALPHABET_SIZE};

// Check whether a node's transitions cover the alphabet
fn almost_complete(node: &DfaNode, transitions: &[Transition]) -> bool {
    if node.has_fallback {
        return false;
    }
    let has_zero = transitions.iter().any(|t| t.symbol == 0);
    let n = transitions.len();
    (n == ALPHABET_SIZE - 1 && !has_zero) || (n == ALPHABET_SIZE && has_zero)
}

//
// Most frequent target among the transitions on symbols other than 0
// - ties are broken in favor of the target that reaches the best count first
//   when scanning transitions in order
//
fn majority_target(transitions: &[Transition], histogram: &mut FxHashMap<NodeId, u32>) -> NodeId {
    histogram.clear();
    let mut best_target = NodeId::MAX;
    let mut best_count = 0;
    for t in transitions.iter().filter(|t| t.symbol != 0) {
        let count = histogram.entry(t.target).or_insert(0);
        *count += 1;
        if *count > best_count {
            best_count = *count;
            best_target = t.target;
        }
    }
    debug_assert!(best_count > 0);
    best_target
}

///
/// Simplify the transitions of all nodes
/// - return the number of nodes that were rewritten (new fallback or
///   fewer individual transitions)
///
pub fn simplify_transitions(dfa: &mut Dfa) -> usize {
    let mut histogram: FxHashMap<NodeId, u32> = FxHashMap::default();
    let mut kept: Vec<Transition> = Vec::with_capacity(ALPHABET_SIZE);
    let mut rewritten = 0;

    for node in dfa.nodes.iter_mut() {
        let individual = &dfa.transitions[node.transition_range()];
        let new_fallback = almost_complete(node, individual);
        let fallback = if new_fallback {
            majority_target(individual, &mut histogram)
        } else if node.has_fallback {
            dfa.transitions[node.transition_range().end].target
        } else {
            continue;
        };

        kept.clear();
        kept.extend(individual.iter().filter(|t| t.target != fallback));
        if !new_fallback && kept.len() == individual.len() {
            continue;
        }
        rewritten += 1;

        let slots = &mut dfa.transitions[node.slot_range()];
        debug_assert!(kept.len() < slots.len());
        slots[..kept.len()].copy_from_slice(&kept);
        slots[kept.len()] = Transition::fallback(fallback);
        for slot in &mut slots[kept.len() + 1..] {
            *slot = Transition::INVALID;
        }

        node.transitions_len = kept.len() as u16;
        node.has_fallback = true;
    }
    rewritten
}
