// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Run an automaton on an input
//!

use itertools::Itertools;

use crate::dfa::{ActionId, Dfa, NodeId};

///
/// Run the automaton from its root on an input
///
/// - Return Some(node) where node is the state reached after consuming all input bytes
/// - Return None if the automaton is empty or if some byte has no transition
///   (neither individual nor fallback)
///
pub fn run(dfa: &Dfa, input: &[u8]) -> Option<NodeId> {
    if dfa.is_empty() {
        return None;
    }
    input
        .iter()
        .try_fold(dfa.root(), |state, &byte| dfa.next(state, byte))
}

///
/// Actions that fire on an input
///
/// Every state visited on the input contributes its actions, starting with the
/// root, until the input ends or a byte has no transition. The result is
/// sorted and has no duplicates.
///
pub fn matching_actions(dfa: &Dfa, input: &[u8]) -> Vec<ActionId> {
    if dfa.is_empty() {
        return Vec::new();
    }
    let mut actions = Vec::new();
    let mut state = dfa.root();
    actions.extend_from_slice(dfa.actions(state));
    for &byte in input {
        match dfa.next(state, byte) {
            Some(next) => {
                state = next;
                actions.extend_from_slice(dfa.actions(state));
            }
            None => break,
        }
    }
    actions.into_iter().sorted_unstable().dedup().collect()
}
