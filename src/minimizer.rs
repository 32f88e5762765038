// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Minimization of content-filter automata
//!

use std::fmt::Display;

use fxhash::FxHashMap;
use tracing::{debug, trace};

use crate::{
    dfa::{ActionId, Dfa, NodeId},
    graph_partition::FullGraphPartition,
    simplify::simplify_transitions,
};

//
// The automaton is defined by
// - a finite set of nodes
// - the alphabet of symbols 0 .. 126
// - for each node, a partial transition function given by its individual
//   transitions and an optional fallback transition
// - for each node, a sequence of actions (empty for non-final nodes)
//
// Minimization
// ------------
// Two nodes are equivalent if they have the same actions and, for every
// symbol, equivalent successors. Unlike the textbook algorithm, the initial
// partition does not just separate final from non-final nodes: final nodes are
// separated by their sequence of actions.
//
// The partition is then refined with Hopcroft's algorithm (see
// graph_partition.rs), first using individual transitions then using
// fallback transitions.
//
// Each equivalence class is replaced by one representative node. The other
// nodes of the class are killed and all transitions are redirected to the
// representatives.
//

///
/// Maximal number of merge rounds in [minimize]
///
pub const MAX_MERGE_ROUNDS: usize = 32;

///
/// Summary of a minimization
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinimizationStats {
    /// Live nodes before minimization
    pub live_before: usize,
    /// Live nodes after minimization
    pub live_after: usize,
}

impl MinimizationStats {
    /// Number of nodes that were merged into another node
    pub fn merged(&self) -> usize {
        self.live_before - self.live_after
    }
}

impl Display for MinimizationStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} live nodes -> {} live nodes ({} merged)",
            self.live_before,
            self.live_after,
            self.merged()
        )
    }
}

//
// Group the final nodes by their actions
// - two nodes are in the same group iff their action sequences are equal
// - groups are listed in order of their first node
//
fn action_groups(dfa: &Dfa) -> Vec<Vec<NodeId>> {
    let mut index: FxHashMap<&[ActionId], usize> = FxHashMap::default();
    let mut groups: Vec<Vec<NodeId>> = Vec::new();
    for id in dfa.live_nodes() {
        let actions = dfa.actions(id);
        if actions.is_empty() {
            continue;
        }
        let k = *index.entry(actions).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[k].push(id);
    }
    groups
}

//
// One round of partition refinement
// - kill every node that is equivalent to an earlier representative and
//   redirect all transitions and the root to the representatives
// - return the number of nodes killed
//
fn merge_equivalent_nodes(dfa: &mut Dfa) -> usize {
    let mut partition = FullGraphPartition::new(dfa);

    // nodes killed by an earlier round must never be representatives
    let mut has_killed = false;
    for i in 0..dfa.num_nodes() as NodeId {
        if dfa.node(i).is_killed() {
            partition.mark_node(i);
            has_killed = true;
        }
    }
    if has_killed {
        partition.refine_partitions();
    }

    let groups = action_groups(dfa);
    trace!(groups = groups.len(), "final nodes grouped by actions");
    for group in &groups {
        for &id in group {
            partition.mark_node(id);
        }
        partition.refine_partitions();
    }

    partition.split_by_unique_transitions();
    trace!(
        classes = partition.num_node_sets(),
        "refined by individual transitions"
    );

    // nodes that agree on all individual transitions can still differ
    // by their fallback transitions
    partition.split_by_fallback_transitions();
    trace!(
        classes = partition.num_node_sets(),
        "refined by fallback transitions"
    );

    let num_nodes = dfa.num_nodes() as NodeId;
    let mut relocation: Vec<NodeId> = (0..num_nodes).collect();
    let mut killed = 0;
    for i in 0..num_nodes {
        if dfa.node(i).is_killed() {
            continue;
        }
        let replacement = partition.node_replacement(i);
        if replacement != i {
            relocation[i as usize] = replacement;
            dfa.kill_node(i);
            killed += 1;
        }
    }

    for node in &dfa.nodes {
        for t in &mut dfa.transitions[node.slot_range()] {
            t.target = relocation[t.target as usize];
        }
    }
    dfa.root = relocation[dfa.root as usize];
    killed
}

///
/// Minimize a DFA in place
///
/// - nodes that are equivalent to another node are killed: they stay in
///   the node array but nothing points to them anymore
/// - all transitions and the root are redirected to the representative of
///   each class
/// - the fallback simplification is applied before and after merging
///
/// After merging, an individual transition may point to the same node as the
/// fallback transition. Removing it can make more nodes equivalent, so merging
/// is repeated until the simplification leaves all nodes unchanged, for at most
/// [MAX_MERGE_ROUNDS] rounds. Every round costs a full partition refinement. If
/// the limit is reached, the result is correct but calling `minimize` again may
/// merge more nodes.
///
/// The DFA must be well formed (see [Dfa::validate]). An empty DFA is left unchanged.
///
pub fn minimize(dfa: &mut Dfa) -> MinimizationStats {
    debug_assert_eq!(dfa.validate(), Ok(()));
    let live_before = dfa.num_live_nodes();
    if dfa.is_empty() {
        return MinimizationStats::default();
    }

    let rewritten = simplify_transitions(dfa);
    trace!(rewritten, "transitions simplified");

    let mut rounds = 0;
    loop {
        rounds += 1;
        let merged = merge_equivalent_nodes(dfa);
        let rewritten = simplify_transitions(dfa);
        trace!(round = rounds, merged, rewritten, "merge round");
        if merged == 0 || rewritten == 0 {
            break;
        }
        if rounds == MAX_MERGE_ROUNDS {
            debug!(rounds, "merge round limit reached");
            break;
        }
    }

    let stats = MinimizationStats {
        live_before,
        live_after: dfa.num_live_nodes(),
    };
    debug!(%stats, rounds, "minimized");
    debug_assert_eq!(dfa.validate(), Ok(()));
    stats
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::dfa::{DfaBuilder, ALPHABET_SIZE};

    //
    // 0 --a--> 1, 0 --fallback--> 2
    // 1 and 2 are final, without transitions
    //
    fn two_sinks(action1: ActionId, action2: ActionId) -> Dfa {
        let mut builder = DfaBuilder::new();
        builder.add_nodes(3);
        builder
            .add_transition(0, b'a', 1)
            .set_fallback(0, 2)
            .add_action(1, action1)
            .add_action(2, action2);
        builder.build().unwrap()
    }

    #[test_log::test]
    fn test_merge_equal_sinks() {
        let mut dfa = two_sinks(42, 42);
        let stats = minimize(&mut dfa);
        println!("{dfa}");
        assert_eq!(stats.live_before, 3);
        assert_eq!(stats.live_after, 2);
        assert_eq!(stats.merged(), 1);

        // the individual transition was folded into the fallback
        assert_eq!(dfa.root(), 0);
        assert!(dfa.transitions(0).is_empty());
        let sink = dfa.fallback(0).unwrap();
        assert!(sink == 1 || sink == 2);
        assert_eq!(dfa.actions(sink), &[42]);
        assert!(!dfa.node(sink).is_killed());
    }

    #[test_log::test]
    fn test_keep_distinct_actions() {
        let mut dfa = two_sinks(42, 43);
        let stats = minimize(&mut dfa);
        assert_eq!(stats.live_after, 3);
        assert_eq!(dfa.next(0, b'a'), Some(1));
        assert_eq!(dfa.next(0, b'b'), Some(2));
    }

    #[test]
    fn test_action_order_matters() {
        let mut builder = DfaBuilder::new();
        builder.add_nodes(3);
        builder
            .add_transition(0, b'a', 1)
            .add_transition(0, b'b', 2)
            .add_action(1, 1)
            .add_action(1, 2)
            .add_action(2, 2)
            .add_action(2, 1);
        let mut dfa = builder.build().unwrap();
        assert_eq!(action_groups(&dfa), vec![vec![1], vec![2]]);
        assert_eq!(minimize(&mut dfa).live_after, 3);
    }

    #[test]
    fn test_empty() {
        let mut dfa = Dfa::default();
        let stats = minimize(&mut dfa);
        assert_eq!(stats, MinimizationStats::default());
        assert_eq!(dfa.root(), 0);
        assert!(dfa.is_empty());
    }

    #[test_log::test]
    fn test_fallback_distinguishes() {
        // 1 and 2 agree on 'x' but not on their fallbacks
        let mut builder = DfaBuilder::new();
        builder.add_nodes(6);
        builder
            .add_transition(0, b'a', 1)
            .add_transition(0, b'b', 2)
            .add_transition(1, b'x', 3)
            .add_transition(2, b'x', 3)
            .set_fallback(1, 4)
            .set_fallback(2, 5)
            .add_action(3, 1)
            .add_action(4, 2)
            .add_action(5, 3);
        let mut dfa = builder.build().unwrap();
        assert_eq!(minimize(&mut dfa).live_after, 6);

        // same fallbacks: 1 and 2 merge
        let mut builder = DfaBuilder::new();
        builder.add_nodes(5);
        builder
            .add_transition(0, b'a', 1)
            .add_transition(0, b'b', 2)
            .add_transition(1, b'x', 3)
            .add_transition(2, b'x', 3)
            .set_fallback(1, 4)
            .set_fallback(2, 4)
            .add_action(3, 1)
            .add_action(4, 2);
        let mut dfa = builder.build().unwrap();
        assert_eq!(minimize(&mut dfa).live_after, 4);
        assert_eq!(dfa.next(0, b'a'), dfa.next(0, b'b'));
    }

    #[test]
    fn test_merge_creates_fallback() {
        // node 0 goes to 1 on symbols below 60 and to 2 otherwise.
        // 1 and 2 are equivalent, so after merging node 0 is complete
        // with a single target.
        let mut builder = DfaBuilder::new();
        builder.add_nodes(3);
        for symbol in 1..ALPHABET_SIZE as u8 {
            builder.add_transition(0, symbol, if symbol < 60 { 1 } else { 2 });
        }
        builder.add_action(1, 5).add_action(2, 5);
        let mut dfa = builder.build().unwrap();
        let stats = minimize(&mut dfa);
        assert_eq!(stats.live_after, 2);
        assert!(dfa.transitions(0).is_empty());
        let sink = dfa.fallback(0).unwrap();
        assert_eq!(dfa.actions(sink), &[5]);
    }

    #[test]
    fn test_cycle() {
        // language (ab)*, written with 4 nodes instead of 2
        let mut builder = DfaBuilder::new();
        builder.add_nodes(4);
        builder
            .add_transition(0, b'a', 1)
            .add_transition(1, b'b', 2)
            .add_transition(2, b'a', 3)
            .add_transition(3, b'b', 0)
            .add_action(0, 9)
            .add_action(2, 9);
        let mut dfa = builder.build().unwrap();
        let stats = minimize(&mut dfa);
        assert_eq!(stats.live_after, 2);
        let root = dfa.root();
        let next = dfa.next(root, b'a').unwrap();
        assert_eq!(dfa.next(next, b'b'), Some(root));
        assert_eq!(dfa.actions(root), &[9]);
        assert!(dfa.actions(next).is_empty());
    }

    #[test_log::test]
    fn test_second_round() {
        // 3 and 4 are equivalent sinks. Node 1 only differs from node 2 by
        // its transition on 'c', which becomes redundant once 3 and 4 merge.
        let mut builder = DfaBuilder::new();
        builder.add_nodes(5);
        builder
            .add_transition(0, b'a', 1)
            .add_transition(0, b'b', 2)
            .add_transition(1, b'c', 4)
            .set_fallback(1, 3)
            .set_fallback(2, 3)
            .add_action(3, 7)
            .add_action(4, 7);
        let mut dfa = builder.build().unwrap();
        let stats = minimize(&mut dfa);
        println!("{dfa}");
        assert_eq!(stats.live_after, 3);
        assert_eq!(dfa.next(0, b'a'), dfa.next(0, b'b'));
        let node = dfa.next(0, b'a').unwrap();
        assert!(dfa.transitions(node).is_empty());
        assert_eq!(minimize(&mut dfa).merged(), 0);
    }

    #[test]
    fn test_minimize_twice() {
        let mut dfa = two_sinks(42, 42);
        minimize(&mut dfa);
        let nodes = dfa.nodes.clone();
        let transitions = dfa.transitions.clone();
        let stats = minimize(&mut dfa);
        assert_eq!(stats.merged(), 0);
        assert_eq!(dfa.nodes, nodes);
        assert_eq!(dfa.transitions, transitions);
    }
}
