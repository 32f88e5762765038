// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Deterministic finite-state automata compiled from content-filter rules
//!
//! Nodes are indexed by an integer from 0 to N-1 where N is the number of nodes.
//!
//! All transitions of the automaton live in a single flat array. Every node owns
//! a contiguous slice of this array: first its individual transitions (one per
//! symbol), then optionally one extra slot that stores the node's fallback
//! transition. The fallback transition is taken for any symbol that is not
//! covered by an individual transition. The fallback slot is recognized by
//! its label [FALLBACK_SYMBOL], which is never a symbol of the alphabet.
//!
//! In the same way, all actions live in a single flat array and every final node
//! owns a contiguous slice of it. Actions are opaque 64-bit identifiers: they
//! name the rules that fire when matching ends in that node.
//!
//! Minimization (see [minimize](Dfa::minimize)) merges equivalent nodes. A merged
//! node is not removed from the node array: it is *killed*, which keeps all node
//! ids stable. Function [compact](Dfa::compact) can be used afterwards to drop
//! killed and unreachable nodes.
//!

use std::{fmt::Display, io, mem::size_of, ops::Range};

use itertools::Itertools;

use crate::{
    bfs_queues::BfsQueue,
    errors::DfaError,
    minimizer::{self, MinimizationStats},
};

/// Index of a node in a [Dfa]
pub type NodeId = u32;

/// Opaque identifier of a rule action
pub type ActionId = u64;

///
/// Number of symbols in the matching alphabet: symbols are 0 to 126.
///
/// Symbol 0 is optional. A node with individual transitions on all symbols
/// (with or without symbol 0) is considered complete.
///
pub const ALPHABET_SIZE: usize = 127;

///
/// Label of the fallback slot. It is outside the alphabet.
///
pub const FALLBACK_SYMBOL: u8 = u8::MAX;

// Target of invalidated transition slots
const NO_NODE: NodeId = NodeId::MAX;

///
/// A transition: a symbol and a target node.
///
/// In a fallback slot, the symbol is [FALLBACK_SYMBOL].
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transition {
    /// Label
    pub symbol: u8,
    /// Target node
    pub target: NodeId,
}

impl Transition {
    /// Content of transition slots that are no longer in use
    pub const INVALID: Transition = Transition {
        symbol: FALLBACK_SYMBOL,
        target: NO_NODE,
    };

    /// Individual transition on symbol
    pub fn new(symbol: u8, target: NodeId) -> Self {
        Transition { symbol, target }
    }

    /// Fallback transition to target
    pub fn fallback(target: NodeId) -> Self {
        Transition {
            symbol: FALLBACK_SYMBOL,
            target,
        }
    }

    /// Check whether this is a fallback slot
    pub fn is_fallback(&self) -> bool {
        self.symbol == FALLBACK_SYMBOL
    }
}

///
/// Descriptor of a node
///
/// A node does not own any data: it records where its transitions and actions
/// are stored in the flat arrays of the [Dfa].
///
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DfaNode {
    pub(crate) transitions_start: u32,
    pub(crate) transitions_len: u16,
    pub(crate) has_fallback: bool,
    pub(crate) killed: bool,
    pub(crate) actions_start: u32,
    pub(crate) actions_len: u16,
}

impl DfaNode {
    ///
    /// Create a node descriptor
    /// - transitions_len is the number of individual transitions
    /// - if has_fallback is true, the fallback is stored in the slot
    ///   at transitions_start + transitions_len
    ///
    pub fn new(
        transitions_start: u32,
        transitions_len: u16,
        has_fallback: bool,
        actions_start: u32,
        actions_len: u16,
    ) -> Self {
        DfaNode {
            transitions_start,
            transitions_len,
            has_fallback,
            killed: false,
            actions_start,
            actions_len,
        }
    }

    /// Index of the first transition slot
    pub fn transitions_start(&self) -> u32 {
        self.transitions_start
    }

    /// Number of individual transitions (the fallback is not counted)
    pub fn transitions_len(&self) -> usize {
        self.transitions_len as usize
    }

    /// Whether the node has a fallback transition
    pub fn has_fallback(&self) -> bool {
        self.has_fallback
    }

    /// Whether the node is final
    pub fn has_actions(&self) -> bool {
        self.actions_len > 0
    }

    /// Index of the first action
    pub fn actions_start(&self) -> u32 {
        self.actions_start
    }

    /// Number of actions
    pub fn actions_len(&self) -> usize {
        self.actions_len as usize
    }

    /// Whether the node was merged into another node
    pub fn is_killed(&self) -> bool {
        self.killed
    }

    // slots of the individual transitions
    pub(crate) fn transition_range(&self) -> Range<usize> {
        let start = self.transitions_start as usize;
        start..start + self.transitions_len as usize
    }

    // all slots including the fallback slot
    pub(crate) fn slot_range(&self) -> Range<usize> {
        let start = self.transitions_start as usize;
        start..start + self.transitions_len as usize + self.has_fallback as usize
    }

    pub(crate) fn action_range(&self) -> Range<usize> {
        let start = self.actions_start as usize;
        start..start + self.actions_len as usize
    }
}

///
/// Deterministic finite-state automaton
///
#[derive(Debug, Clone, Default)]
pub struct Dfa {
    pub(crate) nodes: Vec<DfaNode>,
    pub(crate) transitions: Vec<Transition>,
    pub(crate) actions: Vec<ActionId>,
    pub(crate) root: NodeId,
}

impl Dfa {
    ///
    /// Assemble an automaton from its flat arrays
    ///
    /// Fails if the arrays do not form a valid automaton (see [validate](Self::validate)).
    ///
    pub fn from_raw_parts(
        nodes: Vec<DfaNode>,
        transitions: Vec<Transition>,
        actions: Vec<ActionId>,
        root: NodeId,
    ) -> Result<Self, DfaError> {
        let dfa = Dfa {
            nodes,
            transitions,
            actions,
            root,
        };
        dfa.validate()?;
        Ok(dfa)
    }

    /// Check whether the automaton has no nodes
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of nodes, including killed nodes
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of nodes that are not killed
    pub fn num_live_nodes(&self) -> usize {
        self.nodes.iter().filter(|n| !n.killed).count()
    }

    /// Ids of the nodes that are not killed
    pub fn live_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| !n.killed)
            .map(|(i, _)| i as NodeId)
    }

    /// Initial node
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// All node descriptors
    pub fn nodes(&self) -> &[DfaNode] {
        &self.nodes
    }

    /// Descriptor of a node
    /// panics if the id is out of range
    pub fn node(&self, id: NodeId) -> &DfaNode {
        &self.nodes[id as usize]
    }

    /// Individual transitions of a node
    pub fn transitions(&self, id: NodeId) -> &[Transition] {
        &self.transitions[self.node(id).transition_range()]
    }

    /// Target of the fallback transition of a node if any
    pub fn fallback(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id);
        if node.has_fallback {
            let slot = node.transitions_start as usize + node.transitions_len as usize;
            Some(self.transitions[slot].target)
        } else {
            None
        }
    }

    /// Actions of a node (empty if the node is not final)
    pub fn actions(&self, id: NodeId) -> &[ActionId] {
        &self.actions[self.node(id).action_range()]
    }

    /// Check whether a node has an individual transition on symbol
    pub fn has_transition(&self, id: NodeId, symbol: u8) -> bool {
        self.transitions(id).iter().any(|t| t.symbol == symbol)
    }

    ///
    /// Successor of a node for an input byte
    /// - the individual transition on that byte if there's one
    /// - the fallback transition otherwise
    /// - None if the node has neither
    ///
    pub fn next(&self, id: NodeId, byte: u8) -> Option<NodeId> {
        match self.transitions(id).iter().find(|t| t.symbol == byte) {
            Some(t) => Some(t.target),
            None => self.fallback(id),
        }
    }

    /// All successors of a node: targets of individual transitions then of the fallback
    pub fn successors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.transitions(id)
            .iter()
            .map(|t| t.target)
            .chain(self.fallback(id))
    }

    ///
    /// Nodes reachable from the root, in breadth-first order
    ///
    pub fn reachable_nodes(&self) -> Vec<NodeId> {
        let mut result = Vec::new();
        if self.is_empty() {
            return result;
        }
        let mut queue = BfsQueue::new(self.num_nodes());
        queue.push(self.root);
        while let Some(i) = queue.pop() {
            result.push(i);
            queue.push_all(self.successors(i));
        }
        result
    }

    ///
    /// Memory used by the flat arrays, in bytes
    ///
    pub fn memory_used(&self) -> usize {
        self.nodes.capacity() * size_of::<DfaNode>()
            + self.transitions.capacity() * size_of::<Transition>()
            + self.actions.capacity() * size_of::<ActionId>()
    }

    /// Release unused capacity in the flat arrays
    pub fn shrink_to_fit(&mut self) {
        self.nodes.shrink_to_fit();
        self.transitions.shrink_to_fit();
        self.actions.shrink_to_fit();
    }

    ///
    /// Minimize the automaton in place
    ///
    /// Nodes that are merged into another node are killed, but they stay in
    /// the node array. See [minimizer::minimize].
    ///
    pub fn minimize(&mut self) -> MinimizationStats {
        minimizer::minimize(self)
    }

    ///
    /// Remove killed and unreachable nodes
    /// - the remaining nodes are renumbered in breadth-first order from the root,
    ///   so the root becomes node 0
    /// - the flat arrays are rebuilt without unused slots
    ///
    pub fn compact(&mut self) {
        let keep = self.reachable_nodes();
        let mut new_id = vec![NO_NODE; self.num_nodes()];
        for (i, &old_id) in keep.iter().enumerate() {
            new_id[old_id as usize] = i as NodeId;
        }

        let mut nodes = Vec::with_capacity(keep.len());
        let mut transitions = Vec::new();
        let mut actions = Vec::new();
        for &old_id in &keep {
            let node = self.nodes[old_id as usize];
            debug_assert!(!node.killed);
            let transitions_start = transitions.len() as u32;
            let actions_start = actions.len() as u32;
            transitions.extend(
                self.transitions(old_id)
                    .iter()
                    .map(|t| Transition::new(t.symbol, new_id[t.target as usize])),
            );
            if let Some(target) = self.fallback(old_id) {
                transitions.push(Transition::fallback(new_id[target as usize]));
            }
            actions.extend_from_slice(self.actions(old_id));
            nodes.push(DfaNode {
                transitions_start,
                actions_start,
                ..node
            });
        }

        self.nodes = nodes;
        self.transitions = transitions;
        self.actions = actions;
        self.root = 0;
    }

    ///
    /// Check that the automaton is well formed:
    /// - the root is a live node (unless the automaton is empty)
    /// - transition and action ranges are in bounds and transition ranges don't overlap
    /// - individual transitions are labeled by distinct symbols of the alphabet
    /// - a fallback slot, if present, is labeled by [FALLBACK_SYMBOL]
    /// - every transition of a live node points to a live node
    ///
    pub fn validate(&self) -> Result<(), DfaError> {
        let num_nodes = self.num_nodes();
        if num_nodes > 0 && (self.root as usize >= num_nodes || self.node(self.root).killed) {
            return Err(DfaError::InvalidRoot(self.root));
        }

        let mut ranges = Vec::with_capacity(num_nodes);
        for (i, node) in self.nodes.iter().enumerate() {
            let id = i as NodeId;
            let slots = node.slot_range();
            if slots.end > self.transitions.len() || node.action_range().end > self.actions.len() {
                return Err(DfaError::RangeOutOfBounds(id));
            }
            if !slots.is_empty() {
                ranges.push((slots.start, slots.end, id));
            }

            let mut seen = [false; ALPHABET_SIZE];
            for t in &self.transitions[node.transition_range()] {
                if t.is_fallback() {
                    return Err(DfaError::MisplacedFallback(id));
                }
                let symbol = t.symbol as usize;
                if symbol >= ALPHABET_SIZE {
                    return Err(DfaError::SymbolOutOfRange {
                        node: id,
                        symbol: t.symbol,
                    });
                }
                if seen[symbol] {
                    return Err(DfaError::DuplicateTransition {
                        node: id,
                        symbol: t.symbol,
                    });
                }
                seen[symbol] = true;
            }
            if node.has_fallback && !self.transitions[slots.end - 1].is_fallback() {
                return Err(DfaError::MisplacedFallback(id));
            }

            for t in &self.transitions[slots] {
                if t.target as usize >= num_nodes {
                    return Err(DfaError::DanglingTarget {
                        source_node: id,
                        target: t.target,
                    });
                }
                if !node.killed && self.nodes[t.target as usize].killed {
                    return Err(DfaError::KilledTarget {
                        source_node: id,
                        target: t.target,
                    });
                }
            }
        }

        ranges.sort_unstable();
        for (a, b) in ranges.iter().tuple_windows() {
            if b.0 < a.1 {
                return Err(DfaError::OverlappingRanges(a.2, b.2));
            }
        }
        Ok(())
    }

    ///
    /// Write the live nodes in the Graphviz dot format
    /// - final nodes are drawn with a double circle and list their actions
    /// - fallback transitions are dashed
    ///
    pub fn write_dot<W: io::Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "digraph dfa {{")?;
        writeln!(out, "  rankdir=LR;")?;
        for id in self.live_nodes() {
            let node = self.node(id);
            if node.has_actions() {
                let actions = self.actions(id).iter().join(",");
                writeln!(
                    out,
                    "  n{id} [shape=doublecircle, label=\"{id}\\n{actions}\"];"
                )?;
            } else {
                writeln!(out, "  n{id} [shape=circle, label=\"{id}\"];")?;
            }
        }
        for id in self.live_nodes() {
            let by_target = self
                .transitions(id)
                .iter()
                .sorted_by_key(|t| (t.target, t.symbol))
                .group_by(|t| t.target);
            for (target, group) in &by_target {
                let label: String = group.map(|t| dot_symbol(t.symbol)).collect();
                writeln!(out, "  n{id} -> n{target} [label=\"{label}\"];")?;
            }
            if let Some(target) = self.fallback(id) {
                writeln!(out, "  n{id} -> n{target} [label=\"*\", style=dashed];")?;
            }
        }
        writeln!(out, "}}")
    }

    ///
    /// Kill a node: it keeps its index but loses its transitions and actions
    ///
    pub(crate) fn kill_node(&mut self, id: NodeId) {
        let node = &mut self.nodes[id as usize];
        for slot in &mut self.transitions[node.slot_range()] {
            *slot = Transition::INVALID;
        }
        node.transitions_len = 0;
        node.has_fallback = false;
        node.actions_len = 0;
        node.killed = true;
    }
}

// printable form of a symbol
fn show_symbol(symbol: u8) -> String {
    if symbol.is_ascii_graphic() {
        format!("'{}'", symbol as char)
    } else {
        format!("\\x{symbol:02x}")
    }
}

// symbol inside a dot label
fn dot_symbol(symbol: u8) -> String {
    match symbol {
        b'"' | b'\\' => format!("\\{}", symbol as char),
        s if s.is_ascii_graphic() => (s as char).to_string(),
        s => format!("\\\\x{s:02x}"),
    }
}

impl Display for Dfa {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "{} nodes ({} live)",
            self.num_nodes(),
            self.num_live_nodes()
        )?;
        if self.is_empty() {
            return Ok(());
        }
        writeln!(f, "root: n{}", self.root)?;
        writeln!(f, "actions:")?;
        for id in self.live_nodes().filter(|&i| self.node(i).has_actions()) {
            writeln!(f, "  n{id}: [{}]", self.actions(id).iter().join(", "))?;
        }
        writeln!(f, "transitions:")?;
        for id in self.live_nodes() {
            for t in self.transitions(id) {
                writeln!(f, "  \u{03B4}(n{id}, {}) = n{}", show_symbol(t.symbol), t.target)?;
            }
            if let Some(target) = self.fallback(id) {
                writeln!(f, "  \u{03B4}(n{id}, ...) = n{target}")?;
            }
        }
        Ok(())
    }
}

///
/// Builder for automata
///
/// Nodes are created with [add_node](Self::add_node) and then connected by
/// transitions. All checks are done by [build](Self::build).
///
#[derive(Debug, Default)]
pub struct DfaBuilder {
    num_nodes: u32,
    root: NodeId,
    transitions: Vec<(NodeId, u8, NodeId)>,
    fallbacks: Vec<(NodeId, NodeId)>,
    actions: Vec<(NodeId, ActionId)>,
}

impl DfaBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node and return its id
    pub fn add_node(&mut self) -> NodeId {
        let id = self.num_nodes;
        self.num_nodes += 1;
        id
    }

    /// Add n nodes and return their ids
    pub fn add_nodes(&mut self, n: u32) -> Range<NodeId> {
        let start = self.num_nodes;
        self.num_nodes += n;
        start..self.num_nodes
    }

    /// Number of nodes created so far
    pub fn num_nodes(&self) -> usize {
        self.num_nodes as usize
    }

    /// Set the root (default: node 0)
    pub fn set_root(&mut self, node: NodeId) -> &mut Self {
        self.root = node;
        self
    }

    /// Add an individual transition
    pub fn add_transition(&mut self, source: NodeId, symbol: u8, target: NodeId) -> &mut Self {
        self.transitions.push((source, symbol, target));
        self
    }

    /// Set the fallback transition of a node (replaces any previous fallback)
    pub fn set_fallback(&mut self, source: NodeId, target: NodeId) -> &mut Self {
        self.fallbacks.push((source, target));
        self
    }

    /// Append an action to a node. The order of actions is significant.
    pub fn add_action(&mut self, node: NodeId, action: ActionId) -> &mut Self {
        self.actions.push((node, action));
        self
    }

    fn check_node(&self, id: NodeId) -> Result<usize, DfaError> {
        if id < self.num_nodes {
            Ok(id as usize)
        } else {
            Err(DfaError::UnknownNode(id))
        }
    }

    ///
    /// Construct the automaton
    /// - fails if a transition, fallback, action, or the root refers to a missing node
    /// - fails if a symbol is outside the alphabet
    /// - fails if a node has two transitions on the same symbol
    /// - fails if a node has more than u16::MAX actions
    ///
    /// Individual transitions of each node are stored sorted by symbol.
    ///
    pub fn build(&self) -> Result<Dfa, DfaError> {
        let n = self.num_nodes as usize;
        if n == 0 {
            return if self.root == 0 {
                Ok(Dfa::default())
            } else {
                Err(DfaError::InvalidRoot(self.root))
            };
        }
        if self.root as usize >= n {
            return Err(DfaError::InvalidRoot(self.root));
        }

        let mut per_node = vec![Vec::new(); n];
        for &(source, symbol, target) in &self.transitions {
            let i = self.check_node(source)?;
            self.check_node(target)?;
            if symbol as usize >= ALPHABET_SIZE {
                return Err(DfaError::SymbolOutOfRange {
                    node: source,
                    symbol,
                });
            }
            per_node[i].push(Transition::new(symbol, target));
        }
        let mut fallback = vec![None; n];
        for &(source, target) in &self.fallbacks {
            let i = self.check_node(source)?;
            self.check_node(target)?;
            fallback[i] = Some(target);
        }
        let mut node_actions = vec![Vec::new(); n];
        for &(node, action) in &self.actions {
            let i = self.check_node(node)?;
            node_actions[i].push(action);
        }

        let mut nodes = Vec::with_capacity(n);
        let mut transitions = Vec::with_capacity(self.transitions.len() + self.fallbacks.len());
        let mut actions = Vec::with_capacity(self.actions.len());
        for (i, mut list) in per_node.into_iter().enumerate() {
            let id = i as NodeId;
            list.sort_by_key(|t| t.symbol);
            if let Some((a, _)) = list.iter().tuple_windows().find(|(a, b)| a.symbol == b.symbol) {
                return Err(DfaError::DuplicateTransition {
                    node: id,
                    symbol: a.symbol,
                });
            }
            if node_actions[i].len() > u16::MAX as usize {
                return Err(DfaError::TooManyActions(id));
            }
            let node = DfaNode::new(
                transitions.len() as u32,
                list.len() as u16,
                fallback[i].is_some(),
                actions.len() as u32,
                node_actions[i].len() as u16,
            );
            transitions.extend(list);
            transitions.extend(fallback[i].map(Transition::fallback));
            actions.extend_from_slice(&node_actions[i]);
            nodes.push(node);
        }

        Ok(Dfa {
            nodes,
            transitions,
            actions,
            root: self.root,
        })
    }
}
