// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//!
//! Error codes
//!

use thiserror::Error;

use crate::dfa::NodeId;

///
/// Error codes produced when building or validating a [Dfa](crate::dfa::Dfa)
///
/// Minimization itself never reports an error: it assumes a well-formed DFA.
/// These errors are produced by [DfaBuilder](crate::dfa::DfaBuilder) and
/// [Dfa::validate](crate::dfa::Dfa::validate).
///
#[derive(Debug, Error, PartialEq, Eq, Clone)]
pub enum DfaError {
    /// A node id does not refer to a node of the automaton.
    #[error("node {0} does not exist")]
    UnknownNode(NodeId),

    /// A transition label is outside the matching alphabet.
    #[error("symbol {symbol} on a transition from node {node} is outside the alphabet")]
    SymbolOutOfRange {
        /// Source of the transition
        node: NodeId,
        /// Offending symbol
        symbol: u8,
    },

    /// A node has two individual transitions on the same symbol.
    #[error("node {node} has more than one transition on symbol {symbol}")]
    DuplicateTransition {
        /// Source of the transitions
        node: NodeId,
        /// Repeated symbol
        symbol: u8,
    },

    /// A node has more actions than a node descriptor can record.
    #[error("node {0} has too many actions")]
    TooManyActions(NodeId),

    /// The root is not a node of a non-empty automaton.
    #[error("root {0} is not a valid node")]
    InvalidRoot(NodeId),

    /// The transition or action range of a node is outside the flat arrays.
    #[error("a range of node {0} is out of bounds")]
    RangeOutOfBounds(NodeId),

    /// The transition ranges of two nodes overlap.
    #[error("transition ranges of nodes {0} and {1} overlap")]
    OverlappingRanges(NodeId, NodeId),

    /// A transition points outside the node array.
    #[error("node {source_node} has a transition to missing node {target}")]
    DanglingTarget {
        /// Source of the transition
        source_node: NodeId,
        /// Target of the transition
        target: NodeId,
    },

    /// A live node has a transition to a killed node.
    #[error("node {source_node} has a transition to killed node {target}")]
    KilledTarget {
        /// Source of the transition
        source_node: NodeId,
        /// Target of the transition
        target: NodeId,
    },

    /// A fallback slot does not carry the fallback marker, or an individual
    /// transition carries it.
    #[error("node {0} has a malformed fallback slot")]
    MisplacedFallback(NodeId),
}
