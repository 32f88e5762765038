// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Minimization of content-filter automata
//!
//! # Overview
//!
//! This crate stores deterministic finite-state automata compiled from
//! content-filter rules and reduces them to an equivalent automaton with as
//! few live nodes as possible.
//!
//! An automaton reads bytes. Each node has individual transitions, one per
//! symbol, and an optional fallback transition for all other symbols. Final
//! nodes carry a sequence of actions that identify the rules that fire.
//!
//! Module [dfa](crate::dfa) defines the flat automaton representation, a builder,
//! and post-processing functions (validation, compaction, dot output).
//!
//! Module [minimizer](crate::minimizer) implements Hopcroft-style minimization
//! that treats fallback transitions separately from individual transitions.
//!
//! Module [matcher](crate::matcher) runs an automaton on an input.
//!

#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]

pub mod dfa;
pub mod errors;
pub mod matcher;
pub mod minimizer;

mod bfs_queues;
mod graph_partition;
mod partitions;
mod simplify;

pub use dfa::{ActionId, Dfa, DfaBuilder, NodeId};
pub use errors::DfaError;
pub use minimizer::{minimize, MinimizationStats};
