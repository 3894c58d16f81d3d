// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! The desired-state diff/apply engine.
//!
//! [`planner::Planner`] diffs a [`agentspec_core::Document`] against an
//! [`agentspec_state::StateMap`] into an ordered [`action::Action`] list.
//! [`applier::Applier`] drives that list through an [`adapter::Adapter`],
//! persisting state after every action and skipping the dependents of any
//! action that fails.

/// Plan actions: what to do to a resource, and why.
pub mod action;
/// The `Adapter` trait and its supporting result/status types.
pub mod adapter;
/// Drives a plan through an adapter.
pub mod applier;
/// A file-based `Adapter` for local development and as the CLI's default
/// deploy target.
pub mod local;
/// The desired-state diff algorithm.
pub mod planner;

pub use action::{Action, ActionType};
pub use adapter::{Adapter, AdapterError, ApplyOutcome, ApplyResult, LogOptions, ResourceStatus};
pub use applier::Applier;
pub use local::LocalAdapter;
pub use planner::Planner;
