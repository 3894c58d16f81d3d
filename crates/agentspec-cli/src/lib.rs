// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared command implementations for the `agentspec` CLI, kept library-level
//! so they're testable without spawning the binary.

pub mod commands;
pub mod config;
pub mod format;
