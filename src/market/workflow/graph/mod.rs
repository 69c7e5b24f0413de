// SPDX-License-Identifier: MIT

//! Graph-based workflow execution
//!
//! This module provides the stage graph and the executor that walks it,
//! either to completion or one stage at a time as a stream.

pub mod executor;
pub mod types;

pub use executor::{ResearchGraph, WorkflowRun};
pub use types::{Stage, StageEvent};
