// SPDX-License-Identifier: MIT

pub mod graph;
pub mod prompts;
pub mod review;
pub mod stages;
pub mod state;

pub use graph::{ResearchGraph, Stage, StageEvent};
pub use state::{StateUpdate, WorkflowState};
