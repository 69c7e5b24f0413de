//! Graph workflow type definitions

use crate::adk::error::WorkflowError;
use crate::market::workflow::state::{StateUpdate, WorkflowState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A node of the research graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Researcher,
    Analyst,
    Reviewer,
    ChartGenerator,
    Writer,
}

impl Stage {
    /// Every stage in first-pass execution order
    pub const ALL: [Stage; 5] = [
        Stage::Researcher,
        Stage::Analyst,
        Stage::Reviewer,
        Stage::ChartGenerator,
        Stage::Writer,
    ];

    /// Where every run starts
    pub const ENTRY: Stage = Stage::Researcher;

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Researcher => "researcher",
            Stage::Analyst => "analyst",
            Stage::Reviewer => "reviewer",
            Stage::ChartGenerator => "chart_generator",
            Stage::Writer => "writer",
        }
    }

    /// Transition out of this stage given the post-stage state.
    /// `None` means the run is finished.
    ///
    /// Only the reviewer branches: pending feedback (even blank) loops back
    /// to research, no feedback moves on to charts. The revision cap lives
    /// in the reviewer, which clears feedback once the cap is hit.
    pub fn next(&self, state: &WorkflowState) -> Option<Stage> {
        match self {
            Stage::Researcher => Some(Stage::Analyst),
            Stage::Analyst => Some(Stage::Reviewer),
            Stage::Reviewer => {
                if state.feedback.is_some() {
                    Some(Stage::Researcher)
                } else {
                    Some(Stage::ChartGenerator)
                }
            }
            Stage::ChartGenerator => Some(Stage::Writer),
            Stage::Writer => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = WorkflowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .iter()
            .copied()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| WorkflowError::UnknownStage(s.to_string()))
    }
}

/// Emitted once per completed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// 1-based position of this stage execution within the run
    pub step: u32,
    pub stage: Stage,
    /// What the stage returned
    pub update: StateUpdate,
    /// State after the update was merged
    pub state: WorkflowState,
}
