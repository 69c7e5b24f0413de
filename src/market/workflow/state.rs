// SPDX-License-Identifier: MIT

//! Workflow state and partial updates
//!
//! Stages never mutate [`WorkflowState`] directly. They return a
//! [`StateUpdate`] which the graph merges with [`WorkflowState::apply`]:
//! `research_data` appends, every other present field overwrites.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The record threaded through every stage of one run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowState {
    pub topic: String,
    /// Search output, one entry per researcher pass
    pub research_data: Vec<String>,
    pub analysis: String,
    /// Directory chart files and the report live in
    pub output_dir: PathBuf,
    /// Chart file names (`chart_<n>.png`), relative to `output_dir`
    pub chart_files: Vec<String>,
    pub final_report: String,
    /// `Some` means the last review rejected the analysis
    pub feedback: Option<String>,
    pub revision_count: u32,
}

impl WorkflowState {
    /// Fresh state for a new run
    pub fn new(topic: impl Into<String>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            topic: topic.into(),
            output_dir: output_dir.into(),
            ..Default::default()
        }
    }

    /// Merge a stage's partial update
    pub fn apply(&mut self, update: &StateUpdate) {
        self.research_data
            .extend(update.research_data.iter().cloned());

        if let Some(analysis) = &update.analysis {
            self.analysis = analysis.clone();
        }
        if let Some(dir) = &update.chart_dir {
            self.output_dir = dir.clone();
        }
        if let Some(files) = &update.chart_files {
            self.chart_files = files.clone();
        }
        if let Some(report) = &update.final_report {
            self.final_report = report.clone();
        }
        if let Some(feedback) = &update.feedback {
            self.feedback = feedback.clone();
        }
        if let Some(count) = update.revision_count {
            self.revision_count = count;
        }
    }

    /// Feedback text when present and non-blank
    pub fn actionable_feedback(&self) -> Option<&str> {
        self.feedback
            .as_deref()
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }

    /// Absolute-or-relative paths of the chart files
    pub fn chart_paths(&self) -> Vec<PathBuf> {
        self.chart_files
            .iter()
            .map(|f| self.output_dir.join(f))
            .collect()
    }

    /// Where the Markdown report is written
    pub fn report_path(&self) -> PathBuf {
        self.output_dir.join("report.md")
    }
}

/// Partial update returned by a stage; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub research_data: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chart_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_report: Option<String>,
    /// Outer `None` leaves feedback alone, `Some(None)` clears it
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "double_option"
    )]
    pub feedback: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_count: Option<u32>,
}

impl StateUpdate {
    pub fn research(entry: String) -> Self {
        Self {
            research_data: vec![entry],
            ..Default::default()
        }
    }

    pub fn analysis(text: String) -> Self {
        Self {
            analysis: Some(text),
            ..Default::default()
        }
    }

    /// Review approved: clear feedback
    pub fn approved() -> Self {
        Self {
            feedback: Some(None),
            ..Default::default()
        }
    }

    /// Review rejected: set feedback and bump the revision counter
    pub fn rejected(feedback: String, revision_count: u32) -> Self {
        Self {
            feedback: Some(Some(feedback)),
            revision_count: Some(revision_count),
            ..Default::default()
        }
    }

    pub fn charts(dir: PathBuf, files: Vec<String>) -> Self {
        Self {
            chart_dir: Some(dir),
            chart_files: Some(files),
            ..Default::default()
        }
    }

    pub fn report(text: String) -> Self {
        Self {
            final_report: Some(text),
            ..Default::default()
        }
    }
}

/// Serializes `Some(None)` as an explicit `null` so consumers can tell
/// "feedback cleared" from "feedback untouched"
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S>(value: &Option<Option<String>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<String>::deserialize(deserializer).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_state_is_empty() {
        let state = WorkflowState::new("Renewable Energy", "runs/x");
        assert_eq!(state.topic, "Renewable Energy");
        assert!(state.research_data.is_empty());
        assert!(state.analysis.is_empty());
        assert!(state.chart_files.is_empty());
        assert!(state.final_report.is_empty());
        assert!(state.feedback.is_none());
        assert_eq!(state.revision_count, 0);
    }

    #[test]
    fn test_research_data_accumulates() {
        let mut state = WorkflowState::new("t", "out");
        state.apply(&StateUpdate::research("first".to_string()));
        state.apply(&StateUpdate::research("second".to_string()));
        assert_eq!(state.research_data, vec!["first", "second"]);
    }

    #[test]
    fn test_analysis_overwrites() {
        let mut state = WorkflowState::new("t", "out");
        state.apply(&StateUpdate::analysis("v1".to_string()));
        state.apply(&StateUpdate::analysis("v2".to_string()));
        assert_eq!(state.analysis, "v2");
    }

    #[test]
    fn test_feedback_set_and_cleared() {
        let mut state = WorkflowState::new("t", "out");
        state.apply(&StateUpdate::rejected("too generic".to_string(), 1));
        assert_eq!(state.feedback.as_deref(), Some("too generic"));
        assert_eq!(state.revision_count, 1);

        // Updates that don't mention feedback leave it alone
        state.apply(&StateUpdate::analysis("better".to_string()));
        assert_eq!(state.feedback.as_deref(), Some("too generic"));

        state.apply(&StateUpdate::approved());
        assert!(state.feedback.is_none());
        assert_eq!(state.revision_count, 1);
    }

    #[test]
    fn test_actionable_feedback_ignores_blank() {
        let mut state = WorkflowState::new("t", "out");
        state.feedback = Some("   ".to_string());
        assert!(state.actionable_feedback().is_none());
        state.feedback = Some(" missing data ".to_string());
        assert_eq!(state.actionable_feedback(), Some("missing data"));
    }

    #[test]
    fn test_chart_paths_join_output_dir() {
        let mut state = WorkflowState::new("t", "runs/a");
        state.apply(&StateUpdate::charts(
            PathBuf::from("runs/b"),
            vec!["chart_1.png".to_string()],
        ));
        assert_eq!(state.chart_paths(), vec![PathBuf::from("runs/b/chart_1.png")]);
        assert_eq!(state.report_path(), PathBuf::from("runs/b/report.md"));
    }

    #[test]
    fn test_update_serialization_distinguishes_cleared_feedback() {
        let approved = serde_json::to_value(StateUpdate::approved()).unwrap();
        assert_eq!(approved, json!({ "feedback": null }));

        let untouched = serde_json::to_value(StateUpdate::analysis("a".to_string())).unwrap();
        assert_eq!(untouched, json!({ "analysis": "a" }));

        let back: StateUpdate = serde_json::from_value(approved).unwrap();
        assert_eq!(back.feedback, Some(None));
        let back: StateUpdate = serde_json::from_value(untouched).unwrap();
        assert_eq!(back.feedback, None);
    }
}
