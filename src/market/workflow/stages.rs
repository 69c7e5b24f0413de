// SPDX-License-Identifier: MIT

//! The five workflow stages
//!
//! Each node reads the current [`WorkflowState`] and returns a
//! [`StateUpdate`]. Upstream failures propagate; only the chart node
//! absorbs errors from its sandbox.

use super::graph::Stage;
use super::prompts;
use super::review::Verdict;
use super::state::{StateUpdate, WorkflowState};
use crate::adk::agent::Agent;
use crate::adk::error::Result;
use crate::adk::tool::Tool;
use crate::market::charts::{self, ChartRenderer};
use crate::market::tools::search::results_to_text;
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

/// One node of the workflow graph
#[async_trait]
pub trait Node: Send + Sync {
    /// Which stage this node implements
    fn stage(&self) -> Stage;

    /// Compute this stage's update from the current state
    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate>;
}

/// Searches the web for the topic, narrowed by reviewer feedback
pub struct ResearcherNode {
    search: Arc<dyn Tool>,
}

impl ResearcherNode {
    pub fn new(search: Arc<dyn Tool>) -> Self {
        Self { search }
    }
}

#[async_trait]
impl Node for ResearcherNode {
    fn stage(&self) -> Stage {
        Stage::Researcher
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate> {
        let feedback = state.actionable_feedback();
        if let Some(f) = feedback {
            log::info!("Researcher: refining search based on feedback: {}", f);
        }
        let query = prompts::research_query(&state.topic, feedback);
        log::info!("Researcher: searching with {} for '{}'", self.search.name(), query);

        let output = self.search.execute(json!({ "query": query })).await?;
        Ok(StateUpdate::research(results_to_text(&output)))
    }
}

/// Turns accumulated research into an analysis
pub struct AnalystNode {
    agent: Arc<dyn Agent>,
}

impl AnalystNode {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Node for AnalystNode {
    fn stage(&self) -> Stage {
        Stage::Analyst
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate> {
        log::info!(
            "Analyst: analyzing {} research entries",
            state.research_data.len()
        );
        let prompt = prompts::analysis_prompt(
            &state.topic,
            &state.research_data,
            state.actionable_feedback(),
        );
        let analysis = self.agent.run(prompt).await?;
        Ok(StateUpdate::analysis(analysis))
    }
}

/// Judges the analysis and owns the revision cap
pub struct ReviewerNode {
    agent: Arc<dyn Agent>,
    max_revisions: u32,
}

impl ReviewerNode {
    pub fn new(agent: Arc<dyn Agent>, max_revisions: u32) -> Self {
        Self {
            agent,
            max_revisions,
        }
    }
}

#[async_trait]
impl Node for ReviewerNode {
    fn stage(&self) -> Stage {
        Stage::Reviewer
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate> {
        if state.revision_count >= self.max_revisions {
            log::info!(
                "Reviewer: max revisions ({}) reached, approving",
                self.max_revisions
            );
            return Ok(StateUpdate::approved());
        }

        log::info!("Reviewer: reviewing analysis");
        let judgment = self
            .agent
            .run(prompts::review_prompt(&state.topic, &state.analysis))
            .await?;

        match Verdict::parse(&judgment) {
            Verdict::Approved => {
                log::info!("Reviewer: analysis approved");
                Ok(StateUpdate::approved())
            }
            Verdict::Rejected(feedback) => {
                let count = state.revision_count + 1;
                log::info!(
                    "Reviewer: analysis rejected (revision {}/{}): {}",
                    count,
                    self.max_revisions,
                    feedback
                );
                Ok(StateUpdate::rejected(feedback, count))
            }
        }
    }
}

/// Asks for plotting code and materializes it through the sandbox
pub struct ChartGeneratorNode {
    agent: Arc<dyn Agent>,
    renderer: Arc<dyn ChartRenderer>,
}

impl ChartGeneratorNode {
    pub fn new(agent: Arc<dyn Agent>, renderer: Arc<dyn ChartRenderer>) -> Self {
        Self { agent, renderer }
    }
}

#[async_trait]
impl Node for ChartGeneratorNode {
    fn stage(&self) -> Stage {
        Stage::ChartGenerator
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate> {
        let dir = state.output_dir.clone();
        log::info!("Chart Generator: creating charts in {}", dir.display());

        tokio::fs::create_dir_all(&dir).await?;
        let removed = charts::clear_chart_files(&dir).await?;
        if removed > 0 {
            log::info!("Chart Generator: removed {} stale chart files", removed);
        }

        let raw = self.agent.run(prompts::chart_prompt(&state.analysis)).await?;
        let script = charts::strip_code_fences(&raw);

        match self.renderer.render(&script, &dir).await {
            Ok(()) => log::info!("Chart Generator: script finished"),
            Err(e) => log::warn!("Chart Generator: failed to generate charts: {}", e),
        }

        let files = charts::list_chart_files(&dir).await?;
        log::info!("Chart Generator: {} charts available", files.len());
        Ok(StateUpdate::charts(dir, files))
    }
}

/// Writes the final Markdown report
pub struct WriterNode {
    agent: Arc<dyn Agent>,
}

impl WriterNode {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl Node for WriterNode {
    fn stage(&self) -> Stage {
        Stage::Writer
    }

    async fn run(&self, state: &WorkflowState) -> Result<StateUpdate> {
        log::info!("Writer: writing report");
        let prompt = prompts::report_prompt(&state.topic, &state.analysis, &state.chart_files);
        let report = self.agent.run(prompt).await?;
        Ok(StateUpdate::report(ensure_chart_references(
            report,
            &state.chart_files,
        )))
    }
}

/// Append an inline image for every chart the report fails to mention
pub fn ensure_chart_references(mut report: String, chart_files: &[String]) -> String {
    let missing: Vec<(usize, &String)> = chart_files
        .iter()
        .enumerate()
        .filter(|(_, f)| !report.contains(f.as_str()))
        .collect();

    if missing.is_empty() {
        return report;
    }

    log::warn!(
        "Writer: report omitted {} of {} charts, appending them",
        missing.len(),
        chart_files.len()
    );
    for (idx, file) in missing {
        report.push_str(&format!("\n\n![Figure {}]({})", idx + 1, file));
    }
    report
}
