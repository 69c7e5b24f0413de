//! Research graph executor

use super::types::{Stage, StageEvent};
use crate::adk::agent::{Agent, LLMAgent};
use crate::adk::error::{Result, WorkflowError};
use crate::market::charts::PythonSandbox;
use crate::market::config::WorkflowConfig;
use crate::market::history::slugify;
use crate::market::tools::search::create_search_tool;
use crate::market::workflow::prompts;
use crate::market::workflow::stages::{
    AnalystNode, ChartGeneratorNode, Node, ResearcherNode, ReviewerNode, WriterNode,
};
use crate::market::workflow::state::WorkflowState;
use futures::stream::{self, Stream};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Sequential executor for the five-stage research graph
pub struct ResearchGraph {
    nodes: HashMap<Stage, Arc<dyn Node>>,
    output_root: PathBuf,
    max_revisions: u32,
}

impl ResearchGraph {
    /// Create a graph from its nodes
    ///
    /// `max_revisions` must match the cap the reviewer node enforces; the
    /// graph only uses it to bound the number of stage executions.
    pub fn new(
        nodes: Vec<Arc<dyn Node>>,
        output_root: impl Into<PathBuf>,
        max_revisions: u32,
    ) -> Self {
        let nodes = nodes.into_iter().map(|n| (n.stage(), n)).collect();
        Self {
            nodes,
            output_root: output_root.into(),
            max_revisions,
        }
    }

    /// Wire real collaborators for the configured provider
    pub fn from_config(config: &WorkflowConfig) -> Result<Self> {
        let model = config.provider.build_model(config.model_name.as_deref())?;
        let generation = config.generation();

        let agent = |name: &str, instruction: &str| -> Arc<dyn Agent> {
            let agent = LLMAgent::new(name.to_string(), instruction.to_string(), model.clone());
            match &generation {
                Some(g) => Arc::new(agent.with_config(g.clone())),
                None => Arc::new(agent),
            }
        };

        let nodes: Vec<Arc<dyn Node>> = vec![
            Arc::new(ResearcherNode::new(create_search_tool())),
            Arc::new(AnalystNode::new(agent(
                "analyst",
                prompts::ANALYST_INSTRUCTION,
            ))),
            Arc::new(ReviewerNode::new(
                agent("reviewer", prompts::REVIEWER_INSTRUCTION),
                config.max_revisions,
            )),
            Arc::new(ChartGeneratorNode::new(
                agent("chart_generator", prompts::CHART_INSTRUCTION),
                Arc::new(PythonSandbox::from_config(&config.sandbox)),
            )),
            Arc::new(WriterNode::new(agent("writer", prompts::WRITER_INSTRUCTION))),
        ];

        Ok(Self::new(
            nodes,
            config.output_root.clone(),
            config.max_revisions,
        ))
    }

    /// Stage executions a run may take: `cap + 1` research loops plus charts and writer
    pub fn max_steps(&self) -> u32 {
        3 * (self.max_revisions + 1) + 2
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    /// Start a run without executing anything yet
    pub fn start(&self, topic: &str) -> Result<WorkflowRun<'_>> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(WorkflowError::EmptyTopic.into());
        }

        let dir = self.output_root.join(run_dir_name(topic));
        Ok(WorkflowRun {
            graph: self,
            state: WorkflowState::new(topic, dir),
            next: Some(Stage::ENTRY),
            steps: 0,
        })
    }

    /// Run to completion and return the final state
    pub async fn run(&self, topic: &str) -> Result<WorkflowState> {
        let mut run = self.start(topic)?;
        while run.step().await?.is_some() {}
        log::info!(
            "Workflow for '{}' finished after {} stages",
            run.state.topic,
            run.steps
        );
        Ok(run.into_state())
    }

    /// Lazily execute the run, yielding one event per completed stage
    ///
    /// Nothing executes until the stream is polled. An error is yielded once
    /// and ends the stream.
    pub fn run_stream(&self, topic: &str) -> impl Stream<Item = Result<StageEvent>> + '_ {
        let first = self.start(topic);
        stream::unfold(Some(first), |pending| async move {
            let mut run = match pending {
                Some(Ok(run)) => run,
                Some(Err(e)) => return Some((Err(e), None)),
                None => return None,
            };
            match run.step().await {
                Ok(Some(event)) => Some((Ok(event), Some(Ok(run)))),
                Ok(None) => None,
                Err(e) => Some((Err(e), None)),
            }
        })
    }
}

/// One in-flight execution of the graph
pub struct WorkflowRun<'a> {
    graph: &'a ResearchGraph,
    state: WorkflowState,
    next: Option<Stage>,
    steps: u32,
}

impl WorkflowRun<'_> {
    /// Execute the next stage; `Ok(None)` once the writer has finished
    pub async fn step(&mut self) -> Result<Option<StageEvent>> {
        let stage = match self.next {
            Some(stage) => stage,
            None => return Ok(None),
        };

        let limit = self.graph.max_steps();
        if self.steps >= limit {
            log::error!("Graph execution exceeded {} stage executions", limit);
            self.next = None;
            return Err(WorkflowError::MaxSteps { limit }.into());
        }

        let node = self
            .graph
            .nodes
            .get(&stage)
            .ok_or_else(|| WorkflowError::MissingStage(stage.to_string()))?;

        self.steps += 1;
        log::info!("Executing stage {} (step {})", stage, self.steps);

        let update = match node.run(&self.state).await {
            Ok(update) => update,
            Err(e) => {
                log::error!("Stage {} failed: {}", stage, e);
                self.next = None;
                return Err(e);
            }
        };

        self.state.apply(&update);
        self.next = stage.next(&self.state);

        Ok(Some(StageEvent {
            step: self.steps,
            stage,
            update,
            state: self.state.clone(),
        }))
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn into_state(self) -> WorkflowState {
        self.state
    }
}

/// `{timestamp}_{topic-slug}_{short-id}`
fn run_dir_name(topic: &str) -> String {
    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", stamp, slugify(topic), &id[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adk::error::MarketError;
    use crate::market::workflow::state::StateUpdate;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<Stage>>>;

    /// Node that records its execution and returns a canned update
    struct MockNode {
        stage: Stage,
        log: Log,
        respond: Box<dyn Fn(&WorkflowState) -> Result<StateUpdate> + Send + Sync>,
    }

    #[async_trait]
    impl Node for MockNode {
        fn stage(&self) -> Stage {
            self.stage
        }

        async fn run(&self, state: &WorkflowState) -> Result<StateUpdate> {
            self.log.lock().unwrap().push(self.stage);
            (self.respond)(state)
        }
    }

    fn node<F>(stage: Stage, log: &Log, respond: F) -> Arc<dyn Node>
    where
        F: Fn(&WorkflowState) -> Result<StateUpdate> + Send + Sync + 'static,
    {
        Arc::new(MockNode {
            stage,
            log: log.clone(),
            respond: Box::new(respond),
        })
    }

    /// Graph whose reviewer rejects `rejections` times, then defers to the cap
    fn graph(log: &Log, cap: u32, rejections: u32) -> ResearchGraph {
        ResearchGraph::new(
            vec![
                node(Stage::Researcher, log, |_| Ok(StateUpdate::research("data".into()))),
                node(Stage::Analyst, log, |_| Ok(StateUpdate::analysis("analysis".into()))),
                node(Stage::Reviewer, log, move |s| {
                    if s.revision_count >= cap || s.revision_count >= rejections {
                        Ok(StateUpdate::approved())
                    } else {
                        Ok(StateUpdate::rejected("more".into(), s.revision_count + 1))
                    }
                }),
                node(Stage::ChartGenerator, log, |s| {
                    Ok(StateUpdate::charts(
                        s.output_dir.clone(),
                        vec!["chart_1.png".into()],
                    ))
                }),
                node(Stage::Writer, log, |_| Ok(StateUpdate::report("# Report".into()))),
            ],
            "runs",
            cap,
        )
    }

    #[tokio::test]
    async fn test_run_without_rejection_visits_five_stages() {
        let log: Log = Arc::default();
        let state = graph(&log, 2, 0).run("Solar").await.unwrap();

        assert_eq!(*log.lock().unwrap(), Stage::ALL.to_vec());
        assert_eq!(state.final_report, "# Report");
        assert_eq!(state.research_data, vec!["data"]);
        assert!(state.output_dir.starts_with("runs"));
    }

    #[tokio::test]
    async fn test_single_rejection_loops_once() {
        let log: Log = Arc::default();
        let state = graph(&log, 2, 1).run("Solar").await.unwrap();

        assert_eq!(log.lock().unwrap().len(), 8);
        assert_eq!(state.revision_count, 1);
        assert_eq!(state.research_data.len(), 2);
        assert!(state.feedback.is_none());
    }

    #[tokio::test]
    async fn test_stream_is_lazy() {
        let log: Log = Arc::default();
        let g = graph(&log, 2, 0);
        let mut events = Box::pin(g.run_stream("Solar"));
        assert!(log.lock().unwrap().is_empty());

        let first = events.next().await.unwrap().unwrap();
        assert_eq!(first.stage, Stage::Researcher);
        assert_eq!(first.step, 1);
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_stage_failure_ends_stream() {
        let log: Log = Arc::default();
        let g = ResearchGraph::new(
            vec![
                node(Stage::Researcher, &log, |_| Ok(StateUpdate::research("d".into()))),
                node(Stage::Analyst, &log, |_| {
                    Err(MarketError::api("Gemini", "503 unavailable"))
                }),
            ],
            "runs",
            2,
        );

        let events: Vec<_> = g.run_stream("Solar").collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(events[1], Err(MarketError::Api { .. })));

        assert!(g.run("Solar").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_node_is_workflow_error() {
        let log: Log = Arc::default();
        let g = ResearchGraph::new(
            vec![node(Stage::Researcher, &log, |_| {
                Ok(StateUpdate::research("d".into()))
            })],
            "runs",
            2,
        );
        let err = g.run("Solar").await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Workflow(WorkflowError::MissingStage(_))
        ));
    }

    #[tokio::test]
    async fn test_reviewer_ignoring_cap_hits_step_limit() {
        let log: Log = Arc::default();
        let g = ResearchGraph::new(
            vec![
                node(Stage::Researcher, &log, |_| Ok(StateUpdate::research("d".into()))),
                node(Stage::Analyst, &log, |_| Ok(StateUpdate::analysis("a".into()))),
                node(Stage::Reviewer, &log, |s| {
                    Ok(StateUpdate::rejected("again".into(), s.revision_count + 1))
                }),
            ],
            "runs",
            1,
        );

        let err = g.run("Solar").await.unwrap_err();
        assert!(matches!(
            err,
            MarketError::Workflow(WorkflowError::MaxSteps { limit: 8 })
        ));
        assert_eq!(log.lock().unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_empty_topic_rejected() {
        let log: Log = Arc::default();
        let g = graph(&log, 2, 0);
        assert!(matches!(
            g.run("   ").await,
            Err(MarketError::Workflow(WorkflowError::EmptyTopic))
        ));

        let events: Vec<_> = g.run_stream("").collect().await;
        assert_eq!(events.len(), 1);
        assert!(events[0].is_err());
    }

    #[test]
    fn test_run_dir_name_is_unique_and_slugged() {
        let a = run_dir_name("Renewable Energy!");
        let b = run_dir_name("Renewable Energy!");
        assert_ne!(a, b);
        assert!(a.contains("_Renewable_Energy_"));
    }
}
