use clap::{Parser, Subcommand};
use dotenv::dotenv;
use futures::StreamExt;
use market_agents::market::config::{Provider, WorkflowConfig};
use market_agents::market::history::{self, DirectoryReportStore, ReportStore};
use market_agents::market::server;
use market_agents::market::workflow::{ResearchGraph, WorkflowState};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Optional YAML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a report and print it when finished
    Run {
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Generate a report, printing each stage as it completes
    Stream {
        #[command(flatten)]
        opts: RunOpts,
    },
    /// Serve the HTTP API
    Serve {
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },
    /// Browse saved reports
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(clap::Args, Debug)]
struct RunOpts {
    /// Market or industry to research
    #[arg(short, long)]
    topic: String,

    /// Text-generation backend
    #[arg(short, long, value_enum)]
    provider: Option<Provider>,

    /// Model name, overriding the provider default
    #[arg(short, long)]
    model: Option<String>,

    /// Rejections allowed before the reviewer must approve
    #[arg(long)]
    max_revisions: Option<u32>,

    /// Keep a copy of the report in the history directory
    #[arg(long)]
    save: bool,
}

impl RunOpts {
    fn apply(&self, config: &mut WorkflowConfig) {
        if let Some(provider) = self.provider {
            if provider != config.provider && self.model.is_none() {
                config.model_name = None;
            }
            config.provider = provider;
        }
        if let Some(model) = &self.model {
            config.model_name = Some(model.clone());
        }
        if let Some(cap) = self.max_revisions {
            config.max_revisions = cap;
        }
    }
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// List saved reports, newest first
    List,
    /// Print a saved report
    Show { id: String },
}

type BoxError = Box<dyn std::error::Error + Send + Sync>;

async fn finish(
    config: &WorkflowConfig,
    state: &WorkflowState,
    save: bool,
) -> Result<(), BoxError> {
    let path = history::write_run_report(state).await?;
    println!("Report written to {}", path.display());

    if save {
        let store = DirectoryReportStore::new(config.history_dir.clone());
        let id = history::save_run(&store, state).await?;
        println!("Saved to history as {}", id);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();
    let mut config = WorkflowConfig::load(args.config.as_deref())?;

    match args.command {
        Commands::Run { opts } => {
            opts.apply(&mut config);
            let graph = ResearchGraph::from_config(&config)?;

            println!("Researching: {}", opts.topic);
            let state = graph.run(&opts.topic).await?;
            println!("{}", state.final_report);
            finish(&config, &state, opts.save).await?;
        }
        Commands::Stream { opts } => {
            opts.apply(&mut config);
            let graph = ResearchGraph::from_config(&config)?;

            let mut events = Box::pin(graph.run_stream(&opts.topic));
            let mut last = None;
            while let Some(event) = events.next().await {
                let event = event?;
                println!(
                    "[{}] {} (revisions: {})",
                    event.step, event.stage, event.state.revision_count
                );
                if let Some(feedback) = event.state.actionable_feedback() {
                    println!("    feedback: {}", feedback);
                }
                last = Some(event.state);
            }

            if let Some(state) = last {
                println!("\n{}", state.final_report);
                finish(&config, &state, opts.save).await?;
            }
        }
        Commands::Serve { port } => {
            server::serve(port, config).await?;
        }
        Commands::History { action } => {
            let store = DirectoryReportStore::new(config.history_dir.clone());
            match action {
                HistoryAction::List => {
                    let reports = store.list().await?;
                    if reports.is_empty() {
                        println!("No saved reports in {}", store.root().display());
                    }
                    for report in reports {
                        println!("{}  {}  {}", report.id, report.date, report.topic);
                    }
                }
                HistoryAction::Show { id } => match store.load(&id).await? {
                    Some(report) => println!("{}", report.content),
                    None => return Err(format!("No saved report with id '{}'", id).into()),
                },
            }
        }
    }

    Ok(())
}
