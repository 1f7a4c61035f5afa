mod config;
mod github;
mod model;
mod report;
mod review;
mod server;
mod task;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use github::ChangeHost;
use model::{GeminiModel, ModelCapability, NoopModel};
use review::Reviewer;
use server::AppState;
use task::runner::{ProgressBoard, TaskRunner, WorkQueue};
use task::TaskStore;

/// PR Review Service — analyzes GitHub Pull Requests for style, bug,
/// performance, and security issues, combining built-in detectors with a
/// model-backed critique.
#[derive(Parser, Debug)]
#[command(name = "pr-review-service", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service: submit PRs for asynchronous analysis.
    Serve,

    /// Analyze one PR and print the report, without starting the service.
    Analyze {
        /// GitHub Pull Request URL (e.g., https://github.com/org/repo/pull/42)
        pr_url: String,

        /// Optional output file path for a markdown report
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = config::Config::load()?;

    match cli.command {
        Command::Serve => serve(config).await,
        Command::Analyze { pr_url, output } => analyze(config, &pr_url, output.as_deref()).await,
    }
}

async fn serve(config: config::Config) -> Result<(), Box<dyn std::error::Error>> {
    let store = TaskStore::open(&config.database.path)?;
    let (queue, rx) = WorkQueue::new(64);
    let progress = ProgressBoard::default();

    let reviewer = Reviewer::new(build_model(&config));
    let runner = TaskRunner::new(
        store.clone(),
        reviewer,
        progress.clone(),
        config.github_token(),
    );
    tokio::spawn(task::runner::run(rx, runner));

    let state = AppState {
        store,
        queue,
        progress,
    };
    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(bind = %config.server.bind, "service listening");
    axum::serve(listener, server::router(state)).await?;
    Ok(())
}

async fn analyze(
    config: config::Config,
    pr_url: &str,
    output: Option<&std::path::Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let parsed = github::parse_pr_url(pr_url)?;
    info!(owner = %parsed.repo.owner, repo = %parsed.repo.repo, pr = parsed.pr_number, "parsed PR URL");

    let host = github::GithubClient::new(config.github_token());
    let pr = host.get_pull_request(&parsed.repo, parsed.pr_number).await?;
    info!(title = %pr.title, "fetched PR metadata");
    let changed = host
        .list_changed_files(&parsed.repo, parsed.pr_number)
        .await?;
    info!(files = changed.len(), "fetched changed file list");

    let files = task::runner::collect_review_files(&host, &parsed.repo, &pr, changed).await;
    let reviewer = Reviewer::new(build_model(&config));
    let results = reviewer.review_all(&files).await;

    report::output(&pr, &results, output)?;
    info!(issues = results.summary.total_issues, "done");
    Ok(())
}

fn build_model(config: &config::Config) -> Arc<dyn ModelCapability> {
    match config.model_api_key() {
        Some(api_key) => Arc::new(GeminiModel::new(api_key, config.model.name.clone())),
        None => {
            warn!("no model API key configured, model critique disabled");
            Arc::new(NoopModel)
        }
    }
}
