//! Command-line entry point for the orchestrator. Stdout carries only the
//! final report JSON; everything else goes to stderr.

mod config;

use std::io::{BufRead, Write};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

use arbor_agent::{prompts, Orchestrator, OrchestratorConfig, OrchestratorEvent, ToolHandler};
use arbor_ai::{OpenAiAuthScheme, OpenAiClient, OpenAiConfig};
use arbor_rpc::{McpClient, McpClientConfig};

use config::RunConfig;

const COMPLETION_TIMEOUT_MS: u64 = 120_000;
const TOOL_ECHO_LIMIT: usize = 2_000;

#[derive(Debug, Parser)]
#[command(name = "arbor", about = "Tool-calling orchestrator for branch-executed agent runs")]
struct Cli {
    /// User task description; prompts interactively if omitted.
    #[arg(long)]
    task: Option<String>,

    /// Branch UUID to branch from.
    #[arg(long)]
    parent_branch_id: String,

    /// Overrides the PROJECT_NAME environment variable.
    #[arg(long)]
    project_name: Option<String>,

    /// Suppress conversation echo; only logs and the final report are emitted.
    #[arg(long)]
    headless: bool,
}

fn init_tracing() {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn prompt_for_task() -> Result<String> {
    eprint!("you> Enter task description: ");
    std::io::stderr().flush().context("flush prompt")?;
    let mut task = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut task)
        .context("read task from stdin")?;
    Ok(task.trim().to_string())
}

/// Echoes the conversation to stderr as it happens. Attached only in
/// interactive mode; the run loop itself is identical either way.
fn echo_events(event: &OrchestratorEvent) {
    match event {
        OrchestratorEvent::IterationStart { iteration } => {
            eprintln!("[iter {iteration}] requesting completion...");
        }
        OrchestratorEvent::AssistantText { text } => {
            eprintln!("assistant> {text}");
        }
        OrchestratorEvent::ToolCallStart { name, arguments } => {
            eprintln!("tool> {name} {arguments}");
        }
        OrchestratorEvent::ToolCallEnd { name: _, result } => {
            let rendered = serde_json::to_string(result).unwrap_or_default();
            let cut = rendered
                .char_indices()
                .nth(TOOL_ECHO_LIMIT)
                .map(|(index, _)| index)
                .unwrap_or(rendered.len());
            eprintln!("tool< {}", &rendered[..cut]);
        }
        OrchestratorEvent::NotFinalYet => {
            eprintln!("assistant< not final yet, continuing...");
        }
        OrchestratorEvent::ReportReady => {
            eprintln!("assistant< final_report");
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = RunConfig::from_env().context("configuration error")?;
    if cli.project_name.is_some() {
        config.project_name = cli.project_name.clone();
    }
    if config.project_name.is_none() {
        bail!("Project name must be provided via PROJECT_NAME or --project-name");
    }

    let task = match cli.task {
        Some(task) if !task.trim().is_empty() => task,
        _ => {
            let task = prompt_for_task()?;
            if task.is_empty() {
                bail!("task is required");
            }
            task
        }
    };

    let llm = OpenAiClient::new(OpenAiConfig {
        api_base: config.completion_api_base(),
        api_key: config.azure_api_key.clone(),
        auth_scheme: OpenAiAuthScheme::ApiKeyHeader,
        api_version: Some(config.azure_api_version.clone()),
        request_timeout_ms: COMPLETION_TIMEOUT_MS,
        max_retries: 3,
    })
    .context("completion client error")?;

    let rpc = McpClient::new(McpClientConfig {
        base_url: config.mcp_base_url.clone(),
        ..McpClientConfig::default()
    })
    .context("rpc client error")?;

    let tools = ToolHandler::new(
        Arc::new(rpc),
        config.project_name.clone(),
        Some(cli.parent_branch_id.clone()),
    );

    let mut orchestrator = Orchestrator::new(
        Arc::new(llm),
        tools,
        OrchestratorConfig::new(config.azure_deployment.clone()),
    );
    if !cli.headless {
        orchestrator.subscribe(echo_events);
    }
    for message in prompts::build_initial_messages(
        &task,
        config.project_name.as_deref().unwrap_or_default(),
        &config.workspace_dir,
        &cli.parent_branch_id,
    )? {
        orchestrator.push_message(message);
    }

    let report = orchestrator.run().await?.with_default_task(&task);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
