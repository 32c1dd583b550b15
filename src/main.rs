//! Sprintdesk - command-line host
//!
//! Runs operation batches from files, answers status questions and offers
//! an interactive loop where free text is translated into operations.

use clap::{Parser, Subcommand};
use sprintdesk::api::{HttpApi, MemoryApi, ProjectApi};
use sprintdesk::core::config::Config;
use sprintdesk::core::error::{SprintdeskError, Result};
use sprintdesk::engine::{parse_batch, BatchOutcome, Engine, Operation};
use sprintdesk::llm::{translate, LlmClient, WorkspaceContext};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

/// Project management operations from the command line
#[derive(Parser, Debug)]
#[command(name = "sprintdesk")]
#[command(about = "Execute project-management operation batches and answer status questions")]
struct Args {
    /// TOML configuration file (defaults plus SPRINTDESK_* environment otherwise)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use an empty in-memory workspace instead of the REST API
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Execute a batch file: `[...]` or `{"operations": [...]}`
    Run {
        batch: PathBuf,

        /// Print per-operation results as JSON after the summary
        #[arg(long)]
        json: bool,
    },

    /// Ask about a project, sprint, task or `general`
    Query {
        entity_type: String,

        /// Name or numeric id; ignored for `general`
        name: String,

        question: Vec<String>,

        /// Print the stats snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive loop; requires LLM_API_KEY
    Repl,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sprintdesk=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if args.offline {
        // nothing to wait for in memory
        config.engine.consistency_wait_ms = 0;
    }

    let api = connect(&config, args.offline).await?;
    let engine = Engine::new(api, config);

    match args.command {
        Command::Run { batch, json } => {
            let text = tokio::fs::read_to_string(&batch).await?;
            let operations = parse_batch(&text)?;
            let outcome = execute_with_deadline(&engine, &operations).await?;
            println!("{}", outcome.summary_text);
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.results)?);
            }
        }
        Command::Query {
            entity_type,
            name,
            question,
            json,
        } => {
            let question = question.join(" ");
            let outcome = engine.query(&entity_type, &name, &question).await?;
            println!("{}", outcome.narrative);
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome.stats)?);
            }
        }
        Command::Repl => repl(&engine).await?,
    }
    Ok(())
}

/// Build the collaborator API, logging in when credentials are configured
async fn connect(config: &Config, offline: bool) -> Result<Arc<dyn ProjectApi>> {
    if offline {
        tracing::info!("Offline mode: using an in-memory workspace");
        return Ok(Arc::new(MemoryApi::new()));
    }

    let api = HttpApi::new(&config.api)?;
    if let (Some(username), Some(password)) = (&config.api.username, &config.api.password) {
        api.login(username, password).await?;
    } else {
        tracing::warn!("No API credentials configured; sending unauthenticated requests");
    }
    Ok(Arc::new(api))
}

async fn execute_with_deadline(engine: &Engine, batch: &[Operation]) -> Result<BatchOutcome> {
    let secs = engine.config().engine.batch_timeout_secs;
    tokio::time::timeout(Duration::from_secs(secs), engine.execute(batch))
        .await
        .map_err(|_| SprintdeskError::Timeout(secs))
}

async fn repl(engine: &Engine) -> Result<()> {
    let client = LlmClient::from_env()?;
    let mut focus: Option<String> = None;

    println!("\n=== SPRINTDESK ===");
    println!("Commands:");
    println!("  use <project>   - Focus requests on a project");
    println!("  quit / q        - Exit");
    println!("  <any text>      - Request translated into operations and executed");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;

        let Some(input) = lines.next_line().await? else {
            break;
        };
        let input = input.trim();
        if input.is_empty() {
            continue;
        }
        if input == "quit" || input == "q" {
            break;
        }

        let mut context = WorkspaceContext::from_api(engine.api()).await?;

        if let Some(project) = input.strip_prefix("use ") {
            if context.focus(project.trim()) {
                focus = Some(project.trim().to_string());
                println!("Focused on {}", project.trim());
            } else {
                println!("No project named '{}'", project.trim());
            }
            continue;
        }
        if let Some(project) = &focus {
            context.focus(project);
        }

        let batch = match translate(&client, input, &context).await {
            Ok(batch) => batch,
            Err(e) => {
                println!("Could not translate request: {}", e);
                continue;
            }
        };
        if batch.is_empty() {
            println!("Nothing to do.");
            continue;
        }

        match execute_with_deadline(engine, &batch).await {
            Ok(outcome) => println!("{}\n", outcome.summary_text),
            Err(e) => println!("{}\n", e),
        }
    }

    println!("\nGoodbye!");
    Ok(())
}
