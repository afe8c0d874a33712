//! Project planning flow CLI.
//!
//! Reads a project request, runs the research, planning and execution crews
//! against the configured model and board services, and prints the report.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use pmflow::core::invariants::{CardSpecRules, DEFAULT_MIN_CARDS, validate_card_specs};
use pmflow::core::types::ProjectRequest;
use pmflow::crews::execution::CardReport;
use pmflow::exit_codes;
use pmflow::flow::ProjectFlow;
use pmflow::io::config::{Credentials, ExecutionMode, PmflowConfig, load_config, write_config};
use pmflow::io::schema::parse_card_specifications;
use pmflow::logging;

const DEFAULT_CONFIG: &str = "pmflow.toml";

#[derive(Parser)]
#[command(
    name = "pmflow",
    version,
    about = "Plan a software project onto a task board with LLM crews"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run research, board setup, planning and card execution for a request.
    Run {
        /// Project request JSON file.
        #[arg(long)]
        request: PathBuf,
        /// Populate this existing board instead of creating one.
        #[arg(long)]
        board_id: Option<String>,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Check a card specifications document against the schema and invariants.
    ValidateCards {
        #[arg(long)]
        file: PathBuf,
        /// Minimum number of cards (defaults to 10).
        #[arg(long)]
        min: Option<usize>,
        /// Accepted list ids; any id is accepted when omitted.
        #[arg(long = "list-id")]
        list_ids: Vec<String>,
    },
    /// Create the cards of a card specifications document (direct mode).
    ExecuteCards {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, default_value = DEFAULT_CONFIG)]
        config: PathBuf,
    },
    /// Write the default configuration file.
    InitConfig {
        #[arg(long, default_value = DEFAULT_CONFIG)]
        path: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    logging::init();
    match run(Cli::parse()).await {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run {
            request,
            board_id,
            config,
        } => cmd_run(&request, board_id.as_deref(), &config).await,
        Command::ValidateCards {
            file,
            min,
            list_ids,
        } => cmd_validate_cards(&file, min, list_ids),
        Command::ExecuteCards { file, config } => cmd_execute_cards(&file, &config).await,
        Command::InitConfig { path, force } => cmd_init_config(&path, force),
    }
}

async fn cmd_run(request_path: &Path, board_id: Option<&str>, config_path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(request_path)
        .with_context(|| format!("read {}", request_path.display()))?;
    let request: ProjectRequest = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", request_path.display()))?;
    let errors = request.validate();
    if !errors.is_empty() {
        print_json(&errors)?;
        return Ok(exit_codes::INVALID);
    }

    let cfg = load_config(config_path)?;
    let creds = Credentials::from_env()?;
    let flow = ProjectFlow::from_config(&cfg, &creds);
    let report = flow
        .run(&request, board_id, |phase| info!(phase = phase.name(), "phase started"))
        .await?;
    print_json(&report)?;
    Ok(cards_exit_code(&report.cards))
}

fn cmd_validate_cards(path: &Path, min: Option<usize>, list_ids: Vec<String>) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cards = parse_card_specifications(&raw)?;
    let rules = CardSpecRules {
        min_cards: min.unwrap_or(DEFAULT_MIN_CARDS),
        allowed_list_ids: list_ids.into_iter().collect(),
        timeline: None,
    };
    let errors = validate_card_specs(&cards.card_specifications, &rules);
    if !errors.is_empty() {
        bail!("invariant violations:\n- {}", errors.join("\n- "));
    }
    println!("{} card specifications are valid", cards.card_specifications.len());
    Ok(exit_codes::OK)
}

async fn cmd_execute_cards(path: &Path, config_path: &Path) -> Result<i32> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cards = parse_card_specifications(&raw)?;
    let mut cfg = load_config(config_path)?;
    cfg.flow.execution_mode = ExecutionMode::Direct;
    let creds = Credentials::from_env()?;
    let reports = ProjectFlow::from_config(&cfg, &creds)
        .execute_cards(&cards.card_specifications)
        .await?;
    print_json(&reports)?;
    Ok(cards_exit_code(&reports))
}

fn cmd_init_config(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &PmflowConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cards_exit_code(reports: &[CardReport]) -> i32 {
    if reports.iter().all(CardReport::is_completed) {
        exit_codes::OK
    } else {
        exit_codes::PARTIAL
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
