use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use work_pilot::cli::{Cli, Commands, ConfigAction, Display, OutputFormat};
use work_pilot::config::{WorkConfig, WorkPaths};
use work_pilot::error::{Result, WorkError};
use work_pilot::model::{DeleteMode, EntityStore, MemoryStore};
use work_pilot::nlp::SessionContext;
use work_pilot::orchestrator::{Orchestrator, PipelineResponse};

struct OutputContext<'a> {
    display: &'a Display,
    format: OutputFormat,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            Display::new().print_error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("work_pilot=debug")
    } else {
        EnvFilter::new("work_pilot=info")
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).without_time().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// `Ok(false)` when the command ran but reported failures.
async fn run(cli: Cli) -> Result<bool> {
    let display = Display::new();
    let out = OutputContext {
        display: &display,
        format: cli.output,
    };
    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let paths = WorkPaths::new(root);

    match cli.command {
        Commands::Init => cmd_init(&out, &paths).await.map(|()| true),
        Commands::Exec {
            utterance,
            project,
            threshold,
            hard,
        } => cmd_exec(&out, &paths, &utterance, project, threshold, hard).await,
        Commands::Config { action } => cmd_config(&out, &paths, action).await.map(|()| true),
    }
}

fn ensure_initialized(paths: &WorkPaths) -> Result<()> {
    if !paths.work_dir.exists() {
        return Err(WorkError::NotInitialized);
    }
    Ok(())
}

async fn cmd_init(out: &OutputContext<'_>, paths: &WorkPaths) -> Result<()> {
    if paths.work_dir.exists() {
        if out.format == OutputFormat::Text {
            out.display
                .print_warning("work-pilot is already initialized here.");
        }
        return Ok(());
    }

    paths.ensure_dirs().await?;
    WorkConfig::default().save(&paths.work_dir).await?;

    match out.format {
        OutputFormat::Text => {
            out.display.print_success("Initialized work-pilot.");
            out.display
                .print_info(&format!("Config: {}", paths.config_file.display()));
        }
        OutputFormat::Json => {
            let json = serde_json::json!({
                "initialized": true,
                "work_dir": paths.work_dir,
            });
            println!("{}", serde_json::to_string_pretty(&json)?);
        }
    }
    Ok(())
}

fn open_store(paths: &WorkPaths, config: &WorkConfig) -> Result<Arc<dyn EntityStore>> {
    if config.store.persist {
        let snapshot: PathBuf = paths.snapshot_file(&config.store);
        Ok(Arc::new(MemoryStore::open(snapshot)?))
    } else {
        Ok(Arc::new(MemoryStore::new()))
    }
}

async fn cmd_exec(
    out: &OutputContext<'_>,
    paths: &WorkPaths,
    utterance: &str,
    project: Option<u64>,
    threshold: Option<f32>,
    hard: bool,
) -> Result<bool> {
    ensure_initialized(paths)?;
    let config = WorkConfig::load(&paths.work_dir).await?;
    let store = open_store(paths, &config)?;
    let mode = if hard {
        DeleteMode::Hard
    } else {
        config.bulk.delete_mode
    };

    let orchestrator = Orchestrator::new(config, store)?;
    if let Some(threshold) = threshold {
        orchestrator.set_confidence_threshold(threshold)?;
    }

    let session = match project {
        Some(id) => SessionContext::for_project(id),
        None => SessionContext::new(),
    };
    let response = orchestrator
        .process_with_mode(utterance, &session, mode)
        .await?;

    match out.format {
        OutputFormat::Text => match &response {
            PipelineResponse::Executed(result) => out.display.print_result(result),
            PipelineResponse::Clarification(clarification) => {
                out.display.print_clarification(clarification)
            }
            PipelineResponse::NotACommand { intent, .. } => out.display.print_info(&format!(
                "That reads as a {}, not a command; nothing was changed.",
                intent
            )),
        },
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&response)?),
    }

    Ok(response.execution().is_none_or(|result| result.success))
}

async fn cmd_config(out: &OutputContext<'_>, paths: &WorkPaths, action: ConfigAction) -> Result<()> {
    ensure_initialized(paths)?;

    match action {
        ConfigAction::Show => {
            let config = WorkConfig::load(&paths.work_dir).await?;
            match out.format {
                OutputFormat::Text => {
                    let text = toml::to_string_pretty(&config)
                        .map_err(|e| WorkError::Config(e.to_string()))?;
                    println!("{}", text);
                }
                OutputFormat::Json => {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                }
            }
        }
        ConfigAction::Reset => {
            WorkConfig::default().save(&paths.work_dir).await?;
            if out.format == OutputFormat::Text {
                out.display
                    .print_success("Configuration reset to defaults.");
            }
        }
    }

    Ok(())
}
