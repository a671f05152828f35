use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use log::debug;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::Error;
use crate::format::{format_size, progress_line};
use crate::install::{Outcome, STATUS_CANCELLED, STATUS_COMPLETE, STATUS_FAILED};
use crate::models::{self, DeleteOutcome, ModelCategory, ModelKind, RegistryEvent};
use crate::setup::Console;

/// Manage the models of a local Ollama host.
#[derive(Debug, Parser)]
#[command(name = "ollama-console", version)]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List installed models
    List,
    /// Show metadata of one model
    Show { model: String },
    /// Install a model, Ctrl-C cancels
    Pull {
        model: String,
        /// Let the host skip certificate validation for the registry
        #[arg(long)]
        insecure: bool,
    },
    /// Delete a model that is not loaded
    Rm { model: String },
    /// List models loaded in memory
    Ps {
        /// Keep polling and print every change until Ctrl-C
        #[arg(long)]
        watch: bool,
    },
    /// Summarize the host
    Status,
    /// Suggest models that are not installed yet
    Suggest {
        /// chat, vision or embeddings
        #[arg(long, value_parser = parse_category)]
        category: Option<ModelCategory>,
    },
    /// Show or change the stored host URL
    Config {
        /// New host URL, used from the next run on
        #[arg(long, conflicts_with = "reset")]
        host: Option<String>,
        /// Forget the stored host settings
        #[arg(long)]
        reset: bool,
    },
}

fn parse_category(value: &str) -> Result<ModelCategory, String> {
    ModelCategory::parse(value)
        .ok_or_else(|| format!("unknown category '{}' (chat, vision, embeddings)", value))
}

pub async fn run(cli: Cli) -> Result<ExitCode, Error> {
    let console = Console::setup(cli.config)?;
    debug!("Running {:?}", cli.command);

    match cli.command {
        Command::List => list(&console).await,
        Command::Show { model } => show(&console, &model).await,
        Command::Pull { model, insecure } => pull(&console, &model, insecure).await,
        Command::Rm { model } => remove(&console, &model).await,
        Command::Ps { watch: false } => running(&console).await,
        Command::Ps { watch: true } => watch_running(&console).await,
        Command::Status => status(&console).await,
        Command::Suggest { category } => suggest(&console, category).await,
        Command::Config { host, reset } => configure(&console, host, reset),
    }
}

async fn list(console: &Console) -> Result<ExitCode, Error> {
    let models = console.registry().try_fetch_installed().await?;
    if models.is_empty() {
        println!("No models installed.");
        return Ok(ExitCode::SUCCESS);
    }

    println!("{:<40} {:>10}  {:<10}  DIGEST", "NAME", "SIZE", "KIND");
    for model in models {
        let size = model.size.map(format_size).unwrap_or_else(|| "-".to_string());
        let digest: String = model.digest.chars().take(12).collect();
        println!(
            "{:<40} {:>10}  {:<10}  {}",
            model.name,
            size,
            ModelKind::classify(&model.name).to_string(),
            digest
        );
    }
    Ok(ExitCode::SUCCESS)
}

async fn show(console: &Console, model: &str) -> Result<ExitCode, Error> {
    let Some(details) = console.registry().fetch_details(model).await else {
        eprintln!("Could not load details of '{}'.", model);
        return Ok(ExitCode::FAILURE);
    };

    let summary = &details.details;
    println!("Model:          {}", model);
    println!("Family:         {}", summary.family);
    println!("Format:         {}", summary.format);
    println!("Parameters:     {}", summary.parameter_size);
    println!("Quantization:   {}", summary.quantization_level);
    if let Some(architecture) = details.architecture() {
        println!("Architecture:   {}", architecture);
    }
    if let Some(context) = details.context_length() {
        println!("Context length: {}", context);
    }
    if let Some(embedding) = details.embedding_length() {
        println!("Embedding size: {}", embedding);
    }
    if !details.template.is_empty() {
        println!("\nTemplate:\n{}", details.template);
    }
    Ok(ExitCode::SUCCESS)
}

async fn pull(console: &Console, model: &str, insecure: bool) -> Result<ExitCode, Error> {
    let installs = console.installs().clone();
    let insecure = insecure || console.installer_config().insecure;

    let view = installs.clone();
    let _progress = installs.subscribe(move |_| {
        eprint!("\r{}\x1b[K", progress_line(&view.snapshot()));
    });

    let refreshed = Arc::new(Notify::new());
    let notify = refreshed.clone();
    let _refresh = console.registry().subscribe(move |event| {
        if matches!(event, RegistryEvent::InstalledChanged { .. }) {
            notify.notify_one();
        }
    });

    let canceller = installs.clone();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            canceller.cancel();
        }
    });

    let outcome = installs.start(model, insecure).await;
    ctrl_c.abort();
    eprintln!();

    match outcome? {
        Outcome::Success => {
            println!("{}: {}", STATUS_COMPLETE, model);
            // The refresh runs after the success display delay
            let wait = Duration::from_millis(console.installer_config().success_display_ms)
                + console.host().request_timeout();
            if tokio::time::timeout(wait, refreshed.notified()).await.is_ok() {
                println!("{} models installed.", console.registry().installed().len());
            }
            Ok(ExitCode::SUCCESS)
        }
        Outcome::Cancelled => {
            println!("{}", STATUS_CANCELLED);
            Ok(ExitCode::from(130))
        }
        Outcome::Failed(reason) => {
            eprintln!("{}: {}", STATUS_FAILED, reason);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn remove(console: &Console, model: &str) -> Result<ExitCode, Error> {
    let registry = console.registry();
    // The guard needs a current view of loaded models
    registry.refresh_running().await;

    match registry.delete_model(model).await {
        DeleteOutcome::Deleted => {
            println!("Deleted '{}'.", model);
            Ok(ExitCode::SUCCESS)
        }
        DeleteOutcome::Running => {
            eprintln!("'{}' is loaded in memory; stop it before deleting.", model);
            Ok(ExitCode::FAILURE)
        }
        DeleteOutcome::Failed => {
            eprintln!("Could not delete '{}'.", model);
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn running(console: &Console) -> Result<ExitCode, Error> {
    let models = console.registry().fetch_running().await;
    if models.is_empty() {
        println!("No models loaded.");
    }
    for model in models {
        println!("{}", model.name);
    }
    Ok(ExitCode::SUCCESS)
}

async fn watch_running(console: &Console) -> Result<ExitCode, Error> {
    let _changes = console.registry().subscribe(|event| {
        if let RegistryEvent::RunningChanged { models } = event {
            let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
            println!("Running: {}", if names.is_empty() { "-".to_string() } else { names.join(", ") });
        }
    });

    let shutdown = CancellationToken::new();
    let poller = console.spawn_running_poller(shutdown.clone());

    tokio::signal::ctrl_c().await?;
    shutdown.cancel();
    // The poller only ends on shutdown, so a join error means it panicked
    if let Err(e) = poller.await {
        log::error!("Running-model poller failed: {}", e);
    }
    Ok(ExitCode::SUCCESS)
}

async fn status(console: &Console) -> Result<ExitCode, Error> {
    let status = models::probe(console.registry()).await;
    println!("Host:     {}", console.host().base_url);

    if !status.reachable {
        println!("Status:   offline");
        return Ok(ExitCode::FAILURE);
    }

    println!("Status:   online");
    println!("Models:   {}", status.model_count);
    println!("Running:  {}", status.running_count);
    println!("Memory:   {:.1} GB (estimated)", status.estimated_memory_gb);
    println!("Storage:  {:.1} GB (estimated)", status.estimated_storage_gb);
    Ok(ExitCode::SUCCESS)
}

async fn suggest(console: &Console, category: Option<ModelCategory>) -> Result<ExitCode, Error> {
    let installed = console.registry().refresh_installed().await;
    let categories = match category {
        Some(category) => vec![category],
        None => vec![ModelCategory::Chat, ModelCategory::Vision, ModelCategory::Embeddings],
    };

    for category in categories {
        let suggestions = models::suggestions(category, &installed);
        println!("[{}]", category);
        if suggestions.is_empty() {
            println!("  all suggested models are installed");
        }
        for suggestion in suggestions {
            println!("  {:<28} {}", suggestion.name, suggestion.size_label);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn configure(console: &Console, host: Option<String>, reset: bool) -> Result<ExitCode, Error> {
    if reset {
        console.reset_host_config()?;
        println!("Host settings reset.");
    } else if let Some(host) = host {
        console.save_base_url(&host)?;
        println!("Host set to {}.", host.trim());
    } else {
        println!("Host:   {}", console.host().base_url);
        match console.config_path() {
            Some(path) => println!("Config: {}", path.display()),
            None => println!("Config: (none)"),
        }
    }
    Ok(ExitCode::SUCCESS)
}
