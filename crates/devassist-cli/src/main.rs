//! DevAssist - daily developer briefing
//!
//! The `devassist` command collects status from the configured extensions
//! and asks the configured AI backend for a summary.
//!
//! ## Commands
//!
//! - `run`: Collect and summarize (the default)
//! - `config`: Show the current settings with secrets redacted
//! - `setup`: Interactive settings wizard
//! - `install-extension`: Create a user extension template

mod wizard;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use devassist_connectors::builtin_catalog;
use devassist_core::config::HOME_ENV;
use devassist_core::{
    init_tracing, install_extension, select_backend, Aggregator, Briefing, ConnectorLoader,
    ConnectorRegistry, ExtensionDir, Paths, Pipeline, PipelineError, Settings, NO_DATA_MESSAGE,
};

#[derive(Parser)]
#[command(name = "devassist")]
#[command(author = "DevAssist Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Daily briefing from your developer tools", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Settings directory (default: ~/.devassist)
    #[arg(long, global = true, env = HOME_ENV, value_name = "DIR")]
    home: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Collect from every enabled extension and print a summary
    Run,

    /// Show the current settings
    Config,

    /// Interactively edit the settings
    Setup,

    /// Create an extension template in the extensions directory
    InstallExtension {
        /// Extension name (letters, digits, '-', '_' or '.')
        name: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let paths = Paths::resolve(cli.home.as_deref()).context("Failed to locate settings")?;

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => cmd_run(&paths).await,
        Commands::Config => cmd_config(&paths),
        Commands::Setup => cmd_setup(&paths),
        Commands::InstallExtension { name } => cmd_install_extension(&paths, &name),
    }
}

/// Collect, summarize and print the briefing.
///
/// Only an unresolvable backend is an error; everything after that is
/// reported on stdout.
async fn cmd_run(paths: &Paths) -> Result<()> {
    let settings = Settings::load_or_init(paths);

    let ai = settings
        .ai_config()
        .context("Cannot resolve the AI backend")?;
    let backend = select_backend(&ai).context("Cannot resolve the AI backend")?;
    info!(backend = %ai.backend, model = %ai.model, "backend selected");

    let mut registry = ConnectorRegistry::new();
    settings.populate(&mut registry);
    let loader = ConnectorLoader::standard(
        builtin_catalog(),
        ExtensionDir::new(&paths.extensions_dir, settings.collect_timeout()),
        settings.init_timeout(),
    );
    let aggregator = Aggregator::new(settings.collect_timeout());

    let mut pipeline = Pipeline::new(registry, loader, aggregator, backend);
    match pipeline.run().await {
        Ok(briefing) => print!("{}", render_briefing(&briefing)),
        Err(PipelineError::Backend(e)) => print!("{}", render_framed(&format!("Error: {e}"))),
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn cmd_config(paths: &Paths) -> Result<()> {
    let settings = Settings::load_or_init(paths);
    let redacted = settings.redacted()?;
    println!("{}", serde_json::to_string_pretty(&redacted)?);
    Ok(())
}

fn cmd_setup(paths: &Paths) -> Result<()> {
    let mut settings = Settings::load_or_init(paths);

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();
    wizard::run(&mut settings, &mut input, &mut output).context("Setup aborted")?;

    settings
        .save(&paths.config_file)
        .context("Failed to save settings")?;
    println!();
    println!("Configuration saved to {}", paths.config_file.display());
    Ok(())
}

fn cmd_install_extension(paths: &Paths, name: &str) -> Result<()> {
    let mut settings = Settings::load_or_init(paths);
    println!("Installing extension: {name}");

    let report = install_extension(paths, &mut settings, name)
        .with_context(|| format!("Failed to install extension {name}"))?;

    println!("Extension template created at {}", report.path.display());
    println!("Edit this file to implement your extension functionality");
    if report.added_to_settings {
        println!("Added {name} to configuration");
    }
    Ok(())
}

fn render_framed(body: &str) -> String {
    let rule = "=".repeat(80);
    format!("\n{rule}\n DEVELOPER ASSISTANT SUMMARY \n{rule}\n\n{body}\n\n{rule}\n")
}

fn render_briefing(briefing: &Briefing) -> String {
    if briefing.no_data {
        render_framed(&format!("{NO_DATA_MESSAGE}\n\n{}", briefing.summary))
    } else {
        render_framed(&briefing.summary)
    }
}
