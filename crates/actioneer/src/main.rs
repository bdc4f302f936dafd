//! Actioneer CLI
//!
//! Runs the webhook server, validates configuration, or processes a single
//! notification from a file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use actioneer::config::DEFAULT_CONFIG_PATH;
use actioneer::{
    decode, run_server, Catalog, Config, Dispatcher, ServerState, ShellExecutor, ShellRunner,
};

/// Run shell commands when Alertmanager alerts fire
#[derive(Parser)]
#[command(name = "actioneer")]
#[command(about = "Run shell commands when Alertmanager alerts fire")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to the YAML config file
    #[arg(long, short, env = "ACTIONEER_CONFIG", default_value = DEFAULT_CONFIG_PATH, global = true)]
    config: PathBuf,

    /// Log format
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the Alertmanager webhook server
    Serve {
        /// Address to bind to (overrides the config file)
        #[arg(long, env = "ACTIONEER_LISTEN")]
        listen: Option<String>,

        /// Log commands instead of running them
        #[arg(long, env = "ACTIONEER_DRY_RUN")]
        dry_run: bool,
    },
    /// Validate the config file and list configured actions
    Check,
    /// Process a single notification from a file ("-" for stdin)
    Process {
        /// Notification JSON file
        input: PathBuf,

        /// Log commands instead of running them
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_format);

    match cli.command {
        Commands::Serve { listen, dry_run } => {
            run_serve_command(&cli.config, listen, dry_run).await?;
        }
        Commands::Check => {
            run_check_command(&cli.config)?;
        }
        Commands::Process { input, dry_run } => {
            run_process_command(&cli.config, &input, dry_run).await?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool, format: LogFormat) {
    let default = if verbose {
        "actioneer=debug,tower_http=debug,info"
    } else {
        "actioneer=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    match format {
        LogFormat::Text => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init(),
    }
}

fn load_config(path: &Path) -> Result<(Config, Arc<Catalog>)> {
    let config = Config::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    let catalog = Catalog::from_config(&config).context("Failed to build action catalog")?;
    Ok((config, Arc::new(catalog)))
}

/// Run the webhook server.
async fn run_serve_command(config_path: &Path, listen: Option<String>, dry_run: bool) -> Result<()> {
    let (config, catalog) = load_config(config_path)?;
    let listen = listen.unwrap_or_else(|| config.listen.clone());
    let dry_run = dry_run || config.dry_run;

    println!("{}", "═".repeat(60).cyan());
    println!("{}", "ACTIONEER WEBHOOK SERVER".cyan().bold());
    println!("{}", "═".repeat(60).cyan());
    println!();
    println!("  Address:  {}", listen.green());
    println!("  Config:   {}", config_path.display().to_string().green());
    println!("  Actions:  {}", catalog.len().to_string().green());
    println!(
        "  Dry run:  {}",
        if dry_run {
            "enabled".yellow()
        } else {
            "disabled".normal()
        }
    );
    println!();

    let executor = Arc::new(ShellExecutor::new(ShellRunner::from_config(&config)));
    let dispatcher = Dispatcher::new(catalog, executor.clone(), dry_run);
    let state = Arc::new(ServerState::new(dispatcher, config.max_body_bytes));

    let result = run_server(state, &listen).await;

    let in_flight = executor.in_flight();
    if in_flight > 0 {
        info!(in_flight, "Waiting for running commands to finish");
    }
    executor.wait().await;

    result
}

/// Validate the config file and print its actions.
fn run_check_command(config_path: &Path) -> Result<()> {
    let (config, catalog) = load_config(config_path)?;

    println!(
        "{} {}",
        "✓".green(),
        format!("{} is valid", config_path.display()).bold()
    );
    println!("  Prefix:   {}", config.substitution_prefix.cyan());
    println!("  Shell:    {}", config.shell.join(" ").cyan());
    println!("  Dry run:  {}", config.dry_run);
    println!();

    for action in catalog.actions() {
        println!("  {} {}", action.name.bold(), format!("({})", action.alertname).dimmed());
        println!("    command: {}", action.command_template);
        if !action.template_keys.is_empty() {
            println!("    keys:    {}", action.template_keys.join(", "));
        }
        for key in action.unused_template_keys(&config.substitution_prefix) {
            println!(
                "    {} key '{key}' is never used in the command",
                "warning:".yellow()
            );
        }
    }

    Ok(())
}

/// Decode one notification and run it through the dispatcher.
async fn run_process_command(config_path: &Path, input: &Path, dry_run: bool) -> Result<()> {
    let (config, catalog) = load_config(config_path)?;
    let dry_run = dry_run || config.dry_run;

    let bytes = if input == Path::new("-") {
        let mut buf = Vec::new();
        std::io::stdin()
            .read_to_end(&mut buf)
            .context("Failed to read notification from stdin")?;
        buf
    } else {
        std::fs::read(input)
            .with_context(|| format!("Failed to read notification from {}", input.display()))?
    };

    let notification = decode(&bytes)?;

    let executor = Arc::new(ShellExecutor::new(ShellRunner::from_config(&config)));
    let dispatcher = Dispatcher::new(catalog, executor.clone(), dry_run);

    // Commands dispatched before a failing alert still run to completion.
    let result = dispatcher.take_actions(&notification);
    executor.wait().await;
    let report = result?;

    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Failed to serialize report")?
    );

    Ok(())
}
