// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! omnix-mcp entry point - inspect and exercise configured capability servers.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tracing::Level;

use omnix_mcp::config::{self, find_workspace_root};
use omnix_mcp::mcp::{IntegrationManager, ServerStatus};
use omnix_mcp::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};
use omnix_mcp::tools::ToolRegistry;

/// Version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Connect to external capability servers and inspect what they expose.
#[derive(Parser)]
#[command(name = "omnix-mcp")]
#[command(author, version, about = "Inspect external capability servers", long_about = None)]
struct Cli {
    /// Integrations file to use instead of the workspace/global lookup
    #[arg(short, long, env = "OMNIX_MCP_CONFIG")]
    config: Option<PathBuf>,

    /// Show info-level logs
    #[arg(short, long)]
    verbose: bool,

    /// Show debug logs with span timings
    #[arg(long)]
    debug: bool,

    /// Print machine-readable JSON instead of text
    #[arg(long)]
    json: bool,

    /// Print a metrics report after the command finishes
    #[arg(long)]
    metrics: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List configured servers without connecting
    Servers,

    /// Connect to enabled servers and show their status
    Status,

    /// List discovered tools
    Tools {
        /// Only show tools from this server
        #[arg(short, long)]
        server: Option<String>,
    },

    /// List discovered resources
    Resources {
        /// Only show resources from this server
        #[arg(short, long)]
        server: Option<String>,
    },

    /// List discovered prompts
    Prompts {
        /// Only show prompts from this server
        #[arg(short, long)]
        server: Option<String>,
    },

    /// Invoke one tool and print the result
    Test {
        /// Server id
        server: String,

        /// Tool name (without the server prefix)
        tool: String,

        /// Arguments as a JSON object; defaults are guessed from the tool name
        #[arg(short, long)]
        args: Option<String>,
    },

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli);

    if let Commands::Version = cli.command {
        println!("omnix-mcp {}", VERSION);
        return Ok(());
    }

    let cwd = std::env::current_dir()?;
    let workspace_root = find_workspace_root(&cwd).unwrap_or(cwd);
    let integrations_config = config::load_config(&workspace_root, cli.config.as_deref())
        .context("failed to load integrations file")?;

    if let Commands::Servers = cli.command {
        let servers = integrations_config.clone().into_registry()?;
        let mut servers: Vec<_> = servers.get_all_servers().into_iter().cloned().collect();
        servers.sort_by(|a, b| a.id.cmp(&b.id));
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&servers)?);
        } else {
            for server in &servers {
                let state = if server.enabled {
                    "enabled".green()
                } else {
                    "disabled".dimmed()
                };
                println!(
                    "{} {} [{}] ({}) {}",
                    server.id.bold(),
                    state,
                    server.transport,
                    server.effective_category(),
                    server.description.dimmed()
                );
            }
        }
        return Ok(());
    }

    let integrations = IntegrationManager::with_default_connector(integrations_config.into_registry()?)
        .with_tool_registry(ToolRegistry::new().shared());

    let outcomes = integrations.initialize().await;
    if !cli.json {
        for outcome in outcomes.iter().filter(|o| !o.connected) {
            eprintln!(
                "{} {}: {}",
                "warning:".yellow().bold(),
                outcome.server_id,
                outcome.error.as_deref().unwrap_or("not connected")
            );
        }
    }

    let result = run_command(&cli, &integrations).await;
    integrations.cleanup().await;

    if cli.metrics {
        eprintln!("{}", GLOBAL_METRICS.snapshot().format_report());
    }

    result
}

async fn run_command(cli: &Cli, integrations: &IntegrationManager) -> anyhow::Result<()> {
    let catalog = integrations.catalog();

    match &cli.command {
        Commands::Status => {
            let summary = integrations.get_status_summary().await;
            if cli.json {
                return print_json(&summary);
            }
            println!(
                "{} of {} servers connected, {} tools, {} resources, {} prompts",
                summary.connected_servers.to_string().bold(),
                summary.total_servers,
                summary.total_tools,
                summary.total_resources,
                summary.total_prompts
            );
            for server in &summary.servers {
                let status = match server.status {
                    ServerStatus::Connected => server.status.to_string().green(),
                    ServerStatus::Error => server.status.to_string().red(),
                    _ => server.status.to_string().dimmed(),
                };
                println!(
                    "  {} ({}) {} - {} tools",
                    server.id.bold(),
                    server.name,
                    status,
                    server.tools
                );
                if let Some(error) = &server.error {
                    println!("    {}", error.red());
                }
            }
        }
        Commands::Tools { server } => {
            let tools = match server {
                Some(id) => catalog.get_server_tools(id).await,
                None => catalog.get_all_tools().await,
            };
            if cli.json {
                return print_json(&tools);
            }
            for tool in &tools {
                let marker = if tool.read_only { "" } else { " (mutating)" };
                println!(
                    "{}{}  {}",
                    tool.id.cyan(),
                    marker.yellow(),
                    tool.description.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Resources { server } => {
            let resources = match server {
                Some(id) => catalog.get_server_resources(id).await,
                None => catalog.get_all_resources().await,
            };
            if cli.json {
                return print_json(&resources);
            }
            for resource in &resources {
                println!("{}  {}", resource.id.cyan(), resource.name);
            }
        }
        Commands::Prompts { server } => {
            let prompts = match server {
                Some(id) => catalog.get_server_prompts(id).await,
                None => catalog.get_all_prompts().await,
            };
            if cli.json {
                return print_json(&prompts);
            }
            for prompt in &prompts {
                println!(
                    "{}  {}",
                    prompt.id.cyan(),
                    prompt.description.as_deref().unwrap_or("")
                );
            }
        }
        Commands::Test { server, tool, args } => {
            let args = match args {
                Some(raw) => Some(
                    serde_json::from_str(raw).context("--args must be a JSON object")?,
                ),
                None => None,
            };
            let result = integrations.test_tool(server, tool, args).await;
            if cli.json {
                return print_json(&result);
            }
            match (&result.result, &result.error) {
                (Some(value), _) if result.success => {
                    println!("{}", "success".green().bold());
                    println!("{}", serde_json::to_string_pretty(value)?);
                }
                (_, Some(error)) => {
                    println!("{} {}", "failed:".red().bold(), error);
                }
                _ => println!("{}", "failed".red().bold()),
            }
        }
        Commands::Servers | Commands::Version => {}
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_tracing(cli: &Cli) {
    let config = if cli.debug {
        TelemetryConfig::development()
    } else if cli.verbose {
        TelemetryConfig::default().with_level(Level::INFO)
    } else {
        TelemetryConfig::default()
    };

    // Only fails if a subscriber is already installed
    let _ = init_telemetry(&config.with_ansi(!cli.json));
}
