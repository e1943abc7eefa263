//! mcphub - MCP server manager for AI coding agents
//!
//! Usage:
//!   mcphub detect                     # List servers configured in each agent
//!   mcphub sync --file servers.json   # Install servers into agents
//!   mcphub remove <name>              # Remove a server from agents
//!   mcphub test -- npx -y some-mcp    # Test a server connection
//!   mcphub auth status --file ...     # OAuth state of HTTP/SSE servers

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use console::style;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcphub_core::config::{Settings, paths};
use mcphub_core::prelude::*;

#[derive(Parser)]
#[command(name = "mcphub")]
#[command(about = "MCP server manager for AI coding agents", long_about = None)]
struct Cli {
    /// Configuration directory (defaults to <config_dir>/mcphub)
    #[arg(long, global = true, value_name = "DIR")]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the MCP servers each agent has configured
    Detect {
        #[command(flatten)]
        agents: AgentFilter,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Install servers from a JSON file into agents
    Sync {
        /// JSON array of server records
        #[arg(long, short)]
        file: PathBuf,

        #[command(flatten)]
        agents: AgentFilter,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Remove a server from agents
    #[command(alias = "rm")]
    Remove {
        /// Server name
        name: String,

        #[command(flatten)]
        agents: AgentFilter,

        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Test a server connection
    Test(TestArgs),

    /// Manage OAuth credentials
    Auth(AuthArgs),
}

#[derive(Args)]
struct AgentFilter {
    /// Limit to these agents (claude, gemini, qwen, iflow, codex, local)
    #[arg(long = "agent", value_name = "AGENT")]
    agents: Vec<String>,
}

#[derive(Args)]
struct TestArgs {
    /// Name of a server in --file
    name: Option<String>,
    /// JSON array of server records
    #[arg(long, short)]
    file: Option<PathBuf>,
    /// Server URL for remote transports
    #[arg(long)]
    url: Option<String>,
    /// Transport for --url (sse, http, streamable_http)
    #[arg(long, short, default_value = "http")]
    transport: String,
    /// HTTP header (KEY=VALUE)
    #[arg(long = "header", value_name = "KEY=VALUE")]
    headers: Vec<String>,
    /// Environment variable for a stdio command (KEY=VALUE)
    #[arg(long, value_name = "KEY=VALUE")]
    env: Vec<String>,
    /// Stdio command (after --)
    #[arg(last = true)]
    command: Vec<String>,
    /// Output format
    #[arg(short = 'o', long, default_value = "table")]
    format: OutputFormat,
}

#[derive(Args)]
struct AuthArgs {
    #[command(subcommand)]
    command: AuthSubcommand,
}

#[derive(Subcommand)]
enum AuthSubcommand {
    /// Show whether HTTP/SSE servers need a login
    Status {
        /// JSON array of server records
        #[arg(long, short)]
        file: PathBuf,
        /// Only this server
        name: Option<String>,
        /// Output format
        #[arg(short = 'o', long, default_value = "table")]
        format: OutputFormat,
    },

    /// Delete stored credentials for a server
    Logout {
        /// Server name
        name: String,
    },

    /// List servers with stored credentials
    List,
}

#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table
    #[default]
    Table,
    /// Machine-readable JSON
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mcphub=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let ctx = load_context(cli.config_dir)?;
    tracing::debug!(config_dir = %ctx.config_dir().display(), "context loaded");

    let code = run(&ctx, cli.command).await?;
    if code != 0 {
        std::process::exit(code);
    }
    Ok(())
}

fn load_context(config_dir: Option<PathBuf>) -> Result<AppContext> {
    let Some(config_dir) = config_dir else {
        return AppContext::load();
    };
    let settings = Settings::load(&paths::settings_path(&config_dir))?;
    AppContext::new(config_dir, settings)
}

async fn run(ctx: &AppContext, command: Commands) -> Result<i32> {
    match command {
        Commands::Detect { agents, format } => {
            let agents = select_agents(ctx, &agents)?;
            let results = ctx.coordinator().detect_across_agents(&agents).await;
            match format {
                OutputFormat::Table => print_detection_table(&results),
                OutputFormat::Json => print_json(&results)?,
            }
            Ok(0)
        }
        Commands::Sync {
            file,
            agents,
            format,
        } => {
            let servers = load_servers(&file)?;
            let agents = select_agents(ctx, &agents)?;
            let result = ctx.coordinator().sync_to_agents(&servers, &agents).await;
            print_sync_result("Synced", &result, format)?;
            Ok(if result.success { 0 } else { 1 })
        }
        Commands::Remove {
            name,
            agents,
            format,
        } => {
            let agents = select_agents(ctx, &agents)?;
            let result = ctx.coordinator().remove_from_agents(&name, &agents).await;
            print_sync_result("Removed", &result, format)?;
            Ok(0)
        }
        Commands::Test(args) => run_test(ctx, args).await,
        Commands::Auth(args) => run_auth(ctx, args).await,
    }
}

/// Every registered agent unless `--agent` narrows the list.
fn select_agents(ctx: &AppContext, filter: &AgentFilter) -> Result<Vec<AgentDescriptor>> {
    let families = if filter.agents.is_empty() {
        ctx.registry().families()
    } else {
        filter
            .agents
            .iter()
            .map(|id| id.parse::<AgentFamily>())
            .collect::<Result<Vec<_>>>()?
    };
    Ok(families.into_iter().map(AgentDescriptor::new).collect())
}

fn load_servers(path: &Path) -> Result<Vec<McpServer>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read server file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse server file: {}", path.display()))
}

fn find_server(servers: Vec<McpServer>, name: &str) -> Result<McpServer> {
    servers
        .into_iter()
        .find(|server| server.name == name)
        .ok_or_else(|| anyhow::anyhow!("Server '{}' not found in file", name))
}

fn parse_pairs(pairs: &[String], flag: &str) -> Result<BTreeMap<String, String>> {
    pairs
        .iter()
        .map(|pair| {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow::anyhow!("Invalid {} '{}': expected KEY=VALUE", flag, pair))?;
            Ok((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

/// Build the server under test from a file entry, a URL or a trailing command.
fn test_target(args: &TestArgs) -> Result<McpServer> {
    if let Some(file) = &args.file {
        let name = args
            .name
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Missing server name to pick from --file"))?;
        return find_server(load_servers(file)?, name);
    }

    let name = args.name.clone().unwrap_or_else(|| "adhoc".to_string());
    if let Some(url) = &args.url {
        let kind = TransportKind::from_label(&args.transport)
            .filter(|kind| *kind != TransportKind::Stdio)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Invalid transport '{}'. Use 'sse', 'http' or 'streamable_http'",
                    args.transport
                )
            })?;
        let mut transport = ServerTransport::remote(kind, url.clone())
            .ok_or_else(|| anyhow::anyhow!("Unsupported transport: {}", kind))?;
        let parsed = parse_pairs(&args.headers, "header")?;
        if let ServerTransport::Sse { headers, .. }
        | ServerTransport::Http { headers, .. }
        | ServerTransport::StreamableHttp { headers, .. } = &mut transport
        {
            headers.extend(parsed);
        }
        return Ok(McpServer::new(name.clone(), name, transport));
    }

    let Some((command, rest)) = args.command.split_first() else {
        anyhow::bail!("Nothing to test: pass --file with a name, --url, or a command after --");
    };
    let mut transport = ServerTransport::stdio(command.clone(), rest.to_vec());
    if let ServerTransport::Stdio { env, .. } = &mut transport {
        env.extend(parse_pairs(&args.env, "env")?);
    }
    Ok(McpServer::new(name.clone(), name, transport))
}

async fn run_test(ctx: &AppContext, args: TestArgs) -> Result<i32> {
    let server = test_target(&args)?;
    let result = ctx.coordinator().test_connection(&server).await;

    match args.format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Table => {
            if result.success {
                let tools = result.tools.as_deref().unwrap_or_default();
                println!(
                    "{} {} ({} tools)",
                    style("✓").green(),
                    server.name,
                    tools.len()
                );
                for tool in tools {
                    match &tool.description {
                        Some(description) => println!("  {:<30} {}", tool.name, description),
                        None => println!("  {}", tool.name),
                    }
                }
                if let Some(error) = &result.error {
                    println!("  {}", style(error).yellow());
                }
            } else if result.needs_auth {
                println!(
                    "{} {} requires authentication",
                    style("!").yellow(),
                    server.name
                );
                if let Some(challenge) = &result.www_authenticate {
                    println!("  WWW-Authenticate: {}", challenge);
                }
            } else {
                println!(
                    "{} {}: {}",
                    style("✗").red(),
                    server.name,
                    result.error.as_deref().unwrap_or("connection failed")
                );
            }
        }
    }
    Ok(if result.success { 0 } else { 1 })
}

async fn run_auth(ctx: &AppContext, args: AuthArgs) -> Result<i32> {
    match args.command {
        AuthSubcommand::Status { file, name, format } => {
            let servers = load_servers(&file)?;
            let servers: Vec<McpServer> = match name {
                Some(name) => vec![find_server(servers, &name)?],
                None => servers
                    .into_iter()
                    .filter(|server| server.transport.kind().supports_oauth())
                    .collect(),
            };

            let mut statuses = Vec::with_capacity(servers.len());
            for server in &servers {
                statuses.push((server.name.clone(), ctx.oauth().check_status(server).await));
            }

            match format {
                OutputFormat::Json => {
                    let output: BTreeMap<_, _> = statuses.into_iter().collect();
                    print_json(&output)?;
                }
                OutputFormat::Table => print_auth_table(&statuses),
            }
            Ok(0)
        }
        AuthSubcommand::Logout { name } => {
            let result = ctx.oauth().logout(&name);
            if result.success {
                println!("Logged out of {}", name);
                Ok(0)
            } else {
                eprintln!(
                    "{} {}",
                    style("error:").red(),
                    result.error.as_deref().unwrap_or("logout failed")
                );
                Ok(1)
            }
        }
        AuthSubcommand::List => {
            let servers = ctx.oauth().authenticated_servers();
            if servers.is_empty() {
                println!("No stored OAuth credentials.");
            }
            for server in servers {
                println!("{}", server);
            }
            Ok(0)
        }
    }
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_detection_table(results: &[DetectionResult]) {
    if results.is_empty() {
        println!("No MCP servers found.");
        return;
    }

    for result in results {
        println!(
            "{} ({} servers)",
            style(result.source.display_name()).bold(),
            result.servers.len()
        );
        println!(
            "  {:<20} {:<16} {:<13} {:<6} Target",
            "Name", "Transport", "Status", "Tools"
        );
        for server in &result.servers {
            let status = match server.status {
                ServerStatus::Connected => style("connected").green(),
                ServerStatus::Disconnected => style("disconnected").dim(),
                ServerStatus::Error => style("error").red(),
                ServerStatus::Testing => style("testing").yellow(),
            };
            println!(
                "  {:<20} {:<16} {:<13} {:<6} {}",
                server.name,
                server.transport.kind(),
                status,
                server.tools.len(),
                server.transport.target()
            );
        }
        println!();
    }
}

fn print_sync_result(verb: &str, result: &SyncResult, format: OutputFormat) -> Result<()> {
    if let OutputFormat::Json = format {
        return print_json(result);
    }

    if result.results.is_empty() {
        println!("Nothing to do.");
        return Ok(());
    }
    for outcome in &result.results {
        if outcome.success {
            println!("{} {} {}", style("✓").green(), verb, outcome.name);
        } else {
            println!(
                "{} {}: {}",
                style("✗").red(),
                outcome.name,
                outcome.error.as_deref().unwrap_or("failed")
            );
        }
    }
    Ok(())
}

fn print_auth_table(statuses: &[(String, OAuthStatus)]) {
    if statuses.is_empty() {
        println!("No HTTP or SSE servers to check.");
        return;
    }

    println!("{:<24} Status", "Server");
    println!("{}", "-".repeat(50));
    for (name, status) in statuses {
        let label = if status.is_authenticated {
            style("authenticated".to_string()).green()
        } else if status.needs_login {
            style("login required".to_string()).yellow()
        } else {
            style("unreachable".to_string()).red()
        };
        match &status.error {
            Some(error) => println!("{:<24} {} ({})", name, label, error),
            None => println!("{:<24} {}", name, label),
        }
    }
}
