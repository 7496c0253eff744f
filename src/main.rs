//! Command-line front end: connects the configured MCP servers and reports
//! what they offer.
//!
//! ```text
//! gropius --config mcp.yaml tools
//! gropius --config mcp.yaml status
//! gropius --config mcp.yaml test weather
//! ```
//!
//! User-defined servers are read from `PostgreSQL` when `--database-url` (or
//! `GROPIUS_DATABASE_URL`) is set and from an empty in-memory store
//! otherwise.

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use diesel::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use gropius::oauth::{
    adapters::{
        ReqwestTokenExchanger,
        memory::{InMemoryFlowStateStore, InMemoryTokenStore},
    },
    services::OAuthFlowManager,
};
use gropius::telemetry;
use gropius::tool_registry::{
    adapters::{
        JsonRpcConnector, YamlFileConfigSource,
        memory::{InMemoryToolCacheStore, InMemoryUserServerRepository},
        postgres::PostgresUserServerRepository,
    },
    domain::ServerName,
    ports::{CachedCatalog, FileConfig, FileConfigSource, UserServerRepository},
    services::{CatalogView, LifecycleController, ManagedServer, TestConnectionReport},
};
use gropius::tool_registry::domain::ServerKey;
use mockable::DefaultClock;
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

type Broker = OAuthFlowManager<
    InMemoryFlowStateStore<DefaultClock>,
    InMemoryTokenStore,
    ReqwestTokenExchanger,
    DefaultClock,
>;

#[derive(Debug, Parser)]
#[command(name = "gropius", version, about = "Connect MCP servers and inspect their tools")]
struct Cli {
    /// YAML file holding `mcpSettings` and `mcpServers`.
    #[arg(long, env = "GROPIUS_CONFIG", default_value = "gropius.yaml")]
    config: Utf8PathBuf,

    /// `PostgreSQL` URL of the user-server store.
    #[arg(long, env = "GROPIUS_DATABASE_URL")]
    database_url: Option<String>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Connect every server and list the published tools.
    Tools,
    /// Connect every server and print its status.
    Status,
    /// Dry-run one file-defined server without registering it.
    Test {
        /// Server name as written in the configuration file.
        name: String,
    },
}

#[derive(Debug, Error)]
enum CliError {
    #[error("no server named '{0}' in the configuration file")]
    UnknownServer(String),
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log)?;
    let file = YamlFileConfigSource::new(cli.config.clone()).load()?;

    match cli.database_url.as_deref() {
        Some(url) => {
            let pool = Pool::builder().build(ConnectionManager::<PgConnection>::new(url))?;
            run(&cli.command, file, PostgresUserServerRepository::new(pool)).await
        }
        None => run(&cli.command, file, InMemoryUserServerRepository::new()).await,
    }
}

async fn run<R>(command: &Command, file: FileConfig, repository: R) -> Result<(), BoxError>
where
    R: UserServerRepository + 'static,
{
    let clock = Arc::new(DefaultClock);
    let broker: Broker = OAuthFlowManager::new(
        Arc::new(InMemoryFlowStateStore::new(Arc::clone(&clock))),
        Arc::new(InMemoryTokenStore::new()),
        Arc::new(ReqwestTokenExchanger::new()),
        Arc::clone(&clock),
    )
    .with_flow_ttl(file.settings.flow_ttl());
    let controller = LifecycleController::new(
        file,
        Arc::new(JsonRpcConnector::new()),
        Arc::new(repository),
        Arc::new(InMemoryToolCacheStore::new()),
        Arc::new(broker),
        clock,
    );

    if let Command::Test { name } = command {
        let server_name = ServerName::new(name.as_str())?;
        let config = controller
            .file_servers()
            .get(&server_name)
            .ok_or_else(|| CliError::UnknownServer(name.clone()))?;
        let report = controller.test_connection(config, None).await?;
        return write_test_report(&report);
    }

    controller.initialize().await?;
    let printed = match command {
        Command::Tools => {
            let tools = controller.tools(&CatalogView::All).await?;
            write_tools(&tools)
        }
        _ => write_status(&controller.servers()?),
    };
    let teardown = controller.teardown().await?;
    for (key, error) in &teardown.failures {
        tracing::warn!(server = %key, error = %error, "server did not shut down cleanly");
    }
    printed
}

fn write_tools(tools: &CachedCatalog) -> Result<(), BoxError> {
    let mut stdout = io::stdout().lock();
    for (qualified, tool) in tools {
        writeln!(
            stdout,
            "{qualified}\t{}\t{}",
            tool.server(),
            tool.tool().description().unwrap_or_default()
        )?;
    }
    Ok(())
}

fn write_status(servers: &[(ServerKey, ManagedServer)]) -> Result<(), BoxError> {
    let mut stdout = io::stdout().lock();
    for (key, server) in servers {
        let state = server.state();
        writeln!(
            stdout,
            "{key}\t{}\t{} tools\t{}",
            state.status(),
            state.tool_count(),
            state.error_message().unwrap_or_default()
        )?;
    }
    Ok(())
}

fn write_test_report(report: &TestConnectionReport) -> Result<(), BoxError> {
    let mut stdout = io::stdout().lock();
    if report.success {
        writeln!(stdout, "{}: ok, {} tools", report.server, report.tools.len())?;
        for tool in &report.tools {
            writeln!(stdout, "  {}", tool.name())?;
        }
    } else {
        writeln!(
            stdout,
            "{}: failed{}: {}",
            report.server,
            if report.oauth_required { " (authorization required)" } else { "" },
            report.error.as_deref().unwrap_or("unknown error")
        )?;
    }
    Ok(())
}
