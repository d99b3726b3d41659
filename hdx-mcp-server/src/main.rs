use clap::{Parser, ValueEnum};
use hdx_mcp_server::{HdxMcpServer, Settings, http};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Transport {
    Stdio,
    Http,
}

/// HDX MCP Server - Humanitarian Data Exchange API for AI assistants
#[derive(Debug, Parser)]
#[command(name = "hdx-mcp-server", version, about)]
#[command(after_help = "Examples:
  hdx-mcp-server                               Run with stdio transport
  hdx-mcp-server --transport http              Run with HTTP transport
  hdx-mcp-server --transport http --port 9000  HTTP on a custom port")]
struct Cli {
    /// Transport to serve on
    #[arg(long, value_enum, default_value_t = Transport::Stdio)]
    transport: Transport,

    /// Host to bind the HTTP transport to (overrides MCP_HOST)
    #[arg(long)]
    host: Option<String>,

    /// Port to bind the HTTP transport to (overrides MCP_PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Server error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let settings = Settings::from_env()?.with_listener(cli.host, cli.port);
    tracing::debug!("Loaded settings: {settings:?}");

    let server = HdxMcpServer::bootstrap(settings).await?;

    match cli.transport {
        Transport::Stdio => server.run_stdio().await?,
        Transport::Http => {
            let host = server.settings().host.clone();
            let port = server.settings().port;
            http::serve(Arc::new(server), &host, port).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_stdio() {
        let cli = Cli::parse_from(["hdx-mcp-server"]);
        assert_eq!(cli.transport, Transport::Stdio);
        assert!(cli.host.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn http_with_overrides() {
        let cli = Cli::parse_from([
            "hdx-mcp-server",
            "--transport",
            "http",
            "--host",
            "0.0.0.0",
            "--port",
            "9000",
            "-v",
        ]);
        assert_eq!(cli.transport, Transport::Http);
        assert_eq!(cli.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(cli.port, Some(9000));
        assert!(cli.verbose);
    }

    #[test]
    fn rejects_unknown_transport() {
        assert!(Cli::try_parse_from(["hdx-mcp-server", "--transport", "sse"]).is_err());
    }

    #[test]
    fn cli_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
