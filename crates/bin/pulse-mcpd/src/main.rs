//! Daemon entry point for the Pulse MCP server.
//!
//! Loads configuration from the environment, fetches the application
//! semantics once, and serves the MCP protocol over stdio or streamable HTTP.

mod config;

use std::sync::Arc;

use pulse_core::client::PulseClient;
use pulse_core::completion::{CompletionModel, OllamaCompletion};
use pulse_core::prompts::Prompts;
use pulse_core::toolkit::PulseToolkit;
use pulse_mcp::PulseMcp;
use pulse_mcp::server::{McpHttpServerConfig, serve_stdio, serve_streamable_http};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::PulseMcpConfig;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // stdout belongs to the stdio transport.
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_tracing();
    let config = PulseMcpConfig::from_args()?;
    info!(
        application_id = ?config.pulse.application_id,
        base_url = %config.pulse.base_url,
        prompt_version = %config.prompt_version,
        model = %config.llm_model,
        "starting pulse-mcpd"
    );

    let client = PulseClient::new(config.pulse.clone())?;
    let model: Arc<dyn CompletionModel> =
        Arc::new(OllamaCompletion::new(&config.llm_url, &config.llm_model));
    let prompts = Arc::new(Prompts::for_version(config.prompt_version)?);
    let toolkit = PulseToolkit::connect(client, model, prompts).await?;
    let server = PulseMcp::new(toolkit).with_top_k(config.top_k);

    if config.enable_stdio {
        serve_stdio(server).await
    } else {
        serve_streamable_http(server, McpHttpServerConfig::new(config.mcp_http_addr)).await
    }
}
