mod audience;
mod campaign;
mod config;
mod constants;
mod facebook;
mod identifiers;
mod logging;
mod mcp;
mod models;

use clap::Parser;
use std::error::Error;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about = "Meta Ads MCP tool server over stdio", long_about = None)]
struct Cli {
    /// Graph API access token; overrides META_ACCESS_TOKEN.
    #[arg(long = "fb-token")]
    fb_token: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    logging::init();

    // Load configuration
    let config = config::Config::from_env(cli.fb_token)?;

    let api = facebook::FacebookAPI::new(
        config.access_token.clone(),
        config.base_url(),
        config.timeout,
    )?;

    info!(graph = %config.base_url(), "meta ads MCP server running on stdio");

    let server = mcp::ToolServer::new(api);
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    server.serve(stdin, tokio::io::stdout()).await?;

    Ok(())
}
