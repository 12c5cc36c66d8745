//! Standalone veilroute server with file-backed credentials and an `echo` route.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use bytes::Bytes;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use veilroute::{Server, ServerConfig, StaticAuthenticator};

#[derive(Parser)]
#[command(name = "veilroute-server")]
#[command(about = "Serve session-scoped alias routes", long_about = None)]
struct Cli {
    /// TOML config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on (overrides the config file)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// JSON file of accepted credentials (overrides the config file)
    #[arg(short, long)]
    users: Option<PathBuf>,

    /// Session lifetime in seconds (overrides the config file)
    #[arg(long)]
    session_ttl_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServerConfig::default(),
    };
    if let Some(addr) = cli.listen {
        config = config.with_listen_addr(addr);
    }
    if let Some(path) = cli.users {
        config = config.with_credentials_path(path);
    }
    if let Some(secs) = cli.session_ttl_secs {
        config = config.with_session_ttl(Duration::from_secs(secs));
    }

    let users = config
        .credentials_path
        .clone()
        .context("no credential file given; pass --users or set credentials_path")?;
    let authenticator = StaticAuthenticator::from_json_file(&users)
        .with_context(|| format!("loading credentials {}", users.display()))?;
    info!(users = authenticator.len(), path = %users.display(), "credentials loaded");

    let server = Server::builder(config)
        .authenticator(authenticator)
        .route("echo", |payload: Bytes| async move { payload })
        .build()?;
    let listener = server.bind().await.context("binding listen address")?;
    server
        .serve(listener, async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
            }
        })
        .await?;
    Ok(())
}
