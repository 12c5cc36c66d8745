//! One-shot veilroute client: log in, send one request, print the response.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use veilroute::Credentials;
use veilroute_client::Client;

#[derive(Parser)]
#[command(name = "veilroute-client")]
#[command(about = "Log in to a veilroute server and call one route", long_about = None)]
struct Cli {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = 8027)]
    port: u16,

    /// Logical route name to call
    #[arg(long, default_value = "echo")]
    path: String,

    /// Request payload
    #[arg(short, long, default_value = "")]
    body: String,

    /// Login identity
    #[arg(short, long)]
    username: String,

    /// Login secret
    #[arg(long)]
    password: String,

    /// Use https
    #[arg(long)]
    tls: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let scheme = if cli.tls { "https" } else { "http" };
    let mut client = Client::new(format!("{scheme}://{}:{}", cli.host, cli.port))?;
    client
        .login(&Credentials::new(cli.username, cli.password))
        .await
        .context("login failed")?;
    let response = client
        .raw_request(&cli.path, cli.body.into_bytes())
        .await
        .with_context(|| format!("request to `{}` failed", cli.path))?;

    let mut stdout = std::io::stdout().lock();
    stdout.write_all(&response)?;
    stdout.write_all(b"\n")?;
    Ok(())
}
