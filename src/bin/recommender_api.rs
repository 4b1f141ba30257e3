use std::net::SocketAddr;

use anyhow::{Context, Result};
use assessrec::server::{router, AppState, DEFAULT_CORS_ORIGINS};
use assessrec::{logging, RecommenderArgs};
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    name = "assessrec-api",
    about = "Serve assessment recommendations over HTTP"
)]
struct ApiCli {
    /// Address to bind the HTTP server to
    #[arg(long, env = "ASSESSREC_BIND", default_value = "127.0.0.1:8000")]
    bind: String,

    /// Allowed CORS origins, comma separated
    #[arg(
        long,
        env = "ASSESSREC_CORS_ORIGINS",
        value_delimiter = ',',
        default_values_t = DEFAULT_CORS_ORIGINS.iter().map(|origin| origin.to_string())
    )]
    cors_origins: Vec<String>,

    #[command(flatten)]
    recommender: RecommenderArgs,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ApiCli::parse();
    logging::init(cli.verbose);

    let recommender = cli.recommender.build().await?;
    let app = router(AppState::new(recommender), &cli.cors_origins)?;

    let addr: SocketAddr = cli
        .bind
        .parse()
        .with_context(|| format!("invalid bind address {}", cli.bind))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "assessrec-api listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown")?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
