use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use articles_api_rust::config::{self, ApiConfig};
use articles_api_rust::handlers::app;
use articles_api_rust::is_production;
use articles_api_rust::state::AppState;

#[derive(Parser)]
#[command(name = "articles-api")]
#[command(about = "Articles API with hybrid row/object storage")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides ARTICLES_API_PORT / PORT)
    #[arg(long)]
    port: Option<u16>,

    /// Address to bind (overrides API_HOST)
    #[arg(long)]
    host: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SUPABASE_URL, etc.
    let _ = dotenvy::dotenv();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = Args::parse();
    let config = config::config();
    tracing::info!("Starting Articles API in {:?} mode", config.environment);
    if !is_production!() {
        tracing::debug!(
            "Database backend {:?}, storage backend {:?}, bucket '{}'",
            config.database.backend,
            config.storage.backend,
            config.storage.bucket
        );
    }

    let api = ApiConfig {
        host: args.host.unwrap_or_else(|| config.api.host.clone()),
        port: args.port.unwrap_or(config.api.port),
        ..config.api.clone()
    };

    let state = AppState::from_config(config)
        .await
        .context("failed to initialise article stores")?;
    let app = app(state, &api);

    let bind_addr = format!("{}:{}", api.host, api.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;

    tracing::info!("Articles API listening on http://{}", bind_addr);

    axum::serve(listener, app).await.context("server error")?;
    Ok(())
}
