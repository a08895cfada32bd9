mod migrations;
mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use blogsite_api::http::{create_router, AppState};
use blogsite_core::{
    bootstrap::{config::log_summary, init_database, init_services, load_config, Stores},
    logging,
};

use server::BlogServer;

/// Blog site server with OAuth2 account linking
#[derive(Debug, Parser)]
#[command(name = "blogsite", version)]
struct Cli {
    /// Path to a YAML config file
    #[arg(short, long, env = "BLOGSITE_CONFIG_PATH")]
    config: Option<String>,

    /// Keep accounts and linked identities in memory instead of PostgreSQL
    #[arg(long)]
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load and validate configuration
    let config = load_config(cli.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("Blogsite server starting...");
    log_summary(&config);

    // 3. Storage
    let stores = if cli.in_memory {
        info!("Using in-memory stores; data is lost on restart");
        Stores::in_memory()
    } else {
        let pool = init_database(&config).await?;
        migrations::run_migrations(&pool).await?;
        Stores::postgres(&pool)
    };

    // 4. Services and router
    let services = init_services(stores, &config).await?;
    let state = AppState::from_services(&services, &config)?;
    let router = create_router(state);

    // 5. Serve
    BlogServer::new(config.http_address(), router).start().await
}
