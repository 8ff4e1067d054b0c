// src/server/main.rs
// Entry point for the cantiere server
use cantiere::server::{config::ServerConfig, connection::Server, database::Database};
use log::{error, info};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::from_env();

    // env_logger reads RUST_LOG, so mirror the configured level into it
    std::env::set_var("RUST_LOG", &config.log_level);
    env_logger::init();

    let database = Arc::new(Database::connect(&config.database_url).await?);

    info!("[SERVER] Running database migrations");
    database.migrate().await.map_err(|e| {
        error!("[SERVER] Database migration failed: {}", e);
        e
    })?;

    let server = Server { db: database };
    server.run(&format!("{}:{}", config.host, config.port)).await?;
    Ok(())
}
