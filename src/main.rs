use std::sync::Arc;

use tracing::{error, info};

use fileshare::{Config, FileServer, TransferEngine};

#[tokio::main]
async fn main() {
    // Load configuration
    let config = match Config::load_with_env("config.toml") {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load config.toml: {e}");
            eprintln!("Using default configuration.");
            let mut config = Config::default();
            config.apply_env_overrides();
            config
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Invalid configuration: {e}");
        std::process::exit(1);
    }

    // Initialize logging
    if let Err(e) = fileshare::logging::init(&config.logging) {
        eprintln!("Failed to initialize logging: {e}");
        // Fall back to console-only logging
        fileshare::logging::init_console_only(&config.logging.level);
    }

    info!("fileshare - TCP file sharing server");
    info!(
        "Storing files in {} (transfer log: {})",
        config.storage.root, config.storage.transfer_log
    );

    if let Err(e) = run(config).await {
        error!("Server error: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> fileshare::Result<()> {
    let engine = Arc::new(TransferEngine::from_config(&config).await?);
    let server = FileServer::bind(&config.server, engine).await?;

    let handle = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Shutdown requested");
                handle.stop();
            }
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
    });

    server.run().await?;

    info!("Server stopped");
    Ok(())
}
