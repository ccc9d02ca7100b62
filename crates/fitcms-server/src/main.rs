//! FitCMS Server - Main entry point

use anyhow::Result;
use fitcms_common::logging::{init_logging, LogConfig};
use tracing::info;

use fitcms_server::{api, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::builder()
        .log_file_prefix("fitcms-server".to_string())
        .filter_directives("fitcms_server=debug,tower_http=debug,sqlx=info".to_string())
        .build();

    // Environment variables take precedence
    let log_config = LogConfig::from_env().unwrap_or(log_config);

    init_logging(&log_config)?;

    info!("Starting FitCMS Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    api::serve(config).await?;

    info!("Server stopped");
    Ok(())
}
