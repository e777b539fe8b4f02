mod config;
mod handlers;
mod llm;
mod server;
mod store;
mod summary;
mod tools;

use anyhow::Result;
use config::Config;
use handlers::Dashboard;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // Load configuration (config.toml + environment overrides)
    let config = Config::load()?;

    // Initialize logging
    init_logging(&config.logging.level);
    log::info!("Starting Smart Life Dashboard...");

    // Ensure the data directory exists and report which data files are present
    config.ensure_directories()?;
    validate_data_files(&config);

    let dashboard = Dashboard::new(&config)?;
    log::info!("Tools ready");

    server::serve(&config.server, dashboard).await
}

/// Configure `pretty_env_logger` from the configured level; `RUST_LOG`
/// directives, when set, are applied on top.
fn init_logging(level: &str) {
    let mut builder = pretty_env_logger::formatted_builder();
    builder.parse_filters(level);
    if let Ok(filters) = std::env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

/// Log the availability of the local data files used by the tools.
fn validate_data_files(config: &Config) {
    for (label, path) in config.data_files() {
        if path.exists() {
            log::info!("Found {} data file at {}", label, path.display());
        } else {
            log::warn!("Missing {} data file at {}", label, path.display());
        }
    }
}
