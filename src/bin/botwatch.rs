//! Botwatch console binary
//!
//! Polls a trading-bot ops backend and serves the aggregated status locally.
//!
//! ## Setup
//!
//! 1. Optionally create a `.env` file in the working directory:
//!    ```
//!    BOTWATCH_BACKEND__BASE_URL=http://127.0.0.1:8080
//!    ```
//!
//! 2. Run the console:
//!    ```bash
//!    cargo run --bin botwatch -- --config botwatch.toml
//!    ```

use std::env;

use log::{error, info};

use botwatch::ConsoleRunner;

const DEFAULT_CONFIG: &str = "botwatch";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Load .env file
    match dotenvy::dotenv() {
        Ok(path) => info!("Loaded environment from: {}", path.display()),
        Err(_) => info!("No .env file found, using system environment variables"),
    }

    // Parse arguments
    let args: Vec<String> = env::args().collect();
    let config_path = if args.len() > 2 && args[1] == "--config" {
        args[2].clone()
    } else {
        DEFAULT_CONFIG.to_string()
    };

    let runner = match ConsoleRunner::new(&config_path) {
        Ok(runner) => runner,
        Err(e) => {
            error!("Failed to load config '{}': {}", config_path, e);
            return;
        }
    };

    if let Err(e) = runner.run().await {
        error!("Console exited with error: {}", e);
    }
}
