//! Media Fetcher CLI application
//!
//! Command-line interface for bulk media downloads with a persistent
//! failed-download ledger and bounded retry passes.

use std::process;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use media_fetcher::cli::{
    handle_config, handle_download, handle_retry, handle_status, Cli, Commands,
};
use media_fetcher::config::AppConfig;
use media_fetcher::errors::Result;

#[tokio::main]
async fn main() {
    let result = run().await;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

/// Main application logic
async fn run() -> Result<()> {
    // Load environment variables from .env file if it exists
    dotenv::dotenv().ok();

    let cli = Cli::parse_args();

    let mut config = AppConfig::load(cli.global.config.clone()).await?;
    if let Some(ledger) = &cli.global.ledger {
        config.ledger.path = ledger.clone();
    }

    init_logging(&cli, &config);

    info!("Media Fetcher v{} starting", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Download(args) => {
            info!("Executing download command");
            handle_download(args, config, &cli.global).await
        }
        Commands::Retry(args) => {
            info!("Executing retry command");
            handle_retry(args, config, &cli.global).await
        }
        Commands::Status(args) => handle_status(args, config).await,
        Commands::Config(args) => handle_config(args, config, &cli.global).await,
    }
}

/// Initialize logging from CLI verbosity, falling back to the configured level
fn init_logging(cli: &Cli, config: &AppConfig) {
    let flags_set = cli.global.quiet || cli.global.verbose || cli.global.very_verbose;
    let level = if flags_set {
        cli.log_level().to_string().to_lowercase()
    } else {
        config.logging.level.to_lowercase()
    };

    let mut filter = EnvFilter::from_default_env();
    match format!("media_fetcher={}", level).parse() {
        Ok(directive) => filter = filter.add_directive(directive),
        Err(e) => eprintln!("Ignoring invalid log level '{}': {}", level, e),
    }

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_level(cli.global.very_verbose) // Show levels only in very verbose mode
        .init();

    if cli.global.very_verbose {
        info!("Very verbose logging enabled");
    } else if cli.global.verbose {
        info!("Verbose logging enabled");
    }
}
