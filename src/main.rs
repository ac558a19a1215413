use anyhow::Result;
use clap::Parser;
use image_crawler::{setup_logging, Cli, CliRunner, Config};
use std::time::Duration;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    setup_logging(args.verbose)?;

    info!("starting image-crawler v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args).await?;
    let runner = CliRunner::new(config);

    if let Err(e) = runner.run(args.command).await {
        error!("{e:#}");
        std::process::exit(1);
    }

    info!("image-crawler stopped");
    Ok(())
}

async fn load_config(args: &Cli) -> Result<Config> {
    let mut config = if let Some(config_path) = &args.config {
        let content = tokio::fs::read_to_string(config_path).await?;
        serde_json::from_str(&content)?
    } else {
        Config::default()
    };

    // CLI arguments win over the config file.
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(max_concurrent) = args.max_concurrent {
        config.max_concurrent_fetches = max_concurrent;
    }
    if let Some(timeout) = args.timeout {
        config.crawl_timeout = Duration::from_secs(timeout);
    }
    if let Some(chrome_path) = &args.chrome_path {
        config.chrome_path = Some(chrome_path.clone());
    }

    info!(
        "configuration loaded: {} workers, {} max concurrent fetches, {:?} crawl timeout",
        config.workers, config.max_concurrent_fetches, config.crawl_timeout
    );

    Ok(config)
}
