use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jpeg_resizer::{config::Config, services::ResizePipeline, web::WebServer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "jpeg-resizer")]
#[command(version)]
#[command(about = "On-demand JPEG resizing with a bounded in-memory cache")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file path (defaults to $CONFIG_FILE, then config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Listening IP address
    #[arg(short = 'H', long, value_name = "IP")]
    host: Option<String>,

    /// Listening port
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Public base URL used in returned image urls
    #[arg(short = 'b', long, value_name = "URL")]
    base_url: Option<String>,

    /// Maximum number of cached images
    #[arg(long, value_name = "ENTRIES")]
    cache_capacity: Option<usize>,

    /// Log level
    #[arg(short = 'v', long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value = "text")]
    log_format: LogFormat,
}

fn init_tracing(cli: &Cli) {
    let log_filter = if cli.log_level == "trace" {
        format!("jpeg_resizer={},tower_http=trace", cli.log_level)
    } else {
        format!("jpeg_resizer={}", cli.log_level)
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| log_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match cli.log_format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    info!("Starting JPEG resizer v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load_from_file(path)?;
            info!("Configuration loaded from: {}", path);
            config
        }
        None => Config::load()?,
    };

    // Override config with CLI arguments
    if let Some(host) = cli.host {
        config.web.host = host;
    }
    if let Some(port) = cli.port {
        config.web.port = port;
    }
    if let Some(base_url) = cli.base_url {
        config.web.base_url = base_url;
    }
    if let Some(capacity) = cli.cache_capacity {
        config.resizer.cache_capacity = capacity;
    }

    config.validate()?;
    let config = Arc::new(config);

    let pipeline = ResizePipeline::from_config(&config)?;
    info!(
        "Resize pipeline initialized: cache capacity {}, fetch timeout {:?}, batch concurrency {}",
        config.resizer.cache_capacity,
        config.resizer.fetch_timeout,
        config.resizer.batch_concurrency
    );

    let background = pipeline.background_tasks().clone();
    let server = WebServer::new(config.clone(), pipeline)?;
    info!("Public base URL: {}", config.web.base_url);

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel();
    let server_handle = tokio::spawn(server.serve_with_signal(ready_tx));

    match ready_rx.await {
        Ok(Ok(())) => info!("Web server ready"),
        Ok(Err(e)) => return Err(e),
        Err(_) => warn!("Web server exited before reporting readiness"),
    }

    server_handle.await??;

    info!("Web server stopped, draining background tasks");
    if !background
        .shutdown(config.background.shutdown_grace_period)
        .await
    {
        warn!("Exiting with unfinished background resizes");
    }

    info!("Shutdown complete");
    Ok(())
}
