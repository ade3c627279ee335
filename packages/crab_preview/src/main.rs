use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use crab_preview::config::{PreviewConfig, PreviewDirs, ServerConfig, load_config};
use crab_preview::metrics::PreviewMetrics;
use crab_preview::{AppState, InstanceId, PreviewHub, PreviewUrls, server};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::prelude::*;
use url::Url;

#[derive(Parser)]
#[command(name = "crab-preview")]
#[command(about = "Live preview server for project files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Custom data directory (defaults to ~/.crabpreview)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve a project for live preview
    Serve(ServeArgs),

    /// Print the effective configuration
    Config,
}

#[derive(Parser)]
struct ServeArgs {
    /// Project root to serve
    #[arg(long)]
    project: PathBuf,

    /// Port for the web server (overrides config; 0 = auto-select)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// File to preview first, relative to the project root
    #[arg(long)]
    open: Option<PathBuf>,

    /// Treat the project as trusted without asking
    #[arg(long)]
    trust: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let dirs = PreviewDirs::new(cli.data_dir.clone())?;

    match cli.command {
        Commands::Serve(args) => run_server(args, dirs).await,
        Commands::Config => {
            let fc: crab_preview::config::FileConfig = load_config(&dirs.data_dir)
                .extract()
                .context("Failed to load configuration")?;
            println!("# {}", dirs.config_toml_path().display());
            println!("{}", serde_json::to_string_pretty(&fc)?);
            Ok(())
        }
    }
}

async fn run_server(args: ServeArgs, dirs: PreviewDirs) -> Result<()> {
    // Setup logging
    let default_directive = if args.debug {
        "crab_preview=debug,tower_http=debug,info"
    } else {
        "crab_preview=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    info!("Starting Crab Preview");

    let fc: crab_preview::config::FileConfig = load_config(&dirs.data_dir)
        .extract()
        .context("Failed to load configuration")?;
    let server_config = ServerConfig::from_file(&fc.server);
    let preview_config = PreviewConfig::from_file(&fc.preview);

    let project = args
        .project
        .canonicalize()
        .with_context(|| format!("Project root not found: {}", args.project.display()))?;

    // Bind first so the served URLs carry the real port.
    let host = args.host.unwrap_or(server_config.host.clone());
    let port = args.port.unwrap_or(server_config.port);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", host, port))?;
    let addr = listener.local_addr()?;

    let base = match server_config.public_url {
        Some(url) => url,
        None => Url::parse(&format!("http://{}", addr)).context("Invalid listen address")?,
    };

    info!(
        "Preview config: heartbeat={:?}, liveness={:?}, request_timeout={:?}",
        preview_config.heartbeat_interval,
        preview_config.liveness_timeout,
        preview_config.request_timeout
    );

    let metrics = Arc::new(PreviewMetrics::new());
    let urls = PreviewUrls::new(&base, InstanceId::generate());
    let hub = PreviewHub::new(urls, preview_config, metrics);
    let state = AppState::new(hub.clone());
    let _tasks = state.start();

    hub.open_project(&project);
    if args.trust {
        hub.mark_trusted();
    }
    if let Some(open) = args.open {
        hub.select_file(&project.join(open));
    }

    let app = server::router(state);

    info!("Listening on http://{}", addr);
    info!("Open the preview at {}", hub.urls().loader_url());

    let shutdown_hub = hub.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
            shutdown_hub.shutdown();
        })
        .await
        .context("Server error")?;

    Ok(())
}
