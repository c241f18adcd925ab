// exampro-shim - cache-first asset shim and sandboxed grader for ExamPro

use anyhow::{Context, Result};
use clap::Parser;
use exampro_shim::cache::{AssetCacheManager, CacheConfig, CacheStore, Network, UpstreamClient};
use exampro_shim::cli::Args;
use exampro_shim::config::AppConfig;
use exampro_shim::grader::{GradingRequest, GradingWorker};
use exampro_shim::server::create_router;
use exampro_shim::utils::logging;
use std::io::Read;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

fn main() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Phase 1: Load configuration
    let config = match &args.config {
        Some(path) => AppConfig::load_from(&path.to_string_lossy())?,
        None => AppConfig::load()?,
    };

    // Phase 2: Initialize logging
    logging::init(&config.logging)?;

    // Phase 2.5: Handle --grade (one request in, one result out)
    if let Some(source) = &args.grade {
        return grade_once(source, &config);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.server.workers.max(1))
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(serve(config, args.skip_install))
}

async fn serve(mut config: AppConfig, skip_install: bool) -> Result<()> {
    info!("Starting exampro-shim v{}", env!("CARGO_PKG_VERSION"));

    // Phase 3: Build the asset cache and the origin client
    if skip_install {
        info!("--skip-install: nothing is precached");
        config.cache.assets.clear();
    }
    let store = if config.cache.dir.is_empty() {
        CacheStore::new()
    } else {
        CacheStore::open_dir(&config.cache.dir).await?
    };
    let cache_manager = Arc::new(AssetCacheManager::new(
        CacheConfig::from(&config.cache),
        Arc::new(store),
    ));
    let network: Arc<dyn Network> = Arc::new(UpstreamClient::new(&config.upstream)?);
    info!("Origin: {}", config.upstream.base_url);

    // Phase 4: Install then activate the current cache version
    if let Err(e) = cache_manager.install(network.as_ref()).await {
        warn!("Cache install failed: {}", e);
    }
    let retired = cache_manager.activate().await?;
    if !retired.is_empty() {
        info!("Retired cache versions: {}", retired.join(", "));
    }

    // Phase 5: Build and start HTTP server
    let app = create_router(config.clone(), cache_manager, network)?;
    let addr: SocketAddr = config.bind_address().parse()?;

    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Phase 6: Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

fn grade_once(source: &str, config: &AppConfig) -> Result<()> {
    let body = if source == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("failed to read grading request from stdin")?;
        body
    } else {
        std::fs::read_to_string(source)
            .with_context(|| format!("failed to read grading request from {}", source))?
    };

    let json: serde_json::Value = serde_json::from_str(&body).context("invalid grading request")?;
    let request = GradingRequest::from_json(json);
    let result = GradingWorker::new(config.grader.equality).grade_blocking(request)?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
