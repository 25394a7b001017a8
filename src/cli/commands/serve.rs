//! Serve command - run the HTTP service

use crate::analysis::CliAnalyzer;
use crate::cache::JobCoordinator;
use crate::cli::args::ServeArgs;
use crate::config::Config;
use crate::error::StrataResult;
use crate::server;
use crate::views::ImageViews;
use std::sync::Arc;
use tracing::{info, warn};

/// Execute the serve command
pub async fn execute(args: ServeArgs, config: &Config) -> StrataResult<()> {
    let mut config = config.clone();
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if args.dev {
        config.server.dev = true;
    }
    if let Some(engine) = args.engine {
        config.analyzer.engine = engine;
    }

    let analyzer = CliAnalyzer::new(&config.analyzer);
    info!(
        engine = analyzer.engine(),
        capacity = config.cache.capacity,
        ttl_secs = config.cache.ttl_secs,
        "Starting strata"
    );

    let coordinator = JobCoordinator::new(Arc::new(analyzer), &config.cache);
    let views = ImageViews::new(coordinator.clone());

    server::serve(views, &config.server, shutdown_signal()).await?;

    coordinator.shutdown();
    info!("Stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutting down"),
        Err(e) => {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
