use std::sync::Arc;

use ridepulse::clock::SystemClock;
use ridepulse::config::PulseConfig;
use ridepulse::feed::FeedClient;
use ridepulse::gbfs::HttpFetcher;
use ridepulse::poller::Poller;
use ridepulse::store::FileStore;
use ridepulse::web::{AppState, create_router};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("ridepulse=info,tower_http=info")),
        )
        .init();

    let config = PulseConfig::from_env()?;
    info!(
        information_url = %config.feeds.information_url,
        status_url = %config.feeds.status_url,
        state_path = %config.state_path.display(),
        "starting ridepulse"
    );

    let clock = Arc::new(SystemClock);
    let fetcher = HttpFetcher::new()?;
    let feeds = FeedClient::new(fetcher, config.feeds.clone(), clock);
    let store = Arc::new(FileStore::new(&config.state_path));
    let poller = Poller::new(feeds, store, config.poll.clone());

    poller.start().await;

    let app = create_router(AppState::new(poller.clone()));
    let listener = tokio::net::TcpListener::bind(config.bind).await?;
    info!(addr = %config.bind, "ridepulse listening");
    info!("  GET  /health          - Health check");
    info!("  GET  /api/summary     - Counters, phase and error");
    info!("  GET  /api/stations    - Enriched stations");
    info!("  GET  /api/snapshots   - Metric history");
    info!("  POST /api/refresh     - Refresh now");
    info!("  POST /api/poll/start  - Start background polling");
    info!("  POST /api/poll/stop   - Stop background polling");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    poller.stop().await;
    info!("shut down");
    Ok(())
}
