//! Outbound dialer entry point.

use std::sync::Arc;

use tokio::signal;
use tracing::{error, info};

use ari_outbound_dialer::config::DialerConfig;
use ari_outbound_dialer::core::Dialer;
use ari_outbound_dialer::protocols::ari::HttpAriClient;
use ari_outbound_dialer::services::router;
use ari_outbound_dialer::{utils::setup_logging, Result};

#[tokio::main]
async fn main() -> Result<()> {
    let config = DialerConfig::load_from_env()?;
    setup_logging(&config.logging)?;

    info!("Starting {} v{}", ari_outbound_dialer::NAME, ari_outbound_dialer::VERSION);
    info!("Description: {}", ari_outbound_dialer::DESCRIPTION);

    std::fs::create_dir_all(&config.recordings_dir)?;

    let ari = Arc::new(HttpAriClient::new(&config.ari));
    let dialer = Arc::new(Dialer::new(config, ari));

    let app = router(dialer.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:3000").await?;
    info!("control surface listening on 127.0.0.1:3000");

    let serve_task = tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, app).await {
            error!(error = %err, "control surface server failed");
        }
    });

    match signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl+C, shutting down"),
        Err(err) => error!(error = %err, "unable to listen for shutdown signal"),
    }

    serve_task.abort();
    info!("outbound dialer shutdown complete");
    Ok(())
}
