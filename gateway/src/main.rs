use anyhow::Context;
use fleet_gateway::config::GatewayConfig;
use fleet_gateway::hub::TelemetryHub;
use fleet_gateway::metrics;
use fleet_gateway::poller::Poller;
use fleet_gateway::rest::{self, AppState};
use fleet_gateway::upstream::UpstreamClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let config = GatewayConfig::from_env().context("invalid configuration")?;

    info!("Starting fleet telemetry gateway");
    info!("Upstream: {} (project {})", config.base_url, config.project_uuid);
    info!("HTTP server: {}", config.http_addr);
    info!(
        "Poll interval: {:?}, fetch timeout: {:?}",
        config.poll_interval, config.fetch_timeout
    );

    metrics::init_metrics().context("failed to register metrics")?;

    let hub = Arc::new(TelemetryHub::new(config.subscriber_buffer));
    let upstream = UpstreamClient::new(&config.upstream()).context("failed to build upstream client")?;

    let cancel = CancellationToken::new();
    let poller = Poller::new(hub.clone(), upstream, config.poll_interval);
    let poller_cancel = cancel.clone();
    let mut poller_handle = tokio::spawn(async move { poller.run(poller_cancel).await });

    let app = rest::create_router(AppState {
        hub,
        config: Arc::new(config.clone()),
    });

    let listener = tokio::net::TcpListener::bind(config.http_addr)
        .await
        .with_context(|| format!("failed to bind to {}", config.http_addr))?;

    info!("HTTP server listening on {}", config.http_addr);

    let server_cancel = cancel.clone();
    let mut server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
    });

    let failure: Option<anyhow::Error> = tokio::select! {
        result = &mut poller_handle => Some(task_failure("poller", result)),
        result = &mut server_handle => Some(task_failure("HTTP server", result)),
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            None
        }
    };

    info!("Shutting down");
    cancel.cancel();
    if !poller_handle.is_finished() {
        let _ = poller_handle.await;
    }
    if !server_handle.is_finished()
        && tokio::time::timeout(SHUTDOWN_GRACE, server_handle).await.is_err()
    {
        warn!("HTTP server did not drain within {:?}", SHUTDOWN_GRACE);
    }

    match failure {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// A long-lived task never ends on its own; any exit is a process failure.
fn task_failure<E>(task: &str, result: Result<Result<(), E>, JoinError>) -> anyhow::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    let failure = match result {
        Ok(Ok(())) => anyhow::anyhow!("{} terminated", task),
        Ok(Err(e)) => anyhow::Error::new(e).context(format!("{} failed", task)),
        Err(e) => anyhow::Error::new(e).context(format!("{} task panicked", task)),
    };
    error!("{:#}", failure);
    failure
}
