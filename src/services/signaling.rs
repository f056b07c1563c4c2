use tracing::info;

use super::{shutdown_signal, ServiceResult};
use crate::config::Config;
use crate::presentation_layer::signaling::SignalingServer;

/// Runs the signaling hub. Failing to bind is the only fatal error.
pub async fn run_signaling(config: Config) -> ServiceResult {
    let server = SignalingServer::bind(&config.signaling).await?;
    info!(
        "Hub window: {} chunks, sweep every {}s",
        config.signaling.max_manifest_chunks, config.signaling.sweep_interval_secs
    );
    server.serve(shutdown_signal()).await?;
    info!("Signaling server stopped");
    Ok(())
}
