pub mod broadcaster;
pub mod signaling;
pub mod viewer;

use tracing::error;

pub type ServiceResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Resolves on Ctrl+C. If the handler cannot be installed the process simply
/// runs until killed.
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}
