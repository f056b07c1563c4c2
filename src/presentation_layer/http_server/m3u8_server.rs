use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use super::m3u8_router::{create_origin_router, OriginState};

/// Binds the origin server and serves it in the background. A bind failure
/// is returned to the caller; later serve errors are only logged.
pub async fn start_origin_server_background(
    host: &str,
    port: u16,
    state: OriginState,
) -> Result<JoinHandle<()>, std::io::Error> {
    let address = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&address).await?;
    info!("🌐 Origin server: http://{}", address);

    let app = create_origin_router(state);
    Ok(tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("❌ Origin server error: {}", e);
        }
    }))
}
