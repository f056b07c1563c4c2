pub mod hls_handlers;
pub mod m3u8_router;
pub mod m3u8_server;

pub use m3u8_router::{create_origin_router, OriginState};
pub use m3u8_server::start_origin_server_background;
