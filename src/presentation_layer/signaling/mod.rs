pub mod client;
pub mod hub;
pub mod protocol;
pub mod ws_server;

pub use client::SignalingClient;
pub use hub::{ConnectionRole, SignalingHub};
pub use protocol::{ClientMessage, ServerMessage};
pub use ws_server::SignalingServer;
