//! Canvax gateway: HTTP endpoints, the WebSocket and TCP stream transports,
//! and the per-connection lifecycle that ties a client to a canvas session.

pub mod adapter;
pub mod canvas;
pub mod connection;
pub mod dispatch;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod server;
pub mod state;
pub mod stream;

pub use connection::{handle_client, ConnectionPhase};
pub use server::{router, serve, start_gateway};
pub use state::GatewayState;
