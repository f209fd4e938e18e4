//! Public gateway for Ludus.
//!
//! Translates HTTP requests into controller calls and mirrors running games
//! to WebSocket observers with a poll-based live tail.

mod config;
mod routes;
pub mod tail;

pub use config::{GatewayConfig, DEFAULT_GATEWAY_ADDR};
pub use routes::{router, serve, ApiError, GatewayState};
pub use tail::{live_tail, FrameSink, SinkError, WebSocketSink};
