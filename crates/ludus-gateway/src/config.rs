use std::time::Duration;

pub const DEFAULT_GATEWAY_ADDR: &str = "127.0.0.1:3005";

/// Gateway process settings.
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub listen_addr: String,
    /// Deadline for create, start and status calls.
    pub request_timeout: Duration,
    /// Deadline for each frame poll of a live tail.
    pub tail_poll_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_GATEWAY_ADDR.to_string(),
            request_timeout: Duration::from_secs(10),
            tail_poll_timeout: Duration::from_secs(5),
        }
    }
}

impl GatewayConfig {
    /// Reads `LUDUS_GATEWAY_ADDR`.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        match std::env::var("LUDUS_GATEWAY_ADDR") {
            Ok(addr) if !addr.trim().is_empty() => config.listen_addr = addr,
            Ok(_) => tracing::warn!("ignoring empty LUDUS_GATEWAY_ADDR"),
            Err(_) => {}
        }
        config
    }
}
