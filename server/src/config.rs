use std::time::Duration;

/// Runtime settings for the poll server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the UDP socket binds to.
    pub bind_addr: String,
    /// Interval between housekeeping ticks.
    pub tick_duration: Duration,
    /// Maximum number of concurrent transport connections.
    pub max_clients: usize,
    /// Silence after which a connection counts as gone.
    pub client_timeout: Duration,
    /// End an active poll once its countdown has run out. Off by default:
    /// polls then only end on an explicit end-poll request.
    pub auto_end_expired_polls: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8080".to_string(),
            tick_duration: Duration::from_millis(100),
            max_clients: 256,
            client_timeout: Duration::from_secs(5),
            auto_end_expired_polls: false,
        }
    }
}

impl ServerConfig {
    pub fn with_tick_rate(mut self, tick_rate: u32) -> Self {
        self.tick_duration = Duration::from_secs_f32(1.0 / tick_rate.max(1) as f32);
        self
    }
}
