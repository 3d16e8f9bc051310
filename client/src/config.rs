use std::time::Duration;

/// Construction-time knobs for an [`crate::app::App`]. See spec §4.D, §4.E,
/// and §9 ("the 5-second delay ... should be parameterized").
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub use_ssl: bool,
    /// How long an `Operation` waits for a response before re-sending.
    /// Default 60s (spec §4.E).
    pub operation_timeout: Duration,
    /// Delay between advance rounds for a pattern with no new data.
    /// Default 5s (spec §4.E); kept configurable rather than a literal
    /// constant per the open design note in spec §9.
    pub advance_delay: Duration,
    /// How often the scheduler loop wakes to check for timed-out
    /// operations and due advance reschedules.
    pub scheduler_tick_interval: Duration,
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            use_ssl: false,
            operation_timeout: Duration::from_secs(60),
            advance_delay: Duration::from_secs(5),
            scheduler_tick_interval: Duration::from_millis(250),
        }
    }

    pub fn with_ssl(mut self, use_ssl: bool) -> Self {
        self.use_ssl = use_ssl;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_advance_delay(mut self, delay: Duration) -> Self {
        self.advance_delay = delay;
        self
    }

    pub(crate) fn scheme(&self) -> &'static str {
        if self.use_ssl {
            "wss"
        } else {
            "ws"
        }
    }
}
