use cosmic::setup::ClientSetupConfig;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connection_timeout_secs: u64,
    pub handshake_retry_secs: f32,
    pub ping_interval_secs: f32,
    pub setup: ClientSetupConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connection_timeout_secs: 10,
            handshake_retry_secs: 0.5,
            ping_interval_secs: 0.25,
            setup: ClientSetupConfig::default(),
        }
    }
}
