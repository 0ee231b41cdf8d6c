use cosmic::PacketLossSimulation;
use cosmic::setup::ServerSetupConfig;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub max_clients: usize,
    pub timeout_secs: u64,
    /// Spawn a character driven by a scripted bot on the server itself.
    pub host_bot: bool,
    pub setup: ServerSetupConfig,
    pub global_packet_loss: Option<PacketLossSimulation>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 32,
            timeout_secs: 10,
            host_bot: false,
            setup: ServerSetupConfig::default(),
            global_packet_loss: None,
        }
    }
}
