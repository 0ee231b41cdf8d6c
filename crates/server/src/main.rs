mod config;
mod events;
mod server;

use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;

use config::ServerConfig;
use cosmic::PacketLossSimulation;
use server::GameServer;

#[derive(Parser)]
#[command(name = "cosmic-server")]
#[command(about = "Authoritative cosmic server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = cosmic::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = cosmic::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 32)]
    max_clients: usize,

    #[arg(long, help = "Seed of the cosmos and the test scene")]
    seed: Option<u32>,

    #[arg(long, help = "Start with an empty arena")]
    empty: bool,

    #[arg(long, help = "Let a scripted bot play on the server")]
    host_bot: bool,

    #[arg(long, help = "Steps between unconditional full states")]
    full_state_interval: Option<u32>,

    #[arg(long, help = "Judge shots against the present only")]
    no_lag_compensation: bool,

    #[arg(long, default_value_t = 0.0, help = "Outgoing packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, help = "Stop after this many seconds")]
    duration: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let mut config = ServerConfig {
        max_clients: args.max_clients,
        host_bot: args.host_bot,
        global_packet_loss: (args.loss_percent > 0.0)
            .then(|| PacketLossSimulation::lossy(args.loss_percent)),
        ..Default::default()
    };
    config.setup.simulation.steps_per_second = args.tick_rate;
    config.setup.populate_scene = !args.empty;
    config.setup.lag_compensation.enabled = !args.no_lag_compensation;
    if let Some(seed) = args.seed {
        config.setup.simulation.seed = seed;
    }
    if let Some(interval) = args.full_state_interval {
        config.setup.full_state_interval = interval;
    }

    let mut server = GameServer::new(&bind_addr, config)?;
    log::info!(
        "server listening on {} at {} steps/s",
        server.local_addr(),
        args.tick_rate
    );

    if let Some(secs) = args.duration {
        let running = server.running();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_secs(secs));
            running.store(false, Ordering::SeqCst);
        });
    }

    server.run();
    log::info!("server shutting down");
    Ok(())
}
