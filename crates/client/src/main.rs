mod app;
mod debug;
mod net;

use std::net::SocketAddr;
use std::time::Duration;

use clap::Parser;

use app::ApplicationContext;
use cosmic::SimulationConfig;
use cosmic::scene::ScriptedBot;
use net::ClientConfig;

#[derive(Parser)]
#[command(name = "cosmic-client")]
#[command(about = "Headless cosmic client")]
struct Args {
    #[arg(
        short,
        long,
        help = "Server address to connect to (e.g., 127.0.0.1:27015); plays locally if omitted"
    )]
    server: Option<String>,

    #[arg(short, long, default_value_t = 30, help = "Seconds to play")]
    duration: u64,

    #[arg(long, help = "Stand still instead of letting a bot play")]
    idle: bool,

    #[arg(long, default_value_t = 1, help = "Seed of the bot's script")]
    bot_seed: u32,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let bot = (!args.idle).then(|| ScriptedBot::new(args.bot_seed));

    let mut context = match &args.server {
        Some(addr) => {
            let server: SocketAddr = addr.parse()?;
            ApplicationContext::remote(server, ClientConfig::default(), bot)?
        }
        None => ApplicationContext::local(&SimulationConfig::default(), bot)?,
    };

    let result = context.run(Duration::from_secs(args.duration));
    context.shutdown();
    result
}
