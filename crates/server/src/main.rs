use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};
use clap::Parser;

use skycheckers::{
    AiDifficulty, CharacterRole, GameSession, HostConfig, MonotonicClock, PacketLossSimulation,
    SessionEvent, TransportConfig,
};

#[derive(Parser)]
#[command(name = "skycheckers-server")]
#[command(about = "Headless skycheckers game host")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = skycheckers::DEFAULT_PORT)]
    port: u16,

    #[arg(short = 'n', long, default_value_t = 1, help = "Remote players to wait for (1-3)")]
    net_humans: u8,

    #[arg(short, long, default_value_t = 5, help = "Lives per character (1-10)")]
    lives: u8,

    #[arg(long, default_value = "easy", help = "AI difficulty: easy, medium or hard")]
    ai: String,

    #[arg(long, default_value = "Host")]
    name: String,

    #[arg(long, default_value_t = 0.0, help = "Simulated outgoing packet loss (0-100)")]
    loss_percent: f32,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(1..=3).contains(&args.net_humans) {
        bail!("--net-humans must be between 1 and 3");
    }
    if !(1..=10).contains(&args.lives) {
        bail!("--lives must be between 1 and 10");
    }
    let ai_difficulty = match args.ai.as_str() {
        "easy" => AiDifficulty::Easy,
        "medium" => AiDifficulty::Medium,
        "hard" => AiDifficulty::Hard,
        other => bail!("unknown AI difficulty `{other}`"),
    };

    let config = HostConfig {
        bind: args.bind,
        port: args.port,
        net_humans: args.net_humans,
        lives: args.lives,
        ai_difficulty,
        local_name: args.name,
        // Nobody sits at a headless host; the AI plays its seat.
        local_role: CharacterRole::Ai,
        transport: TransportConfig {
            loss: PacketLossSimulation::with_loss(args.loss_percent),
            ..TransportConfig::default()
        },
    };

    let clock = Arc::new(MonotonicClock::new());
    let mut session = GameSession::host(config, clock)?;

    let mut last = Instant::now();
    while session.is_connected() {
        let now = Instant::now();
        session.update((now - last).as_secs_f64());
        last = now;

        for event in session.drain_events() {
            match event {
                SessionEvent::PeerJoined { character, name } => {
                    log::info!("{name} joined as {character:?}");
                }
                SessionEvent::WaitingForPlayers { count } => {
                    log::info!("waiting for {count} more player(s)");
                }
                SessionEvent::GameStarted => log::info!("all seats filled, countdown running"),
                SessionEvent::LaggedOut { character } => {
                    log::warn!("{character:?} lagged out, AI takes over");
                }
                SessionEvent::Disconnected => log::info!("session closed"),
                _ => {}
            }
        }

        if session.world.winner.is_some() {
            let winner = session.world.winner.unwrap();
            log::info!("{winner:?} wins; starting a new round");
            session.request_new_game();
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}
