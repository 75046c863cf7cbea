use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use skycheckers::{
    Direction, GameSession, MonotonicClock, SessionEvent, TransportConfig,
};

#[derive(Parser)]
#[command(name = "skycheckers-client")]
#[command(about = "Headless skycheckers client")]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1", help = "Server host or host:port")]
    server: String,

    #[arg(short, long, default_value = "Kale")]
    name: String,

    #[arg(long, help = "Drive the character with random inputs")]
    bot: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let clock = Arc::new(MonotonicClock::new());
    let mut session = GameSession::join(
        &args.server,
        &args.name,
        TransportConfig::default(),
        clock,
    )?;

    let mut rng = SmallRng::from_entropy();
    let mut bot_direction = Direction::None;
    let mut next_bot_change = Instant::now();
    let mut last = Instant::now();

    while session.is_connected() {
        let now = Instant::now();
        session.update((now - last).as_secs_f64());
        last = now;

        for event in session.drain_events() {
            match event {
                SessionEvent::Accepted { character, lives } => {
                    log::info!("playing as {character:?} with {lives} lives");
                }
                SessionEvent::WaitingForPlayers { count } => {
                    log::info!("waiting for {count} more player(s)");
                }
                SessionEvent::GameStarted => log::info!("game starting"),
                SessionEvent::PeerJoined { character, name } => {
                    log::info!("{name} joined as {character:?}");
                }
                SessionEvent::LaggedOut { character } => log::warn!("{character:?} lagged out"),
                SessionEvent::Rejected => log::error!("server rejected us (version mismatch?)"),
                SessionEvent::Disconnected => log::info!("disconnected"),
                SessionEvent::Sound(_) => {}
            }
        }

        if args.bot && session.world.game_has_started {
            if now >= next_bot_change {
                bot_direction = Direction::from_wire(rng.gen_range(0..5)).unwrap();
                next_bot_change = now + Duration::from_millis(rng.gen_range(300..1500));
            }
            let fire = rng.gen_range(0..200) == 0;
            session.local_input(bot_direction, fire);
        }

        std::thread::sleep(Duration::from_millis(1));
    }

    Ok(())
}
