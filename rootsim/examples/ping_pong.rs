//! Example: pairs of LPs exchanging a ball.
//!
//! LP `2k` and LP `2k + 1` play together: each hit sends the ball back to the
//! partner after a random delay, and the payload of each event carries the
//! number of exchanges so far. A game ends after a number of exchanges, and
//! the simulation ends once every game has ended.
//!
//! This example demonstrates in particular:
//!
//! * event payloads,
//! * rollbackable random numbers,
//! * forced checkpoints,
//! * comparison with the sequential engine.

use std::time::Duration;

use rootsim::model::{Context, Event, LpId, Model};
use rootsim::simulation::{Checkpointing, ExecutionMode, SimInit, SimulationError};

const PLAYERS: usize = 8;
const EXCHANGES: u32 = 500;

/// Ping-pong model.
struct PingPong;

/// State of a player.
#[derive(Clone, Debug, Default, PartialEq)]
struct Player {
    /// Number of hits of this player.
    hits: u32,
    /// Longest delay before a hit.
    slowest: f64,
}

impl Model for PingPong {
    type State = Player;

    fn init(&self, lp: LpId, cx: &mut Context<'_>) -> Player {
        // Even players serve.
        if lp.index() % 2 == 0 {
            let t = cx.now() + cx.expent(1.0);
            cx.schedule_new_event(lp, t, 0, &0u32.to_le_bytes()).unwrap();
        }

        Player::default()
    }

    fn process_event(&self, player: &mut Player, event: &Event<'_>, cx: &mut Context<'_>) {
        let exchanges = match event.payload().try_into() {
            Ok(bytes) => u32::from_le_bytes(bytes),
            Err(_) => return,
        };
        player.hits += 1;
        if exchanges >= EXCHANGES {
            // Game over: keep the final state at hand for termination checks.
            cx.force_checkpoint();
            return;
        }

        let delay = cx.expent(1.0);
        player.slowest = player.slowest.max(delay);
        let partner = LpId::new(cx.lp().index() ^ 1);
        let t = cx.now() + delay;
        cx.schedule_new_event(partner, t, 0, &(exchanges + 1).to_le_bytes())
            .unwrap();
    }

    fn on_gvt(&self, _lp: LpId, player: &Player) -> bool {
        player.hits >= EXCHANGES / 2
    }
}

fn main() -> Result<(), SimulationError> {
    let parallel = SimInit::new(PingPong, PLAYERS)
        .set_workers(4)
        .set_checkpointing(Checkpointing::Periodic(16))
        .set_gvt_period(Duration::from_millis(5))
        .init()?
        .run()?;

    let serial = SimInit::new(PingPong, PLAYERS)
        .set_execution_mode(ExecutionMode::Serial)
        .init()?
        .run()?;

    for (lp, (p, s)) in parallel.states().iter().zip(serial.states()).enumerate() {
        println!("LP {lp}: {} hits in parallel, {} in serial", p.hits, s.hits);
    }
    println!(
        "parallel: {} rollbacks, {:.1}% efficiency",
        parallel.total_stats().rollbacks,
        parallel.total_stats().efficiency() * 100.0
    );

    Ok(())
}
