//! Simulated failover with uplink-core
//!
//! Drives the arbiter against an in-memory network and a simulated clock,
//! so twenty minutes of link trouble play out instantly:
//!
//! - 00:00 wired cable plugged in, cloud reached over primary
//! - 05:00 cable pulled, cloud lost, backup modem takes over
//! - 08:00 cable plugged back in
//! - the periodic primary retry moves the session back to the cable

use std::sync::{Arc, Mutex};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use uplink_core::traits::{BackupInterface, CloudSession, PrimaryInterface};
use uplink_core::{
    ArbiterConfig, ArbiterEvent, Clock, LogIndicator, Result, UplinkArbiter,
};

/// Time a modem needs to register after power-up
const MODEM_ATTACH_MS: u32 = 20_000;

const MINUTE_MS: u32 = 60_000;

/// Everything the simulated collaborators observe
#[derive(Debug, Default)]
struct World {
    now: u32,
    cable_plugged: bool,
    primary_up: bool,
    modem_powered_at: Option<u32>,
    session_open: bool,
}

impl World {
    fn primary_ready(&self) -> bool {
        self.primary_up && self.cable_plugged
    }

    fn backup_ready(&self) -> bool {
        self.modem_powered_at
            .is_some_and(|at| self.now.wrapping_sub(at) >= MODEM_ATTACH_MS)
    }
}

type SharedWorld = Arc<Mutex<World>>;

struct SimClock(SharedWorld);

impl Clock for SimClock {
    fn millis(&self) -> u32 {
        self.0.lock().unwrap().now
    }
}

struct SimEthernet(SharedWorld);

impl PrimaryInterface for SimEthernet {
    fn is_present(&self) -> bool {
        true
    }

    fn connect(&mut self) {
        self.0.lock().unwrap().primary_up = true;
    }

    fn disconnect(&mut self) {
        self.0.lock().unwrap().primary_up = false;
    }

    fn is_ready(&self) -> bool {
        self.0.lock().unwrap().primary_ready()
    }
}

struct SimModem(SharedWorld);

impl BackupInterface for SimModem {
    fn connect(&mut self) {
        let mut world = self.0.lock().unwrap();
        if world.modem_powered_at.is_none() {
            world.modem_powered_at = Some(world.now);
        }
    }

    fn disconnect(&mut self) {
        self.0.lock().unwrap().modem_powered_at = None;
    }

    fn is_ready(&self) -> bool {
        self.0.lock().unwrap().backup_ready()
    }
}

/// Session is up whenever it is open and some link can carry it
struct SimCloud(SharedWorld);

impl CloudSession for SimCloud {
    fn connect(&mut self) {
        self.0.lock().unwrap().session_open = true;
    }

    fn disconnect(&mut self) {
        self.0.lock().unwrap().session_open = false;
    }

    fn is_connected(&self) -> bool {
        let world = self.0.lock().unwrap();
        world.session_open && (world.primary_ready() || world.backup_ready())
    }

    fn is_disconnected(&self) -> bool {
        !self.0.lock().unwrap().session_open
    }

    fn set_keep_alive(&mut self, interval: std::time::Duration) {
        println!("[Cloud] keep-alive set to {:?}", interval);
    }
}

fn timestamp(ms: u32) -> String {
    format!("{:02}:{:02}", ms / MINUTE_MS, (ms % MINUTE_MS) / 1000)
}

fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| uplink_core::Error::Other(e.to_string()))?;

    println!("=== Simulated uplink failover ===\n");

    let world: SharedWorld = Arc::new(Mutex::new(World {
        cable_plugged: true,
        ..World::default()
    }));

    let mut arbiter = UplinkArbiter::new(
        Box::new(SimEthernet(Arc::clone(&world))),
        Box::new(SimModem(Arc::clone(&world))),
        Box::new(SimCloud(Arc::clone(&world))),
        Box::new(LogIndicator::new()),
        Box::new(SimClock(Arc::clone(&world))),
        ArbiterConfig::default(),
    )?
    .with_interface_change_callback(|old, new| {
        println!("[Callback] active interface {} -> {}", old, new);
    });

    let mut events = arbiter.subscribe();
    arbiter.setup();

    // One poll per simulated second
    for second in 0..20 * 60 {
        let now = second * 1000;
        {
            let mut world = world.lock().unwrap();
            world.now = now;
            match now {
                t if t == 5 * MINUTE_MS => {
                    println!("\n[{}] cable pulled", timestamp(now));
                    world.cable_plugged = false;
                }
                t if t == 8 * MINUTE_MS => {
                    println!("\n[{}] cable plugged back in", timestamp(now));
                    world.cable_plugged = true;
                }
                _ => {}
            }
        }

        arbiter.poll();

        while let Ok(event) = events.try_recv() {
            match event {
                ArbiterEvent::StateChanged { from, to } => {
                    println!("[{}] {} -> {}", timestamp(now), from, to);
                }
                ArbiterEvent::Timeout { state, elapsed_ms } => {
                    println!("[{}] timeout in {} after {} ms", timestamp(now), state, elapsed_ms);
                }
                _ => {}
            }
        }
    }

    println!("\nFinal status: {}", serde_json::to_string_pretty(&arbiter.status())?);

    Ok(())
}
