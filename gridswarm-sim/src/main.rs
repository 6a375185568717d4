use std::path::Path;

use anyhow::{Result, bail};
use gridswarm_sim::SimConfig;
use tracing::{info, warn};

fn main() -> Result<()> {
    gridswarm_sim::logging::init();

    let args: Vec<String> = std::env::args().collect();
    let config = if let Some(path) = args.get(1) {
        let config_path = Path::new(path);
        info!("Loading configuration from {:?}", config_path);
        SimConfig::load(config_path)?
    } else if Path::new("gridswarm.toml").exists() {
        info!("Loading configuration from gridswarm.toml");
        SimConfig::load(Path::new("gridswarm.toml"))?
    } else {
        info!("Using default configuration");
        SimConfig::default()
    };

    info!("gridswarm v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Map {}x{} (seed {}, {}% obstacles), goal at ({}, {}), {} drone(s)",
        config.map.width,
        config.map.height,
        config.map.seed,
        config.map.obstacle_percent,
        config.map.goal.x,
        config.map.goal.y,
        config.swarm.drones
    );

    let outcome = gridswarm_sim::run(&config)?;

    for status in &outcome.satellite.drones {
        info!(
            drone = %status.id,
            x = status.position.x,
            y = status.position.y,
            battery = status.battery,
            moves = status.moves,
            goal = status.goal_reached,
            "final status"
        );
    }
    info!("Explored map:\n{}", outcome.satellite.tracking);
    info!(
        "{} of {} drone(s) reached the goal",
        outcome.successes(),
        outcome.drones.len()
    );

    let errors = outcome.errors();
    if errors > 0 {
        warn!("{} drone(s) stopped with an error", errors);
        bail!("{errors} drone(s) stopped with an error");
    }
    Ok(())
}
