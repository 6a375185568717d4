//! Wires a coordinator and a fleet of drones together and runs them to the end.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result, anyhow, bail};
use gridswarm_core::{
    AgentId, DeterministicMap, Drone, DroneError, DroneReport, GridError, GridMap, Postbox,
    Satellite, SatelliteReport,
};
use tracing::{info, warn};

use crate::config::SimConfig;

#[derive(Debug)]
pub struct SimOutcome {
    pub satellite: SatelliteReport,
    pub drones: Vec<(AgentId, Result<DroneReport, DroneError>)>,
}

impl SimOutcome {
    pub fn successes(&self) -> usize {
        self.drones
            .iter()
            .filter(|(_, result)| {
                matches!(result, Ok(report) if report.outcome == gridswarm_core::Outcome::Success)
            })
            .count()
    }

    pub fn errors(&self) -> usize {
        self.drones.iter().filter(|(_, result)| result.is_err()).count()
    }
}

pub fn build_map(config: &SimConfig) -> Result<GridMap, GridError> {
    DeterministicMap::new(config.map.seed)
        .with_obstacle_percent(config.map.obstacle_percent)
        .build(
            config.map.width,
            config.map.height,
            config.map.goal,
            &config.satellite.spawn_points,
        )
}

pub fn run(config: &SimConfig) -> Result<SimOutcome> {
    config.validate()?;
    let truth = build_map(config).context("failed to build map")?;
    info!(width = truth.width(), height = truth.height(), seed = config.map.seed, "map ready");
    run_on(config, Postbox::new(), truth)
}

/// Runs the fleet over `truth`. All started threads are joined before
/// returning, whether or not every drone could be launched.
fn run_on(config: &SimConfig, postbox: Arc<Postbox>, truth: GridMap) -> Result<SimOutcome> {
    let (width, height) = (truth.width(), truth.height());
    let satellite_id = AgentId::new(config.swarm.satellite.clone());
    let mut satellite_config = config.satellite.clone();
    satellite_config.expected_drones = config.swarm.drones;
    let satellite = Satellite::new(satellite_id.clone(), Arc::clone(&postbox), truth, satellite_config)
        .context("failed to start coordinator")?;
    let coordinator = thread::Builder::new()
        .name(satellite_id.to_string())
        .spawn(move || satellite.run())
        .context("failed to spawn coordinator thread")?;

    let mut handles = Vec::with_capacity(config.swarm.drones);
    let launched = launch_drones(config, &satellite_id, &postbox, width, height, &mut handles);

    let mut drones = Vec::with_capacity(handles.len());
    let mut panicked = Vec::new();
    for (id, handle) in handles {
        match handle.join() {
            Ok(result) => {
                match &result {
                    Ok(report) => info!(
                        drone = %id,
                        outcome = ?report.outcome,
                        moves = report.moves,
                        rejected = report.rejected,
                        "drone done"
                    ),
                    Err(error) => warn!(drone = %id, %error, "drone stopped"),
                }
                drones.push((id, result));
            }
            Err(_) => panicked.push(id),
        }
    }

    // Every drone is gone; closing the inbox stops a coordinator still waiting on one.
    postbox.unregister(&satellite_id);
    let satellite = coordinator
        .join()
        .map_err(|_| anyhow!("coordinator panicked"))?;

    launched?;
    if let Some(id) = panicked.first() {
        bail!("{id} panicked");
    }
    Ok(SimOutcome { satellite, drones })
}

type DroneHandle = (AgentId, JoinHandle<Result<DroneReport, DroneError>>);

/// Connects and starts every drone, stopping at the first failure. Drones
/// started before it stay in `handles`.
fn launch_drones(
    config: &SimConfig,
    satellite_id: &AgentId,
    postbox: &Arc<Postbox>,
    width: usize,
    height: usize,
    handles: &mut Vec<DroneHandle>,
) -> Result<()> {
    for index in 0..config.swarm.drones {
        let id = AgentId::new(config.swarm.drone_id(index));
        let drone = Drone::connect(
            id.clone(),
            satellite_id.clone(),
            Arc::clone(postbox),
            GridMap::new(width, height),
            config.drone.clone(),
        )
        .with_context(|| format!("failed to connect {id}"))?;
        let handle = thread::Builder::new()
            .name(id.to_string())
            .spawn(move || drone.run())
            .with_context(|| format!("failed to spawn {id}"))?;
        handles.push((id, handle));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridswarm_core::{Cell, GoalPatch, GridCoord, Outcome};

    fn small_config() -> SimConfig {
        let mut config = SimConfig::default();
        config.map.width = 10;
        config.map.height = 6;
        config.map.obstacle_percent = 0;
        config.map.goal = GoalPatch::new(8, 4, 2, 2);
        config.satellite.idle_timeout_ms = Some(10_000);
        config
    }

    #[test]
    fn map_keeps_spawn_points_clear() {
        let mut config = small_config();
        config.map.obstacle_percent = 100;
        config.satellite.spawn_points = vec![GridCoord::new(0, 0), GridCoord::new(0, 5)];

        let map = build_map(&config).unwrap();

        assert_eq!(map.get(GridCoord::new(0, 0)), Cell::Free);
        assert_eq!(map.get(GridCoord::new(0, 5)), Cell::Free);
        assert_eq!(map.get(GridCoord::new(3, 3)), Cell::Obstacle);
        assert_eq!(map.get(GridCoord::new(9, 5)), Cell::Goal);
    }

    #[test]
    fn goal_outside_map_is_an_error() {
        let mut config = small_config();
        config.map.goal = GoalPatch::new(9, 5, 2, 2);
        assert!(run(&config).is_err());
    }

    #[test]
    fn failed_launch_still_stops_the_coordinator() {
        let mut config = small_config();
        config.swarm.drones = 2;
        config.satellite.idle_timeout_ms = None;
        let truth = build_map(&config).unwrap();
        let postbox = Postbox::new();
        let _taken = postbox.open_inbox(AgentId::new("drone-1")).unwrap();

        let error = run_on(&config, Arc::clone(&postbox), truth).unwrap_err();

        assert!(error.to_string().contains("drone-1"));
        assert!(!postbox.is_registered(&AgentId::new("satellite")));
        assert!(!postbox.is_registered(&AgentId::new("drone-0")));
    }

    #[test]
    fn clashing_ids_are_rejected_before_launch() {
        let mut config = small_config();
        config.swarm.satellite = "drone-0".into();
        let error = run(&config).unwrap_err();
        assert!(error.to_string().contains("satellite id"));
    }

    #[test]
    fn open_map_run_succeeds() {
        let outcome = run(&small_config()).unwrap();

        assert_eq!(outcome.successes(), 1);
        assert_eq!(outcome.errors(), 0);
        let (id, report) = &outcome.drones[0];
        assert_eq!(id.as_str(), "drone-0");
        assert_eq!(report.as_ref().unwrap().outcome, Outcome::Success);
        assert_eq!(outcome.satellite.drones[0].finished, Some(Outcome::Success));
    }
}
