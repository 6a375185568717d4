//! Configuration loading for the simulator

use std::path::{Path, PathBuf};

use gridswarm_core::{DroneConfig, GoalPatch, GridMap, SatelliteConfig};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub swarm: SwarmConfig,
    #[serde(default)]
    pub drone: DroneConfig,
    #[serde(default)]
    pub satellite: SatelliteConfig,
}

/// Procedural map settings
#[derive(Clone, Debug, Deserialize)]
pub struct MapConfig {
    /// Map width in cells (default: 24)
    #[serde(default = "default_width")]
    pub width: usize,

    /// Map height in cells (default: 16)
    #[serde(default = "default_height")]
    pub height: usize,

    /// Obstacle layout seed (default: 7)
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Share of obstacle cells in percent (default: 15)
    #[serde(default = "default_obstacle_percent")]
    pub obstacle_percent: u32,

    /// Goal rectangle (default: 2×2 at (20, 12))
    #[serde(default = "default_goal")]
    pub goal: GoalPatch,
}

/// Fleet settings
#[derive(Clone, Debug, Deserialize)]
pub struct SwarmConfig {
    /// Number of drones to launch (default: 1)
    #[serde(default = "default_drones")]
    pub drones: usize,

    /// Drone ids are `<prefix>-<n>` (default: "drone")
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Coordinator id (default: "satellite")
    #[serde(default = "default_satellite_name")]
    pub satellite: String,
}

impl SwarmConfig {
    /// Id of the drone launched at `index`.
    pub fn drone_id(&self, index: usize) -> String {
        format!("{}-{index}", self.name_prefix)
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            seed: default_seed(),
            obstacle_percent: default_obstacle_percent(),
            goal: default_goal(),
        }
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            drones: default_drones(),
            name_prefix: default_name_prefix(),
            satellite: default_satellite_name(),
        }
    }
}

fn default_width() -> usize {
    24
}

fn default_height() -> usize {
    16
}

fn default_seed() -> u64 {
    7
}

fn default_obstacle_percent() -> u32 {
    15
}

fn default_goal() -> GoalPatch {
    GoalPatch::new(20, 12, 2, 2)
}

fn default_drones() -> usize {
    1
}

fn default_name_prefix() -> String {
    "drone".to_string()
}

fn default_satellite_name() -> String {
    "satellite".to_string()
}

impl SimConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: SimConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.map.width == 0 || self.map.height == 0 {
            return Err(ConfigError::Invalid("map must be at least 1×1".into()));
        }
        GridMap::cell_count(self.map.width, self.map.height)
            .map_err(|error| ConfigError::Invalid(error.to_string()))?;
        if self.map.goal.width == 0 || self.map.goal.height == 0 {
            return Err(ConfigError::Invalid("goal patch is empty".into()));
        }
        if self.swarm.drones == 0 {
            return Err(ConfigError::Invalid("swarm needs at least one drone".into()));
        }
        if let Some(index) =
            (0..self.swarm.drones).find(|index| self.swarm.drone_id(*index) == self.swarm.satellite)
        {
            return Err(ConfigError::Invalid(format!(
                "drone {index} would share the satellite id {:?}",
                self.swarm.satellite
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_partial_file_with_defaults() {
        let file = write_config(
            r#"
[map]
width = 12
seed = 99
goal = { x = 9, y = 3, width = 1, height = 1 }

[swarm]
drones = 3

[drone]
stall_limit = 40
dodging = false

[satellite]
battery_capacity = 50
spawn_points = [{ x = 0, y = 0 }, { x = 0, y = 5 }]
"#,
        );

        let config = SimConfig::load(file.path()).unwrap();

        assert_eq!(config.map.width, 12);
        assert_eq!(config.map.height, 16);
        assert_eq!(config.map.seed, 99);
        assert_eq!(config.map.goal, GoalPatch::new(9, 3, 1, 1));
        assert_eq!(config.swarm.drones, 3);
        assert_eq!(config.swarm.name_prefix, "drone");
        assert_eq!(config.drone.stall_limit, Some(40));
        assert!(!config.drone.dodging);
        assert_eq!(config.drone.max_rejections, 3);
        assert_eq!(config.satellite.battery_capacity, 50);
        assert_eq!(config.satellite.spawn_points.len(), 2);
    }

    #[test]
    fn empty_file_is_default() {
        let file = write_config("");
        let config = SimConfig::load(file.path()).unwrap();
        assert_eq!(config.map.width, 24);
        assert_eq!(config.swarm.drones, 1);
        assert_eq!(config.satellite.expected_drones, 1);
    }

    #[test]
    fn rejects_invalid_values() {
        let file = write_config("[swarm]\ndrones = 0\n");
        assert!(matches!(SimConfig::load(file.path()), Err(ConfigError::Invalid(_))));

        let file = write_config("[map]\nwidth = \"wide\"\n");
        assert!(matches!(SimConfig::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn satellite_id_must_not_match_a_drone_id() {
        let mut config = SimConfig::default();
        config.swarm.drones = 2;
        config.swarm.satellite = "drone".into();
        assert!(config.validate().is_ok());

        config.swarm.satellite = "drone-1".into();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.swarm.satellite = "drone-2".into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn oversized_map_is_invalid() {
        let file = write_config(&format!("[map]\nwidth = {}\nheight = 2\n", i64::MAX));
        assert!(matches!(SimConfig::load(file.path()), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn missing_file_reports_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        match SimConfig::load(&path) {
            Err(ConfigError::Read { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
