//! Tunables for drones and the coordinator.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::coordinates::GridCoord;

/// Per-drone settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DroneConfig {
    /// How long to wait for a status or acknowledgment reply (default: 5000).
    /// `None` waits forever.
    #[serde(default = "default_reply_timeout_ms")]
    pub reply_timeout_ms: Option<u64>,

    /// Consecutive rejected moves before giving up (default: 3)
    #[serde(default = "default_max_rejections")]
    pub max_rejections: u32,

    /// Evaluations without getting closer before giving up.
    /// Defaults to the map width plus height.
    #[serde(default)]
    pub stall_limit: Option<u32>,

    /// Route around obstacles blocking the best move (default: true)
    #[serde(default = "default_true")]
    pub dodging: bool,

    /// Ask the coordinator for "drone reached goal" notices (default: true)
    #[serde(default = "default_true")]
    pub subscribe_goal_notices: bool,
}

impl DroneConfig {
    pub fn reply_timeout(&self) -> Option<Duration> {
        self.reply_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for DroneConfig {
    fn default() -> Self {
        Self {
            reply_timeout_ms: default_reply_timeout_ms(),
            max_rejections: default_max_rejections(),
            stall_limit: None,
            dodging: true,
            subscribe_goal_notices: true,
        }
    }
}

/// Coordinator settings
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SatelliteConfig {
    /// Battery level of a freshly registered drone (default: 100)
    #[serde(default = "default_battery_capacity")]
    pub battery_capacity: u32,

    /// Battery spent per accepted move (default: 1)
    #[serde(default = "default_battery_per_move")]
    pub battery_per_move: u32,

    /// Drones that must register before the run can finish (default: 1)
    #[serde(default = "default_expected_drones")]
    pub expected_drones: usize,

    /// Stop after this long without any message. `None` waits forever.
    #[serde(default)]
    pub idle_timeout_ms: Option<u64>,

    /// Start cells handed out round-robin on registration (default: origin)
    #[serde(default = "default_spawn_points")]
    pub spawn_points: Vec<GridCoord>,
}

impl SatelliteConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            battery_capacity: default_battery_capacity(),
            battery_per_move: default_battery_per_move(),
            expected_drones: default_expected_drones(),
            idle_timeout_ms: None,
            spawn_points: default_spawn_points(),
        }
    }
}

fn default_reply_timeout_ms() -> Option<u64> {
    Some(5000)
}

fn default_max_rejections() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_battery_capacity() -> u32 {
    100
}

fn default_battery_per_move() -> u32 {
    1
}

fn default_expected_drones() -> usize {
    1
}

fn default_spawn_points() -> Vec<GridCoord> {
    vec![GridCoord::new(0, 0)]
}
