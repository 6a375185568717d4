pub mod behavior;
pub mod brain;
pub mod cell;
pub mod config;
pub mod coordinates;
pub mod decision;
pub mod dispatch;
pub mod dodging;
pub mod drone;
pub mod grid;
pub mod message;
pub mod movement;
pub mod postbox;
pub mod satellite;
pub mod sensing;
pub mod standby;
pub mod trace;
pub mod worldgen;

pub use behavior::{Behavior, BehaviorChain, CornerTieBreak, Refresh, Slot, ThinkContext, TieBreaker};
pub use cell::Cell;
pub use config::{DroneConfig, SatelliteConfig};
pub use coordinates::{Direction, GridCoord};
pub use decision::{Decision, Outcome, Verdict};
pub use dispatch::{DefaultHooks, DroneShared, Flow, HookError, InboundHooks};
pub use drone::{Drone, DroneError, DroneReport};
pub use grid::{GridError, GridMap};
pub use message::{AgentId, Envelope, Performative, Protocol, StatusReport};
pub use postbox::{Mailbox, PostError, Postbox};
pub use satellite::{DroneStatus, Satellite, SatelliteError, SatelliteReport};
pub use trace::{Trace, TraceError};
pub use worldgen::{DeterministicMap, GoalPatch};
