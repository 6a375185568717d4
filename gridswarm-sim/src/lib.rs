pub mod config;
pub mod logging;
pub mod runner;

pub use config::{ConfigError, SimConfig};
pub use runner::{SimOutcome, build_map, run};
