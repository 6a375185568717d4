//! Log setup for the simulator binary.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set.
pub const DEFAULT_FILTER: &str = "gridswarm_core=info,gridswarm_sim=info";

/// `RUST_LOG` if it is set and valid, otherwise [`DEFAULT_FILTER`].
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

pub fn init() {
    tracing_subscriber::fmt().with_env_filter(env_filter()).init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        let filter = EnvFilter::try_new(DEFAULT_FILTER).unwrap();
        let rendered = filter.to_string();
        assert!(rendered.contains("gridswarm_core=info"));
        assert!(rendered.contains("gridswarm_sim=info"));
    }
}
