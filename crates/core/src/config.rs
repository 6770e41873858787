use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Which value strategy drives the search.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum StrategyKind {
    NormalizedRange,
    MinTime,
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normalized-range" => Ok(StrategyKind::NormalizedRange),
            "min-time" => Ok(StrategyKind::MinTime),
            other => Err(format!("unknown strategy {other} (expected normalized-range or min-time)")),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrategyKind::NormalizedRange => write!(f, "normalized-range"),
            StrategyKind::MinTime => write!(f, "min-time"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// MCTS iteration budget.
    pub iters: usize,
    /// Streams beyond the default one; also the per-candidate stream
    /// budget for platform variations.
    pub streams: usize,
    /// RNG seed for playouts and tie-breaking.
    pub seed: u64,
    pub strategy: StrategyKind,
    /// Benchmark repetitions per ordering.
    pub samples: usize,
    /// Optional wall-clock limit for the whole search, in seconds.
    pub wall_limit_secs: Option<u64>,
    /// Replay results from a CSV instead of measuring.
    pub replay: Option<PathBuf>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            iters: 100,
            streams: 2,
            seed: 0,
            strategy: StrategyKind::NormalizedRange,
            samples: 30,
            wall_limit_secs: None,
            replay: None,
        }
    }
}

/// Load configuration from a TOML file.
/// Falls back to defaults if the file is missing or malformed.
pub fn load_config(path: &str) -> SearchConfig {
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str(&contents) {
            Ok(config) => {
                tracing::info!("Loaded config from {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("Failed to parse config {}: {}, using defaults", path, e);
                SearchConfig::default()
            }
        },
        Err(_) => {
            tracing::debug!("Config file {} not found, using defaults", path);
            SearchConfig::default()
        }
    }
}

/// Save configuration to a TOML file, creating parent directories.
pub fn save_config(config: &SearchConfig, path: &str) -> crate::error::Result<()> {
    let path = std::path::Path::new(path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let contents = toml::to_string_pretty(config)
        .map_err(|e| crate::error::CoreError::Config(e.to_string()))?;
    std::fs::write(path, contents)?;
    tracing::info!("Config saved to {:?}", path);
    Ok(())
}
