//! Configuration for the local search backend.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use ts_types::{config_error, TuneResult};

use crate::search::{AdaptiveSearch, GridSearch, RandomSearch, SearchStrategy};
use crate::trial::ObjectiveDirection;

/// Which search strategy a config-built backend uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Grid,
    #[default]
    Random,
    Adaptive,
}

/// Top-level configuration for a search run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TunerConfig {
    pub strategy: StrategyKind,

    /// Maximum number of trials to evaluate.
    pub test_limit: usize,

    /// Skip configurations that were already evaluated.
    pub no_dups: bool,

    /// Give up after this many consecutive duplicate proposals; only
    /// relevant with `no_dups`. Small spaces exhaust quickly under random
    /// sampling.
    pub max_duplicate_streak: usize,

    /// Seed for the random and adaptive strategies.
    pub seed: Option<u64>,

    pub direction: ObjectiveDirection,

    /// Wall-clock budget for the whole search, in seconds.
    pub stop_after_secs: Option<f64>,

    /// Exploration probability for the adaptive strategy.
    pub exploration_weight: f64,

    /// Where to write the best configuration once the search finishes.
    pub final_config_path: Option<PathBuf>,
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::Random,
            test_limit: 100,
            no_dups: true,
            max_duplicate_streak: 1000,
            seed: None,
            direction: ObjectiveDirection::Minimize,
            stop_after_secs: None,
            exploration_weight: 0.3,
            final_config_path: None,
        }
    }
}

impl TunerConfig {
    pub fn new(strategy: StrategyKind) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> TuneResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> TuneResult<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn with_test_limit(mut self, n: usize) -> Self {
        self.test_limit = n;
        self
    }

    pub fn with_no_dups(mut self, no_dups: bool) -> Self {
        self.no_dups = no_dups;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_direction(mut self, direction: ObjectiveDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_stop_after(mut self, budget: Duration) -> Self {
        self.stop_after_secs = Some(budget.as_secs_f64());
        self
    }

    pub fn with_exploration_weight(mut self, weight: f64) -> Self {
        self.exploration_weight = weight;
        self
    }

    pub fn with_final_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.final_config_path = Some(path.into());
        self
    }

    /// The wall-clock budget, or `None` when unset or not representable.
    pub fn stop_after(&self) -> Option<Duration> {
        self.stop_after_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }

    pub fn validate(&self) -> TuneResult<()> {
        if self.test_limit == 0 {
            return Err(config_error!("test_limit must be positive"));
        }
        if self.max_duplicate_streak == 0 {
            return Err(config_error!("max_duplicate_streak must be positive"));
        }
        if !(0.0..=1.0).contains(&self.exploration_weight) {
            return Err(config_error!(
                "exploration_weight must lie in [0, 1], got {}",
                self.exploration_weight
            ));
        }
        if let Some(secs) = self.stop_after_secs {
            if Duration::try_from_secs_f64(secs).is_err() {
                return Err(config_error!(
                    "stop_after_secs must be a non-negative, representable duration, got {}",
                    secs
                ));
            }
        }
        Ok(())
    }

    /// Instantiate the configured strategy.
    pub fn build_strategy(&self) -> Box<dyn SearchStrategy> {
        match self.strategy {
            StrategyKind::Grid => Box::new(GridSearch::new()),
            StrategyKind::Random => Box::new(RandomSearch::new(self.seed)),
            StrategyKind::Adaptive => Box::new(AdaptiveSearch::new(
                self.seed,
                self.direction,
                self.exploration_weight,
            )),
        }
    }
}
